use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use skywatch::config::Config;
use skywatch::pipeline::Pipeline;
use skywatch::publisher::MqttPublisher;
use skywatch::scheduler;

#[derive(Parser)]
#[command(
    name = "skywatch",
    version,
    about = "Fuses live aircraft feeds around a point of interest and publishes the nearest aircraft over MQTT"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch, merge and publish continuously
    Run,
    /// Run a single cycle and exit (default)
    Once,
    /// Check broker connectivity and exit
    TestBroker,
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            error!("configuration error: {err:#}");
            std::process::exit(1);
        }
    };

    if let Some(addr) = config.metrics_addr {
        if let Err(err) = skywatch::metrics::init_exporter(addr) {
            warn!("metrics exporter disabled: {err:#}");
        }
    }

    let result = match cli.command.unwrap_or(Command::Once) {
        Command::Run => run_continuous(config).await,
        Command::Once => run_once(config).await,
        Command::TestBroker => test_broker(config).await,
    };
    if let Err(err) = result {
        error!("{err:#}");
        std::process::exit(1);
    }
}

/// LOG_LEVEL is the simple knob; RUST_LOG still wins for per-target
/// filtering.
fn init_tracing() {
    let filter = std::env::var("RUST_LOG")
        .or_else(|_| std::env::var("LOG_LEVEL").map(|level| level.to_lowercase()))
        .unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();
}

async fn run_continuous(config: Config) -> Result<()> {
    info!(
        "starting continuous tracking around ({}, {}) radius {} NM, publishing to {}:{} under {}/",
        config.point.lat,
        config.point.lon,
        config.point.radius_nm,
        config.mqtt.host,
        config.mqtt.port,
        config.mqtt.prefix
    );

    let publisher = MqttPublisher::connect(&config.mqtt);
    let mut pipeline = Pipeline::new(config, publisher, None);

    let cancel = CancellationToken::new();
    let handler = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, finishing current cycle");
            handler.cancel();
        }
    });

    scheduler::run_loop(&mut pipeline, cancel).await;
    Ok(())
}

async fn run_once(config: Config) -> Result<()> {
    let publisher = MqttPublisher::connect(&config.mqtt);
    let mut pipeline = Pipeline::new(config, publisher, None);
    let cancel = CancellationToken::new();
    pipeline.run_cycle(&cancel).await?;
    pipeline.shutdown().await;
    Ok(())
}

async fn test_broker(config: Config) -> Result<()> {
    let mut publisher = MqttPublisher::connect(&config.mqtt);
    if publisher
        .wait_until_connected(Duration::from_secs(10))
        .await
    {
        info!(
            "MQTT broker at {}:{} is reachable",
            config.mqtt.host, config.mqtt.port
        );
        publisher.disconnect().await;
        Ok(())
    } else {
        anyhow::bail!(
            "could not reach MQTT broker at {}:{}",
            config.mqtt.host,
            config.mqtt.port
        )
    }
}
