use std::net::SocketAddr;

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::info;

/// Install the Prometheus recorder with its own scrape listener.
///
/// Metrics are recorded unconditionally throughout the crate; without this
/// exporter they fall through to the no-op recorder.
pub fn init_exporter(addr: SocketAddr) -> Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("failed to install Prometheus exporter")?;
    info!("Prometheus exporter listening on {addr}");
    Ok(())
}
