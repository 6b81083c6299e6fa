use std::time::Duration;

use anyhow::{Context, Result};
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::MqttConfig;

/// Running totals published on the stats topic.
#[derive(Debug, Clone)]
pub struct RunnerStats {
    pub runs: u64,
    pub successful_publishes: u64,
    pub errors: u64,
    pub start_time: String,
}

impl RunnerStats {
    pub fn new() -> Self {
        Self {
            runs: 0,
            successful_publishes: 0,
            errors: 0,
            start_time: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn payload(&self, aircraft_count: usize, nearest_aircraft: Option<&str>) -> StatsPayload {
        StatsPayload {
            runs: self.runs,
            successful_publishes: self.successful_publishes,
            errors: self.errors,
            start_time: self.start_time.clone(),
            last_update: chrono::Utc::now().to_rfc3339(),
            aircraft_count,
            nearest_aircraft: nearest_aircraft.unwrap_or("None").to_string(),
        }
    }
}

impl Default for RunnerStats {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StatsPayload {
    pub runs: u64,
    pub successful_publishes: u64,
    pub errors: u64,
    pub start_time: String,
    pub last_update: String,
    pub aircraft_count: usize,
    pub nearest_aircraft: String,
}

/// Retained-message publisher over MQTT.
///
/// The event loop runs in its own task and re-establishes the broker
/// connection on its own; queued publishes flush once the connection is
/// back, and a retained message per topic means late subscribers always get
/// the latest snapshot.
pub struct MqttPublisher {
    client: AsyncClient,
    prefix: String,
    connected: watch::Receiver<bool>,
}

impl MqttPublisher {
    pub fn connect(config: &MqttConfig) -> Self {
        let client_id = format!("skywatch-{}", std::process::id());
        let mut options = MqttOptions::new(client_id, config.host.clone(), config.port);
        options.set_keep_alive(Duration::from_secs(60));
        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            options.set_credentials(username.clone(), password.clone());
        }

        let (client, mut eventloop) = AsyncClient::new(options, 64);
        let (tx, rx) = watch::channel(false);
        tokio::spawn(async move {
            loop {
                if tx.is_closed() {
                    break;
                }
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!("connected to MQTT broker");
                        let _ = tx.send(true);
                    }
                    Ok(_) => {}
                    Err(err) => {
                        let _ = tx.send(false);
                        warn!("MQTT connection error: {err}");
                        metrics::counter!("mqtt.connection_error").increment(1);
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                }
            }
        });

        Self {
            client,
            prefix: config.prefix.clone(),
            connected: rx,
        }
    }

    /// Wait for the broker handshake, used by the connectivity probe.
    pub async fn wait_until_connected(&mut self, timeout: Duration) -> bool {
        if *self.connected.borrow() {
            return true;
        }
        tokio::time::timeout(timeout, async {
            while self.connected.changed().await.is_ok() {
                if *self.connected.borrow() {
                    return true;
                }
            }
            false
        })
        .await
        .unwrap_or(false)
    }

    /// Queue a retained publish under the configured prefix.
    pub async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<()> {
        let full_topic = format!("{}/{topic}", self.prefix);
        let size = payload.len();
        self.client
            .publish(full_topic.as_str(), QoS::AtLeastOnce, true, payload)
            .await
            .with_context(|| format!("failed to queue publish to {full_topic}"))?;
        debug!("published {size} bytes to {full_topic}");
        metrics::counter!("mqtt.published", "topic" => topic.to_string()).increment(1);
        Ok(())
    }

    pub async fn disconnect(&self) {
        let _ = self.client.disconnect().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_payload() {
        let mut stats = RunnerStats::new();
        stats.runs = 3;
        stats.successful_publishes = 5;
        stats.errors = 1;

        let payload = stats.payload(12, Some("ASA512"));
        assert_eq!(payload.runs, 3);
        assert_eq!(payload.aircraft_count, 12);
        assert_eq!(payload.nearest_aircraft, "ASA512");

        let payload = stats.payload(0, None);
        assert_eq!(payload.nearest_aircraft, "None");
    }

    #[tokio::test]
    async fn test_wait_until_connected_times_out() {
        let config = MqttConfig {
            host: "127.0.0.1".to_string(),
            // Nothing listens here; the handshake can never complete.
            port: 1,
            username: None,
            password: None,
            prefix: "skywatch".to_string(),
        };
        let mut publisher = MqttPublisher::connect(&config);
        assert!(
            !publisher
                .wait_until_connected(Duration::from_millis(200))
                .await
        );
    }
}
