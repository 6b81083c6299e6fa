use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::geo::{PointOfInterest, bounding_box};
use crate::mil_cache::MilCache;
use crate::observation::{Observation, ProviderId, clean};
use crate::providers::{AircraftProvider, PROVIDER_TIMEOUT, USER_AGENT};

pub const DEFAULT_API_BASE: &str = "https://data-cloud.flightradar24.com";

/// FlightRadar24 zone-feed client. The feed is a JSON object keyed by feed
/// id; aircraft rows are positional arrays.
pub struct Fr24Client {
    client: reqwest::Client,
    api_base: String,
    mil_cache: Arc<MilCache>,
}

impl Fr24Client {
    pub fn new(client: reqwest::Client, mil_cache: Arc<MilCache>) -> Self {
        Self {
            client,
            api_base: DEFAULT_API_BASE.to_string(),
            mil_cache,
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl AircraftProvider for Fr24Client {
    fn id(&self) -> ProviderId {
        ProviderId::Fr24
    }

    async fn fetch(&self, point: &PointOfInterest) -> Result<Vec<Observation>> {
        let bbox = bounding_box(point.lat, point.lon, point.radius_nm);
        let bounds = format!(
            "{:.6},{:.6},{:.6},{:.6}",
            bbox.north, bbox.south, bbox.west, bbox.east
        );

        let response: Value = self
            .client
            .get(format!("{}/zones/fcgi/feed.js", self.api_base))
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .query(&[
                ("bounds", bounds.as_str()),
                ("faa", "1"),
                ("satellite", "1"),
                ("mlat", "1"),
                ("flarm", "1"),
                ("adsb", "1"),
                ("gnd", "0"),
                ("air", "1"),
                ("vehicles", "0"),
                ("estimated", "1"),
                ("maxage", "14400"),
                ("gliders", "0"),
                ("stats", "0"),
            ])
            .timeout(PROVIDER_TIMEOUT)
            .send()
            .await
            .context("feed request failed")?
            .error_for_status()
            .context("feed endpoint rejected request")?
            .json()
            .await
            .context("feed response is not valid JSON")?;

        let now = chrono::Utc::now().timestamp();
        let Some(feed) = response.as_object() else {
            anyhow::bail!("feed response is not a JSON object");
        };

        let mut observations = Vec::new();
        for (feed_id, row) in feed {
            if feed_id == "full_count" || feed_id == "version" {
                continue;
            }
            let Some(row) = row.as_array() else { continue };
            let Some(mut obs) = parse_row(now, feed_id, row) else {
                debug!("skipping malformed FR24 row {feed_id}");
                continue;
            };
            obs.is_military = self.mil_cache.lookup(&obs.hex).await;
            observations.push(obs);
        }
        Ok(observations)
    }
}

/// Normalize one feed row: [hex, lat, lon, track, alt_ft, gs_kt, squawk,
/// radar, type, reg, timestamp, from_iata, to_iata, flight_no, on_ground,
/// vs_fpm, callsign, _, airline_icao]. Units are already aeronautical.
pub fn parse_row(now: i64, feed_id: &str, row: &[Value]) -> Option<Observation> {
    if row.len() < 13 {
        return None;
    }
    let hex = row.first().and_then(Value::as_str).map(str::trim)?;
    if hex.is_empty() {
        return None;
    }

    let mut obs = Observation::new(ProviderId::Fr24, hex);
    obs.latitude = row.get(1).and_then(Value::as_f64);
    obs.longitude = row.get(2).and_then(Value::as_f64);
    obs.track_deg = row.get(3).and_then(Value::as_f64);
    obs.altitude_ft = row.get(4).and_then(Value::as_f64).map(|v| v.round() as i32);
    obs.ground_speed_kt = row.get(5).and_then(Value::as_f64).map(|v| v.round() as i32);
    obs.squawk = row.get(6).and_then(Value::as_str).and_then(clean);
    obs.aircraft_type = row.get(8).and_then(Value::as_str).and_then(clean);
    obs.registration = row.get(9).and_then(Value::as_str).and_then(clean);
    obs.origin_iata = row.get(11).and_then(Value::as_str).and_then(clean);
    obs.destination_iata = row.get(12).and_then(Value::as_str).and_then(clean);
    obs.flight_no = row.get(13).and_then(Value::as_str).and_then(clean);
    obs.on_ground = row
        .get(14)
        .and_then(|v| v.as_i64().map(|n| n != 0).or_else(|| v.as_bool()));
    obs.vertical_rate_fpm = row
        .get(15)
        .and_then(Value::as_f64)
        .map(|v| v.round() as i32);
    obs.callsign = row.get(16).and_then(Value::as_str).and_then(clean);

    let timestamp = row.get(10).and_then(Value::as_i64);
    obs.position_timestamp = timestamp;
    obs.age_sec = timestamp.map(|ts| ((now - ts) as f64).max(0.0));

    obs.airline_icao = row.get(18).and_then(Value::as_str).and_then(clean);

    if let Some(radar) = row.get(7).and_then(Value::as_str).and_then(clean) {
        obs.extras.insert("radar".to_string(), Value::String(radar));
    }
    obs.extras
        .insert("feed_id".to_string(), Value::String(feed_id.to_string()));

    obs.require_full_position();
    Some(obs)
}
