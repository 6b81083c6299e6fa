use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::geo::PointOfInterest;
use crate::mil_cache::MilCache;
use crate::observation::{Observation, ProviderId, clean};
use crate::providers::{AircraftProvider, PROVIDER_TIMEOUT, USER_AGENT};

pub const DEFAULT_API_BASE: &str = "https://api.adsb.lol";

/// Keys consumed into the canonical observation; everything else an
/// aircraft entry carries is kept verbatim in `extras`.
const CONSUMED_KEYS: &[&str] = &[
    "hex", "flight", "r", "t", "lat", "lon", "alt_baro", "alt_geom", "gs", "track", "baro_rate",
    "geom_rate", "squawk", "category", "seen", "seen_pos",
];

/// adsb.lol point-query client. The v2 API takes the radius directly, no
/// bounding box required.
pub struct AdsbLolClient {
    client: reqwest::Client,
    api_base: String,
    mil_cache: Arc<MilCache>,
}

#[derive(Debug, Deserialize)]
struct PointResponse {
    /// Server time in milliseconds.
    now: Option<f64>,
    #[serde(default)]
    ac: Vec<Value>,
}

impl AdsbLolClient {
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
impl AircraftProvider for AdsbLolClient {
    fn id(&self) -> ProviderId {
        ProviderId::AdsbLol
    }

    async fn fetch(&self, point: &PointOfInterest) -> Result<Vec<Observation>> {
        let url = format!(
            "{}/v2/point/{}/{}/{}",
            self.api_base, point.lat, point.lon, point.radius_nm
        );
        let response: PointResponse = self
            .client
            .get(&url)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .timeout(PROVIDER_TIMEOUT)
            .send()
            .await
            .context("point request failed")?
            .error_for_status()
            .context("point endpoint rejected request")?
            .json()
            .await
            .context("point response is not valid JSON")?;

        let now = response
            .now
            .map(|ms| (ms / 1000.0).round() as i64)
            .unwrap_or_else(|| chrono::Utc::now().timestamp());

        let mut observations = Vec::new();
        for entry in &response.ac {
            let Some(mut obs) = parse_aircraft(now, entry) else {
                debug!("skipping malformed adsb.lol aircraft entry");
                continue;
            };
            obs.is_military = self.mil_cache.lookup(&obs.hex).await;
            observations.push(obs);
        }
        Ok(observations)
    }
}

/// Normalize one `ac` entry. Altitudes and speeds are already aeronautical
/// units; `alt_baro` may be the literal string "ground".
pub fn parse_aircraft(now: i64, entry: &Value) -> Option<Observation> {
    let obj = entry.as_object()?;
    let hex = obj.get("hex").and_then(Value::as_str).map(str::trim)?;
    if hex.is_empty() {
        return None;
    }

    let mut obs = Observation::new(ProviderId::AdsbLol, hex);
    let flight = obj.get("flight").and_then(Value::as_str).and_then(clean);
    obs.callsign = flight.clone();
    obs.flight_no = flight;
    obs.registration = obj.get("r").and_then(Value::as_str).and_then(clean);
    obs.aircraft_type = obj.get("t").and_then(Value::as_str).and_then(clean);
    obs.latitude = obj.get("lat").and_then(Value::as_f64);
    obs.longitude = obj.get("lon").and_then(Value::as_f64);
    obs.ground_speed_kt = obj
        .get("gs")
        .and_then(Value::as_f64)
        .map(|v| v.round() as i32);
    obs.track_deg = obj.get("track").and_then(Value::as_f64);
    obs.vertical_rate_fpm = obj
        .get("baro_rate")
        .and_then(Value::as_f64)
        .or_else(|| obj.get("geom_rate").and_then(Value::as_f64))
        .map(|v| v.round() as i32);
    obs.squawk = obj.get("squawk").and_then(Value::as_str).and_then(clean);
    obs.category = obj.get("category").and_then(Value::as_str).and_then(clean);

    // Geometric altitude preferred; a barometric "ground" marks a taxiing
    // aircraft rather than an altitude.
    match obj.get("alt_baro") {
        Some(Value::String(s)) if s == "ground" => obs.on_ground = Some(true),
        _ => {}
    }
    obs.altitude_ft = obj
        .get("alt_geom")
        .and_then(Value::as_f64)
        .or_else(|| obj.get("alt_baro").and_then(Value::as_f64))
        .map(|v| v.round() as i32);

    let seen = obj.get("seen").and_then(Value::as_f64);
    obs.age_sec = seen;
    obs.position_timestamp = seen.map(|s| now - s.round() as i64);

    for (key, value) in obj {
        if !CONSUMED_KEYS.contains(&key.as_str()) {
            obs.extras.insert(key.clone(), value.clone());
        }
    }

    obs.require_full_position();
    Some(obs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_entry() -> Value {
        json!({
            "hex": "a1b2c3",
            "flight": "ASA512  ",
            "r": "N512AS",
            "t": "B738",
            "lat": 46.1,
            "lon": -122.9,
            "alt_baro": 11950,
            "alt_geom": 12250,
            "gs": 412.6,
            "track": 183.2,
            "baro_rate": -640,
            "squawk": "3451",
            "category": "A3",
            "seen": 2.4,
            "messages": 4821,
            "rssi": -21.3
        })
    }

    #[test]
    fn test_parse_aircraft() {
        let obs = parse_aircraft(1_700_000_100, &sample_entry()).unwrap();
        assert_eq!(obs.hex, "A1B2C3");
        assert_eq!(obs.callsign.as_deref(), Some("ASA512"));
        assert_eq!(obs.flight_no.as_deref(), Some("ASA512"));
        assert_eq!(obs.registration.as_deref(), Some("N512AS"));
        assert_eq!(obs.aircraft_type.as_deref(), Some("B738"));
        assert_eq!(obs.altitude_ft, Some(12250));
        assert_eq!(obs.ground_speed_kt, Some(413));
        assert_eq!(obs.vertical_rate_fpm, Some(-640));
        assert_eq!(obs.category.as_deref(), Some("A3"));
        assert_eq!(obs.age_sec, Some(2.4));
        assert_eq!(obs.position_timestamp, Some(1_700_000_098));
    }

    #[test]
    fn test_leftover_fields_preserved_as_extras() {
        let obs = parse_aircraft(1_700_000_100, &sample_entry()).unwrap();
        assert_eq!(obs.extras.get("messages"), Some(&json!(4821)));
        assert_eq!(obs.extras.get("rssi"), Some(&json!(-21.3)));
        assert!(!obs.extras.contains_key("lat"));
        assert!(!obs.extras.contains_key("flight"));
    }

    #[test]
    fn test_parse_aircraft_on_ground() {
        let mut entry = sample_entry();
        entry["alt_baro"] = json!("ground");
        entry.as_object_mut().unwrap().remove("alt_geom");
        let obs = parse_aircraft(1_700_000_100, &entry).unwrap();
        assert_eq!(obs.on_ground, Some(true));
        assert_eq!(obs.altitude_ft, None);
    }

    #[test]
    fn test_parse_aircraft_baro_fallback() {
        let mut entry = sample_entry();
        entry.as_object_mut().unwrap().remove("alt_geom");
        let obs = parse_aircraft(1_700_000_100, &entry).unwrap();
        assert_eq!(obs.altitude_ft, Some(11950));
    }

    #[test]
    fn test_parse_aircraft_rejects_missing_hex() {
        assert!(parse_aircraft(0, &json!({"flight": "ASA512"})).is_none());
        assert!(parse_aircraft(0, &json!("not an object")).is_none());
    }
}
