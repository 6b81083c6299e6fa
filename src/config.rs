use std::fmt::Display;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};

use crate::geo::PointOfInterest;
use crate::observation::ProviderId;

pub const DEFAULT_PROVIDER_PRIORITY: [ProviderId; 3] =
    [ProviderId::AdsbLol, ProviderId::Fr24, ProviderId::Opensky];

/// MQTT broker settings.
#[derive(Debug, Clone)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub prefix: String,
}

/// Runtime configuration assembled from the environment once at startup.
///
/// Every knob is environment-driven so the binary runs unchanged as a
/// systemd unit, in a container, or from a shell with a `.env` file.
/// Invalid values are startup-fatal.
#[derive(Debug, Clone)]
pub struct Config {
    pub point: PointOfInterest,
    pub fetch_interval_min: Duration,
    pub fetch_interval_max: Duration,
    pub skip_opensky: bool,
    pub skip_adsb: bool,
    pub skip_fr24: bool,
    /// Tie-break order when two providers report equally fresh values.
    pub provider_priority: Vec<ProviderId>,
    pub osk_client_id: Option<String>,
    pub osk_client_secret: Option<String>,
    pub mqtt: MqttConfig,
    pub publish_all_planes: bool,
    pub publish_nearest_commercial: bool,
    /// Seat count at or below which an unclassified aircraft is Private.
    pub private_designation_seats: i64,
    pub airline_logo_base_url: Option<String>,
    pub country_flag_base_url: Option<String>,
    pub media_lookup_base_url: Option<String>,
    pub write_json_path: Option<PathBuf>,
    pub datasets_dir: PathBuf,
    pub mil_cache_path: PathBuf,
    pub mil_cache_ttl: Duration,
    pub metrics_addr: Option<SocketAddr>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let lat = env_parse("LAT", 46.168_689)?;
        let lon = env_parse("LON", -123.020_309)?;
        let radius_nm: f64 = env_parse("RADIUS_NM", 10.0)?;
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
            bail!("LAT/LON out of range: {lat}, {lon}");
        }
        if radius_nm <= 0.0 {
            bail!("RADIUS_NM must be positive, got {radius_nm}");
        }

        let fetch_interval_min = Duration::from_secs(env_parse("FETCH_INTERVAL_MIN_SEC", 80u64)?);
        let fetch_interval_max = Duration::from_secs(env_parse("FETCH_INTERVAL_MAX_SEC", 100u64)?);
        if fetch_interval_min > fetch_interval_max {
            bail!(
                "FETCH_INTERVAL_MIN_SEC ({}s) exceeds FETCH_INTERVAL_MAX_SEC ({}s)",
                fetch_interval_min.as_secs(),
                fetch_interval_max.as_secs()
            );
        }

        let provider_priority = match env_var("PROVIDER_PRIORITY") {
            Some(raw) => parse_priority(&raw)?,
            None => DEFAULT_PROVIDER_PRIORITY.to_vec(),
        };

        let metrics_addr = env_var("METRICS_ADDR")
            .map(|raw| {
                raw.parse::<SocketAddr>()
                    .with_context(|| format!("invalid METRICS_ADDR: {raw:?}"))
            })
            .transpose()?;

        Ok(Self {
            point: PointOfInterest {
                lat,
                lon,
                radius_nm,
            },
            fetch_interval_min,
            fetch_interval_max,
            skip_opensky: env_flag("SKIP_OPENSKY"),
            skip_adsb: env_flag("SKIP_ADSB"),
            skip_fr24: env_flag("SKIP_FR24"),
            provider_priority,
            osk_client_id: env_var("OSK_CLIENT_ID"),
            osk_client_secret: env_var("OSK_CLIENT_SECRET"),
            mqtt: MqttConfig {
                host: env_var("MQTT_HOST").unwrap_or_else(|| "localhost".to_string()),
                port: env_parse("MQTT_PORT", 1883u16)?,
                username: env_var("MQTT_USER"),
                password: env_var("MQTT_PASS"),
                prefix: env_var("MQTT_PREFIX").unwrap_or_else(|| "skywatch".to_string()),
            },
            publish_all_planes: env_flag("MQTT_PUBLISH_ALL_PLANES"),
            publish_nearest_commercial: env_flag("MQTT_PUBLISH_NEAREST_COMMERCIAL"),
            private_designation_seats: env_parse("PRIVATE_DESIGNATION_SEATS", 8i64)?,
            airline_logo_base_url: env_var("AIRLINE_LOGO_BASE_URL").map(strip_trailing_slash),
            country_flag_base_url: env_var("COUNTRY_FLAG_BASE_URL").map(strip_trailing_slash),
            media_lookup_base_url: env_var("MEDIA_LOOKUP_BASE_URL").map(strip_trailing_slash),
            write_json_path: env_var("WRITE_JSON_PATH").map(PathBuf::from),
            datasets_dir: env_var("DATASETS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("datasets")),
            mil_cache_path: env_var("MIL_CACHE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("data/mil_cache.json")),
            mil_cache_ttl: Duration::from_secs(env_parse("MIL_CACHE_TTL_SEC", 21_600u64)?),
            metrics_addr,
        })
    }
}

/// Parse a comma-separated provider list, e.g. "adsb_lol,fr24,opensky".
pub fn parse_priority(raw: &str) -> Result<Vec<ProviderId>> {
    let mut priority = Vec::new();
    for part in raw.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let provider: ProviderId = part.parse()?;
        if !priority.contains(&provider) {
            priority.push(provider);
        }
    }
    if priority.is_empty() {
        bail!("provider priority is empty: {raw:?}");
    }
    Ok(priority)
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_parse<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    match env_var(key) {
        Some(raw) => raw
            .parse()
            .map_err(|e| anyhow!("invalid {key}={raw:?}: {e}")),
        None => Ok(default),
    }
}

fn env_flag(key: &str) -> bool {
    env_var(key).as_deref() == Some("1")
}

fn strip_trailing_slash(url: String) -> String {
    url.trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_priority() {
        let priority = parse_priority("fr24, adsb_lol ,opensky").unwrap();
        assert_eq!(
            priority,
            vec![ProviderId::Fr24, ProviderId::AdsbLol, ProviderId::Opensky]
        );
    }

    #[test]
    fn test_parse_priority_dedupes() {
        let priority = parse_priority("fr24,fr24,opensky").unwrap();
        assert_eq!(priority, vec![ProviderId::Fr24, ProviderId::Opensky]);
    }

    #[test]
    fn test_parse_priority_rejects_unknown() {
        assert!(parse_priority("fr24,flightaware").is_err());
        assert!(parse_priority(" , ").is_err());
    }

    #[test]
    fn test_strip_trailing_slash() {
        assert_eq!(
            strip_trailing_slash("https://cdn.example.com/raw/".to_string()),
            "https://cdn.example.com/raw"
        );
    }
}
