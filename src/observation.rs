use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use anyhow::{Error, bail};
use serde::{Deserialize, Serialize};

/// Upstream traffic data providers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderId {
    Opensky,
    #[default]
    AdsbLol,
    Fr24,
}

impl ProviderId {
    /// All providers in the default tie-break priority order.
    pub fn all() -> [ProviderId; 3] {
        [ProviderId::AdsbLol, ProviderId::Fr24, ProviderId::Opensky]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::Opensky => "opensky",
            ProviderId::AdsbLol => "adsb_lol",
            ProviderId::Fr24 => "fr24",
        }
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "opensky" => Ok(ProviderId::Opensky),
            "adsb_lol" | "adsb" => Ok(ProviderId::AdsbLol),
            "fr24" => Ok(ProviderId::Fr24),
            other => bail!("unknown provider: {other:?}"),
        }
    }
}

// Unit conversions applied at normalization time. Converted integers are
// rounded, never truncated.
pub const M_TO_FT: f64 = 3.28084;
pub const MPS_TO_KT: f64 = 1.94384;
pub const MPS_TO_FPM: f64 = 196.85;

pub fn meters_to_feet(meters: f64) -> i32 {
    (meters * M_TO_FT).round() as i32
}

pub fn mps_to_knots(mps: f64) -> i32 {
    (mps * MPS_TO_KT).round() as i32
}

pub fn mps_to_fpm(mps: f64) -> i32 {
    (mps * MPS_TO_FPM).round() as i32
}

/// Trim a string value, mapping empty results to `None`.
pub fn clean(s: &str) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// One provider's view of one aircraft at a point in time.
///
/// Providers normalize their wire formats into this shape; everything the
/// canonical record does not model is preserved verbatim in `extras` for
/// diagnostics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Observation {
    pub provider: ProviderId,
    /// 24-bit ICAO Mode-S address, uppercased.
    pub hex: String,
    pub callsign: Option<String>,
    pub flight_no: Option<String>,
    pub registration: Option<String>,
    /// ICAO aircraft type designator (e.g. "B738").
    pub aircraft_type: Option<String>,
    pub airline_icao: Option<String>,
    pub origin_iata: Option<String>,
    pub destination_iata: Option<String>,
    pub origin_country: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub altitude_ft: Option<i32>,
    pub ground_speed_kt: Option<i32>,
    pub track_deg: Option<f64>,
    pub vertical_rate_fpm: Option<i32>,
    pub squawk: Option<String>,
    pub on_ground: Option<bool>,
    pub category: Option<String>,
    /// Three-valued military status from the hex cache.
    pub is_military: Option<bool>,
    /// Epoch seconds of the provider's last position report.
    pub position_timestamp: Option<i64>,
    /// Freshness in seconds; lower is fresher. Either snapshot time minus
    /// the position timestamp or the provider's "seconds since seen".
    pub age_sec: Option<f64>,
    /// Provider fields with no canonical counterpart.
    pub extras: BTreeMap<String, serde_json::Value>,
}

impl Observation {
    pub fn new(provider: ProviderId, hex: &str) -> Self {
        Self {
            provider,
            hex: hex.trim().to_ascii_uppercase(),
            ..Default::default()
        }
    }

    /// Latitude and longitude are only meaningful together; drop a
    /// one-sided position.
    pub fn require_full_position(&mut self) {
        if self.latitude.is_none() || self.longitude.is_none() {
            self.latitude = None;
            self.longitude = None;
        }
    }
}
