use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::media::{AircraftMedia, FlightRow};
use crate::observation::ProviderId;

/// Whether a catalog lookup found its key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LookupStatus {
    Found,
    NotFound,
}

/// Derived aircraft class used by the nearest-interesting hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Classification {
    Military,
    Private,
    Commercial,
}

/// Which end of the route supplied the country flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlagSource {
    Origin,
    Destination,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AircraftLookup {
    pub icao: String,
    /// Display name; falls back to the raw type code when the catalog has
    /// no entry so downstream displays can still render something.
    pub name: String,
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    pub seats_max: Option<i64>,
    #[serde(default)]
    pub iata_aliases: Vec<String>,
    pub lookup_status: LookupStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AirlineLookup {
    pub icao: Option<String>,
    pub iata: Option<String>,
    pub name: Option<String>,
    pub callsign: Option<String>,
    pub country_code: Option<String>,
    pub country_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AirportLookup {
    pub iata: Option<String>,
    pub name: Option<String>,
    pub city: Option<String>,
    pub region: Option<String>,
    pub country_code: Option<String>,
    pub country_name: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub elevation_ft: Option<f64>,
}

/// Reference-data lookups attached by enrichment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Lookups {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aircraft: Option<AircraftLookup>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub airline: Option<AirlineLookup>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin_airport: Option<AirportLookup>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination_airport: Option<AirportLookup>,
}

impl Lookups {
    pub fn is_empty(&self) -> bool {
        self.aircraft.is_none()
            && self.airline.is_none()
            && self.origin_airport.is_none()
            && self.destination_airport.is_none()
    }
}

/// One aircraft fused from every provider that saw it this cycle, plus the
/// enrichment and proximity data derived from it.
///
/// Serialization omits fields that were never derived; the published
/// nearest payloads are additionally padded with display defaults (see
/// `selection::scaffolded_payload`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MergedAircraft {
    pub hex: String,
    pub merged_timestamp: i64,
    /// Providers that contributed at least one surviving field.
    pub sources: Vec<ProviderId>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub latitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub longitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub altitude_ft: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub vertical_rate_fpm: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub ground_speed_kt: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub track_deg: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub squawk: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub on_ground: Option<bool>,

    /// Which provider supplied each selected telemetry field.
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub field_sources: BTreeMap<String, ProviderId>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub position_timestamp: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub position_age_sec: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub distance_nm: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub bearing_deg: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub within_radius: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub registration: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub aircraft_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub airline_icao: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub airline_iata: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub callsign: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub flight_no: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub origin_iata: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub destination_iata: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub origin_country: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub category: Option<String>,

    /// Three-valued military status: serialized even when unknown.
    pub is_military: Option<bool>,

    pub age_adsb_lol_sec: Option<f64>,
    pub age_fr24_sec: Option<f64>,
    pub age_opensky_sec: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub lookups: Option<Lookups>,

    pub souls_on_board_max: Option<i64>,
    pub souls_on_board_max_is_estimate: bool,
    pub souls_on_board_max_text: String,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub classification: Option<Classification>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub airline_logo_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub airline_logo_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub airline_logo_url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub country_flag_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub country_flag_source: Option<FlagSource>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub country_flag_url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub remaining_nm: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub eta_min: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub media: Option<AircraftMedia>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub history: Vec<FlightRow>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub media_errors: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub airline_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub plane_key: Option<String>,

    /// Provider leftovers flattened as `extras_<provider>_<field>`.
    #[serde(flatten)]
    pub extras: BTreeMap<String, serde_json::Value>,
}

impl MergedAircraft {
    pub fn new(hex: &str, merged_timestamp: i64) -> Self {
        Self {
            hex: hex.to_string(),
            merged_timestamp,
            souls_on_board_max_text: "N/A".to_string(),
            ..Default::default()
        }
    }

    /// Age of the freshest contributing provider, used for result ordering.
    pub fn min_age_sec(&self) -> f64 {
        [self.age_adsb_lol_sec, self.age_fr24_sec, self.age_opensky_sec]
            .into_iter()
            .flatten()
            .fold(f64::INFINITY, f64::min)
    }

    pub fn provider_age(&self, provider: ProviderId) -> Option<f64> {
        match provider {
            ProviderId::AdsbLol => self.age_adsb_lol_sec,
            ProviderId::Fr24 => self.age_fr24_sec,
            ProviderId::Opensky => self.age_opensky_sec,
        }
    }

    pub fn set_provider_age(&mut self, provider: ProviderId, age: Option<f64>) {
        match provider {
            ProviderId::AdsbLol => self.age_adsb_lol_sec = age,
            ProviderId::Fr24 => self.age_fr24_sec = age,
            ProviderId::Opensky => self.age_opensky_sec = age,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_min_age() {
        let mut m = MergedAircraft::new("A1B2C3", 0);
        assert_eq!(m.min_age_sec(), f64::INFINITY);
        m.age_fr24_sec = Some(9.0);
        m.age_adsb_lol_sec = Some(2.5);
        assert_eq!(m.min_age_sec(), 2.5);
    }

    #[test]
    fn test_serialization_omits_underived_fields() {
        let m = MergedAircraft::new("A1B2C3", 1_700_000_100);
        let value = serde_json::to_value(&m).unwrap();
        let obj = value.as_object().unwrap();
        assert!(!obj.contains_key("latitude"));
        assert!(!obj.contains_key("classification"));
        assert!(!obj.contains_key("media"));
        // Three-valued and scaffolded fields stay visible.
        assert!(obj.contains_key("is_military"));
        assert_eq!(obj["souls_on_board_max_text"], "N/A");
        assert_eq!(obj["souls_on_board_max"], serde_json::Value::Null);
    }

    #[test]
    fn test_extras_flattened() {
        let mut m = MergedAircraft::new("A1B2C3", 0);
        m.extras.insert(
            "extras_fr24_radar".to_string(),
            serde_json::Value::String("T-KPDX1".to_string()),
        );
        let value = serde_json::to_value(&m).unwrap();
        assert_eq!(value["extras_fr24_radar"], "T-KPDX1");
    }

    #[test]
    fn test_classification_labels() {
        assert_eq!(
            serde_json::to_value(Classification::Military).unwrap(),
            "Military"
        );
        assert_eq!(
            serde_json::to_value(FlagSource::Destination).unwrap(),
            "destination"
        );
        assert_eq!(
            serde_json::to_value(LookupStatus::NotFound).unwrap(),
            "not_found"
        );
    }
}
