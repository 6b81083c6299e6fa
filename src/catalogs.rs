use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

/// One aircraft type row from `aircraft_types_full.jsonl`.
#[derive(Debug, Clone, Deserialize)]
pub struct AircraftTypeRecord {
    pub icao: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub manufacturer: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub seats: Option<i64>,
    #[serde(default)]
    pub iata: Option<Vec<String>>,
}

/// One airline row from `airlines.jsonl`.
#[derive(Debug, Clone, Deserialize)]
pub struct AirlineRecord {
    #[serde(default)]
    pub icao: Option<String>,
    #[serde(default)]
    pub iata: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub callsign: Option<String>,
    #[serde(default)]
    pub country_code: Option<String>,
    #[serde(default)]
    pub country_name: Option<String>,
}

/// One airport row from `airports.jsonl`.
#[derive(Debug, Clone, Deserialize)]
pub struct AirportRecord {
    #[serde(default)]
    pub iata: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub country_code: Option<String>,
    #[serde(default)]
    pub country_name: Option<String>,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lon: Option<f64>,
    #[serde(default)]
    pub elevation_ft: Option<f64>,
}

/// One country row from `countries.jsonl`.
#[derive(Debug, Clone, Deserialize)]
pub struct CountryRecord {
    pub code: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// Read-only reference data loaded once at startup.
///
/// Missing files degrade to empty indexes so the pipeline still runs with
/// reduced enrichment.
#[derive(Debug, Default)]
pub struct Catalogs {
    aircraft: HashMap<String, AircraftTypeRecord>,
    airlines_by_icao: HashMap<String, AirlineRecord>,
    airlines_by_iata: HashMap<String, AirlineRecord>,
    airports: HashMap<String, AirportRecord>,
    countries: HashMap<String, CountryRecord>,
}

impl Catalogs {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load all catalogs from line-delimited JSON files under `dir`.
    pub fn load(dir: &Path) -> Self {
        let aircraft = load_jsonl_map(&dir.join("aircraft_types_full.jsonl"), |r: &AircraftTypeRecord| {
            Some(r.icao.clone())
        });
        let airlines_by_icao =
            load_jsonl_map(&dir.join("airlines.jsonl"), |r: &AirlineRecord| r.icao.clone());

        // The IATA index is a second view over the same airline rows.
        let mut airlines_by_iata = HashMap::new();
        for airline in airlines_by_icao.values() {
            if let Some(iata) = airline.iata.as_deref().filter(|s| !s.is_empty()) {
                airlines_by_iata.insert(iata.to_string(), airline.clone());
            }
        }

        let airports =
            load_jsonl_map(&dir.join("airports.jsonl"), |r: &AirportRecord| r.iata.clone());
        let countries =
            load_jsonl_map(&dir.join("countries.jsonl"), |r: &CountryRecord| Some(r.code.clone()));

        debug!(
            "loaded catalogs: {} aircraft types, {} airlines ({} with IATA), {} airports, {} countries",
            aircraft.len(),
            airlines_by_icao.len(),
            airlines_by_iata.len(),
            airports.len(),
            countries.len()
        );

        Self {
            aircraft,
            airlines_by_icao,
            airlines_by_iata,
            airports,
            countries,
        }
    }

    pub fn aircraft_type(&self, icao: &str) -> Option<&AircraftTypeRecord> {
        self.aircraft.get(icao)
    }

    pub fn airline_by_icao(&self, icao: &str) -> Option<&AirlineRecord> {
        self.airlines_by_icao.get(icao)
    }

    pub fn airline_by_iata(&self, iata: &str) -> Option<&AirlineRecord> {
        self.airlines_by_iata.get(iata)
    }

    pub fn airport(&self, iata: &str) -> Option<&AirportRecord> {
        self.airports.get(iata)
    }

    pub fn country(&self, code: &str) -> Option<&CountryRecord> {
        self.countries.get(code)
    }

    #[cfg(test)]
    pub fn insert_aircraft_type(&mut self, record: AircraftTypeRecord) {
        self.aircraft.insert(record.icao.clone(), record);
    }

    #[cfg(test)]
    pub fn insert_airline(&mut self, record: AirlineRecord) {
        if let Some(iata) = record.iata.clone() {
            self.airlines_by_iata.insert(iata, record.clone());
        }
        if let Some(icao) = record.icao.clone() {
            self.airlines_by_icao.insert(icao, record);
        }
    }

    #[cfg(test)]
    pub fn insert_airport(&mut self, record: AirportRecord) {
        if let Some(iata) = record.iata.clone() {
            self.airports.insert(iata, record);
        }
    }

    #[cfg(test)]
    pub fn insert_country(&mut self, record: CountryRecord) {
        self.countries.insert(record.code.clone(), record);
    }
}

/// Load a JSONL file into a map keyed by `key_of`. Blank and malformed
/// lines are skipped; a missing file yields an empty map.
fn load_jsonl_map<T, F>(path: &Path, key_of: F) -> HashMap<String, T>
where
    T: DeserializeOwned,
    F: Fn(&T) -> Option<String>,
{
    let file = match File::open(path) {
        Ok(file) => file,
        Err(err) => {
            warn!("catalog {} not loaded: {err}", path.display());
            return HashMap::new();
        }
    };

    let mut map = HashMap::new();
    for line in BufReader::new(file).lines() {
        let Ok(line) = line else { break };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Ok(record) = serde_json::from_str::<T>(line) else {
            continue;
        };
        if let Some(key) = key_of(&record).filter(|k| !k.is_empty()) {
            map.insert(key, record);
        }
    }
    map
}
