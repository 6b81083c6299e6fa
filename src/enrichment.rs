use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::aircraft::{
    AircraftLookup, AirlineLookup, AirportLookup, Classification, FlagSource, LookupStatus,
    MergedAircraft,
};
use crate::catalogs::{AirlineRecord, Catalogs};
use crate::fusion::looks_like_iata_flight;
use crate::geo::{distance_nm, round1};

/// Numeric tail of an IATA flight number after the airline designator.
static FLIGHT_TAIL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{1,4}[A-Z]?$").unwrap());

/// Attaches reference-data lookups and everything derived from them.
///
/// Enrichment is a pure function of the fused base fields: running it twice
/// produces the same record as running it once.
pub struct Enricher<'a> {
    pub catalogs: &'a Catalogs,
    /// Seat count at or below which an unclassified aircraft is Private.
    pub private_seat_threshold: i64,
    pub datasets_dir: &'a Path,
    pub airline_logo_base_url: Option<&'a str>,
    pub country_flag_base_url: Option<&'a str>,
}

impl Enricher<'_> {
    pub fn enrich(&self, m: &mut MergedAircraft) {
        self.attach_aircraft_lookup(m);
        self.attach_airline_lookup(m);
        self.attach_airport_lookups(m);
        m.classification = self.classify(m);
        self.attach_airline_logo(m);
        self.attach_country_flag(m);
        self.attach_destination_range(m);

        if m.lookups.as_ref().is_some_and(|l| l.is_empty()) {
            m.lookups = None;
        }
    }

    fn attach_aircraft_lookup(&self, m: &mut MergedAircraft) {
        let Some(icao_type) = m.aircraft_type.as_deref().map(str::trim).filter(|s| !s.is_empty())
        else {
            m.souls_on_board_max = None;
            m.souls_on_board_max_is_estimate = false;
            m.souls_on_board_max_text = "N/A".to_string();
            return;
        };
        let icao_type = icao_type.to_string();

        let mut seats_from_catalog = None;
        let lookup = match self.catalogs.aircraft_type(&icao_type) {
            Some(record) => {
                seats_from_catalog = record.seats.filter(|s| *s > 0);
                AircraftLookup {
                    icao: icao_type.clone(),
                    name: record
                        .name
                        .clone()
                        .or_else(|| record.model.clone())
                        .unwrap_or_else(|| icao_type.clone()),
                    manufacturer: record.manufacturer.clone(),
                    model: record.model.clone(),
                    seats_max: record.seats,
                    iata_aliases: record.iata.clone().unwrap_or_default(),
                    lookup_status: LookupStatus::Found,
                }
            }
            None => AircraftLookup {
                icao: icao_type.clone(),
                name: icao_type.clone(),
                manufacturer: None,
                model: None,
                seats_max: None,
                iata_aliases: Vec::new(),
                lookup_status: LookupStatus::NotFound,
            },
        };
        m.lookups.get_or_insert_with(Default::default).aircraft = Some(lookup);

        // Catalog seats are authoritative; the heuristic table only fills
        // gaps and is always labelled an estimate.
        if let Some(seats) = seats_from_catalog {
            m.souls_on_board_max = Some(seats);
            m.souls_on_board_max_is_estimate = false;
            m.souls_on_board_max_text = seats.to_string();
        } else if let Some(estimate) = estimate_seat_max(&icao_type) {
            m.souls_on_board_max = Some(estimate);
            m.souls_on_board_max_is_estimate = true;
            m.souls_on_board_max_text = estimate.to_string();
        } else {
            m.souls_on_board_max = None;
            m.souls_on_board_max_is_estimate = false;
            m.souls_on_board_max_text = "N/A".to_string();
        }
    }

    fn attach_airline_lookup(&self, m: &mut MergedAircraft) {
        let by_icao = m
            .airline_icao
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .and_then(|icao| self.catalogs.airline_by_icao(icao));

        let airline = by_icao.or_else(|| {
            let candidate = m.flight_no.as_deref().or(m.callsign.as_deref())?;
            self.airline_from_flight_no(candidate)
        });

        m.lookups.get_or_insert_with(Default::default).airline =
            airline.map(|record| AirlineLookup {
                icao: record.icao.clone(),
                iata: record.iata.clone(),
                name: record.name.clone(),
                callsign: record.callsign.clone(),
                country_code: record.country_code.clone(),
                country_name: record.country_name.clone(),
            });
    }

    /// Infer the airline from a flight number's IATA prefix. Only values
    /// that already look like IATA flight numbers qualify, so military
    /// callsigns do not get misread as airlines. Designators are 2 or 3
    /// characters; the split is whichever leaves a numeric tail and a known
    /// airline.
    fn airline_from_flight_no(&self, flight_no: &str) -> Option<&AirlineRecord> {
        let flight_no = flight_no.trim();
        if !looks_like_iata_flight(flight_no) {
            return None;
        }
        for prefix_len in [2, 3] {
            if flight_no.len() <= prefix_len {
                continue;
            }
            let (prefix, tail) = flight_no.split_at(prefix_len);
            if !FLIGHT_TAIL_RE.is_match(tail) {
                continue;
            }
            if let Some(record) = self.catalogs.airline_by_iata(prefix) {
                return Some(record);
            }
        }
        None
    }

    fn attach_airport_lookups(&self, m: &mut MergedAircraft) {
        let origin = self.airport_lookup(m.origin_iata.as_deref());
        let destination = self.airport_lookup(m.destination_iata.as_deref());
        let lookups = m.lookups.get_or_insert_with(Default::default);
        lookups.origin_airport = origin;
        lookups.destination_airport = destination;
    }

    fn airport_lookup(&self, iata: Option<&str>) -> Option<AirportLookup> {
        let iata = iata.map(str::trim).filter(|s| !s.is_empty())?;
        let record = self.catalogs.airport(iata)?;
        let mut lookup = AirportLookup {
            iata: record.iata.clone(),
            name: record.name.clone(),
            city: record.city.clone(),
            region: record.region.clone(),
            country_code: record.country_code.clone(),
            country_name: record.country_name.clone(),
            lat: record.lat,
            lon: record.lon,
            elevation_ft: record.elevation_ft,
        };
        if lookup.country_name.is_none() {
            if let Some(code) = lookup.country_code.as_deref() {
                lookup.country_name = self.catalogs.country(code).and_then(|c| c.name.clone());
            }
        }
        Some(lookup)
    }

    fn classify(&self, m: &MergedAircraft) -> Option<Classification> {
        if m.is_military == Some(true) {
            return Some(Classification::Military);
        }
        let seats = m
            .souls_on_board_max
            .or_else(|| m.aircraft_type.as_deref().and_then(estimate_seat_max))?;
        if seats <= self.private_seat_threshold {
            Some(Classification::Private)
        } else {
            Some(Classification::Commercial)
        }
    }

    fn attach_airline_logo(&self, m: &mut MergedAircraft) {
        m.airline_logo_code = None;
        m.airline_logo_path = None;
        m.airline_logo_url = None;

        let code = m
            .airline_icao
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .or_else(|| {
                // Translate the looked-up IATA designator to ICAO.
                let iata = m.lookups.as_ref()?.airline.as_ref()?.iata.as_deref()?;
                self.catalogs.airline_by_iata(iata)?.icao.clone()
            });
        let Some(code) = code else { return };
        let code = code.to_ascii_uppercase();

        let file_name = format!("airline_logo_{code}.png");
        let path = self.datasets_dir.join("airline_logos").join(&file_name);
        if !path.exists() {
            return;
        }
        m.airline_logo_code = Some(code.clone());
        m.airline_logo_path = Some(path.display().to_string());
        m.airline_logo_url = self
            .airline_logo_base_url
            .map(|base| format!("{base}/airline_logo_{code}.bmp"));
    }

    fn attach_country_flag(&self, m: &mut MergedAircraft) {
        m.country_flag_code = None;
        m.country_flag_source = None;
        m.country_flag_url = None;

        let country_of = |airport: Option<&AirportLookup>| {
            airport
                .and_then(|a| a.country_code.as_deref())
                .map(|c| c.trim().to_ascii_uppercase())
                .filter(|c| !c.is_empty())
        };
        let origin = country_of(m.lookups.as_ref().and_then(|l| l.origin_airport.as_ref()));
        let destination =
            country_of(m.lookups.as_ref().and_then(|l| l.destination_airport.as_ref()));

        // The destination flag is more interesting than the origin unless
        // the aircraft is headed home to the US or flying domestically.
        let (code, source) = match (origin, destination) {
            (Some(o), Some(d)) => {
                if d != "US" && (o == "US" || d != o) {
                    (d, FlagSource::Destination)
                } else {
                    (o, FlagSource::Origin)
                }
            }
            (None, Some(d)) => (d, FlagSource::Destination),
            (Some(o), None) => (o, FlagSource::Origin),
            (None, None) => return,
        };
        if code.len() != 2 {
            return;
        }
        m.country_flag_url = self
            .country_flag_base_url
            .map(|base| format!("{base}/country_flag_{code}.png"));
        m.country_flag_code = Some(code);
        m.country_flag_source = Some(source);
    }

    /// Remaining distance and ETA toward the destination airport, when its
    /// coordinates are known and the aircraft is actually moving.
    fn attach_destination_range(&self, m: &mut MergedAircraft) {
        m.remaining_nm = None;
        m.eta_min = None;

        let (Some(lat), Some(lon)) = (m.latitude, m.longitude) else {
            return;
        };
        let Some(speed) = m.ground_speed_kt.filter(|s| *s > 0) else {
            return;
        };
        let Some(dest_iata) = m
            .destination_iata
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
        else {
            return;
        };

        let from_lookup = m
            .lookups
            .as_ref()
            .and_then(|l| l.destination_airport.as_ref())
            .and_then(|a| Some((a.lat?, a.lon?)));
        let destination = from_lookup.or_else(|| {
            let record = self.catalogs.airport(dest_iata)?;
            Some((record.lat?, record.lon?))
        });
        let Some((dest_lat, dest_lon)) = destination else {
            return;
        };

        let remaining = distance_nm(lat, lon, dest_lat, dest_lon);
        m.remaining_nm = Some(round1(remaining));
        m.eta_min = Some(round1(remaining / speed as f64 * 60.0));
    }
}

/// Upper-bound seat count by ICAO type designator, used only when the
/// catalog has no seat figure. Mixes family prefixes and exact types; the
/// order matters.
pub fn estimate_seat_max(icao_type: &str) -> Option<i64> {
    let t = icao_type.trim().to_ascii_uppercase();
    if t.is_empty() {
        return None;
    }
    let starts = |prefixes: &[&str]| prefixes.iter().any(|p| t.starts_with(p));

    if starts(&["A31", "A32"]) {
        return Some(244); // A321neo upper bound
    }
    if t.starts_with("B70") || t.starts_with("B72") {
        return Some(189);
    }
    if t.starts_with("B73") {
        return Some(230); // 737 family upper bound
    }
    if t.starts_with("B78") {
        return Some(330);
    }
    if starts(&["E17", "E19", "E29", "E75"]) {
        return Some(146); // E-Jets / E2 upper bound
    }
    if t.starts_with("CRJ") {
        return Some(104);
    }
    if starts(&["AT4", "AT7"]) {
        return Some(78); // ATR 42/72
    }
    if t.starts_with("DH8") {
        return Some(90);
    }
    if t.starts_with("DH2") {
        return Some(7); // Beaver
    }
    if t.starts_with("TISB") {
        return Some(6);
    }
    // GA and bizjet types
    if starts(&["BE33", "BE35", "BE36"]) {
        return Some(4);
    }
    if starts(&["BE55", "BE56", "BE58"]) {
        return Some(6);
    }
    if starts(&["BE76", "BE77", "BE80", "BE95"]) {
        return Some(4);
    }
    if t.starts_with("BE9") || t.starts_with("BE10") {
        return Some(9); // King Air 90/100
    }
    if t == "B350" {
        return Some(11);
    }
    if t.starts_with("LJ") {
        return Some(9);
    }
    if t == "PRM1" {
        return Some(6);
    }
    if t == "GALX" {
        return Some(10);
    }
    if t == "MU30" {
        return Some(8);
    }
    if matches!(t.as_str(), "H25A" | "H25B" | "H25C") {
        return Some(8);
    }
    if t == "FA10" {
        return Some(8);
    }
    if t == "FA20" {
        return Some(12);
    }
    if t == "FA8X" {
        return Some(19);
    }
    // Cessna singles and twins
    if matches!(t.as_str(), "C120" | "C140") {
        return Some(2);
    }
    if starts(&["C17", "C15", "C19"]) {
        return Some(4);
    }
    if t == "C180" {
        return Some(4);
    }
    if t == "C185" {
        return Some(6);
    }
    if t == "C188" {
        return Some(1);
    }
    if t == "C195" {
        return Some(5);
    }
    if matches!(t.as_str(), "C210" | "C310") {
        return Some(6);
    }
    None
}
