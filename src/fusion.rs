use std::cmp::Ordering;
use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::aircraft::MergedAircraft;
use crate::observation::{Observation, ProviderId};

/// IATA-style flight number: 2-3 character airline prefix, 1-4 digits,
/// optional suffix letter.
pub static IATA_FLIGHT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z0-9]{2,3}\d{1,4}[A-Z]?$").unwrap());

pub fn looks_like_iata_flight(s: &str) -> bool {
    IATA_FLIGHT_RE.is_match(s.trim())
}

/// Fuse one cycle's observations into one record per hex.
///
/// Telemetry fields are picked by freshness with the configured priority
/// breaking ties; identity fields follow fixed per-provider precedence.
pub fn merge_observations(
    observations: &[Observation],
    priority: &[ProviderId],
    now: i64,
) -> Vec<MergedAircraft> {
    let mut groups: HashMap<String, HashMap<ProviderId, &Observation>> = HashMap::new();
    for obs in observations {
        let hex = obs.hex.trim().to_ascii_uppercase();
        if hex.is_empty() || hex == "UNKNOWN" {
            continue;
        }
        // A provider reporting the same hex twice keeps its latest row.
        groups.entry(hex).or_default().insert(obs.provider, obs);
    }

    let mut merged: Vec<MergedAircraft> = groups
        .iter()
        .map(|(hex, by_provider)| merge_one(hex, by_provider, priority, now))
        .collect();
    sort_merged(&mut merged);
    merged
}

/// Order: freshest first, then closest (when distance is known), then hex.
pub fn sort_merged(planes: &mut [MergedAircraft]) {
    fn distance_key(m: &MergedAircraft) -> f64 {
        m.distance_nm.unwrap_or(f64::INFINITY)
    }
    planes.sort_by(|a, b| {
        a.min_age_sec()
            .partial_cmp(&b.min_age_sec())
            .unwrap_or(Ordering::Equal)
            .then_with(|| {
                distance_key(a)
                    .partial_cmp(&distance_key(b))
                    .unwrap_or(Ordering::Equal)
            })
            .then_with(|| a.hex.cmp(&b.hex))
    });
}

fn merge_one(
    hex: &str,
    by_provider: &HashMap<ProviderId, &Observation>,
    priority: &[ProviderId],
    now: i64,
) -> MergedAircraft {
    let mut m = MergedAircraft::new(hex, now);

    let mut sources: Vec<ProviderId> = by_provider.keys().copied().collect();
    sources.sort_by_key(|p| p.as_str());
    m.sources = sources;

    // Live telemetry, freshest value wins.
    macro_rules! pick_telemetry {
        ($field:ident, $name:literal) => {
            if let Some((value, source)) = pick(by_provider, priority, |o| o.$field.clone()) {
                m.$field = Some(value);
                m.field_sources.insert($name.to_string(), source);
            }
        };
    }
    pick_telemetry!(latitude, "latitude");
    pick_telemetry!(longitude, "longitude");
    pick_telemetry!(altitude_ft, "altitude_ft");
    pick_telemetry!(ground_speed_kt, "ground_speed_kt");
    pick_telemetry!(track_deg, "track_deg");
    pick_telemetry!(vertical_rate_fpm, "vertical_rate_fpm");
    pick_telemetry!(squawk, "squawk");
    pick_telemetry!(on_ground, "on_ground");

    // Position freshness follows whichever provider won the position.
    let position_source = m
        .field_sources
        .get("latitude")
        .or_else(|| m.field_sources.get("longitude"))
        .copied();
    if let Some(source) = position_source {
        if let Some(obs) = by_provider.get(&source) {
            m.position_timestamp = obs.position_timestamp;
            m.position_age_sec = obs.position_timestamp.map(|ts| (now - ts) as f64);
        }
    }

    // Identity fields use fixed precedence, not freshness: a stale
    // registration is still the registration.
    m.registration = first_value(
        by_provider,
        &[ProviderId::Fr24, ProviderId::AdsbLol],
        |o| o.registration.clone(),
    );
    m.aircraft_type = first_value(
        by_provider,
        &[ProviderId::AdsbLol, ProviderId::Fr24, ProviderId::Opensky],
        |o| o.aircraft_type.clone(),
    );
    m.airline_icao = first_value(by_provider, &[ProviderId::Fr24], |o| o.airline_icao.clone());
    m.callsign = first_value(
        by_provider,
        &[ProviderId::AdsbLol, ProviderId::Fr24, ProviderId::Opensky],
        |o| o.callsign.clone(),
    );
    m.flight_no = pick_flight_no(by_provider);
    m.origin_iata = first_value(by_provider, &[ProviderId::Fr24], |o| o.origin_iata.clone());
    m.destination_iata = first_value(by_provider, &[ProviderId::Fr24], |o| {
        o.destination_iata.clone()
    });
    m.origin_country = first_value(by_provider, &[ProviderId::Opensky], |o| {
        o.origin_country.clone()
    });
    m.category = first_value(by_provider, &[ProviderId::AdsbLol], |o| o.category.clone());

    // Three-valued military merge: any true wins, else any false, else
    // unknown.
    let mut any_true = false;
    let mut any_false = false;
    for obs in by_provider.values() {
        match obs.is_military {
            Some(true) => any_true = true,
            Some(false) => any_false = true,
            None => {}
        }
    }
    m.is_military = if any_true {
        Some(true)
    } else if any_false {
        Some(false)
    } else {
        None
    };

    for provider in ProviderId::all() {
        m.set_provider_age(
            provider,
            by_provider.get(&provider).and_then(|o| o.age_sec),
        );
    }

    // Provider leftovers, namespaced per provider for diagnostics.
    for provider in ProviderId::all() {
        let Some(obs) = by_provider.get(&provider) else {
            continue;
        };
        for (key, value) in &obs.extras {
            m.extras
                .entry(format!("extras_{}_{key}", provider.as_str()))
                .or_insert_with(|| value.clone());
        }
    }

    m
}

/// Choose a field value among providers: smallest age first, configured
/// priority breaking ties, priority order as the fallback when no age is
/// comparable.
fn pick<T: Clone>(
    by_provider: &HashMap<ProviderId, &Observation>,
    priority: &[ProviderId],
    get: impl Fn(&Observation) -> Option<T>,
) -> Option<(T, ProviderId)> {
    let mut candidates: Vec<(f64, ProviderId, T)> = Vec::new();
    for (provider, obs) in by_provider {
        if let Some(value) = get(obs) {
            candidates.push((obs.age_sec.unwrap_or(f64::INFINITY), *provider, value));
        }
    }
    if candidates.is_empty() {
        return None;
    }

    let min_age = candidates
        .iter()
        .map(|c| c.0)
        .fold(f64::INFINITY, f64::min);
    for provider in priority {
        if let Some(c) = candidates
            .iter()
            .find(|c| c.1 == *provider && c.0 == min_age)
        {
            return Some((c.2.clone(), c.1));
        }
    }
    for provider in priority {
        if let Some(c) = candidates.iter().find(|c| c.1 == *provider) {
            return Some((c.2.clone(), c.1));
        }
    }
    // Providers outside the configured priority entirely: freshest wins.
    candidates.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));
    candidates.into_iter().next().map(|c| (c.2, c.1))
}

fn first_value<T>(
    by_provider: &HashMap<ProviderId, &Observation>,
    precedence: &[ProviderId],
    get: impl Fn(&Observation) -> Option<T>,
) -> Option<T> {
    precedence
        .iter()
        .filter_map(|p| by_provider.get(p).and_then(|o| get(o)))
        .next()
}

/// Flight numbers prefer a well-formed IATA value over whatever a provider
/// happened to report.
fn pick_flight_no(by_provider: &HashMap<ProviderId, &Observation>) -> Option<String> {
    let candidates: Vec<String> = [ProviderId::Fr24, ProviderId::AdsbLol]
        .iter()
        .filter_map(|p| by_provider.get(p).and_then(|o| o.flight_no.clone()))
        .collect();
    candidates
        .iter()
        .find(|c| looks_like_iata_flight(c))
        .or_else(|| candidates.first())
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs(provider: ProviderId, hex: &str, age: f64) -> Observation {
        let mut o = Observation::new(provider, hex);
        o.age_sec = Some(age);
        o
    }

    #[test]
    fn test_grouping_drops_unknown_and_empty() {
        let observations = vec![
            obs(ProviderId::AdsbLol, "a1b2c3", 1.0),
            obs(ProviderId::Fr24, "UNKNOWN", 1.0),
            obs(ProviderId::Fr24, "  ", 1.0),
        ];
        let merged = merge_observations(&observations, &ProviderId::all(), 0);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].hex, "A1B2C3");
    }

    #[test]
    fn test_same_hex_merges_across_providers() {
        let mut a = obs(ProviderId::AdsbLol, "A1B2C3", 2.0);
        a.registration = Some("N512AS".to_string());
        let mut b = obs(ProviderId::Fr24, "a1b2c3", 8.0);
        b.airline_icao = Some("ASA".to_string());
        let merged = merge_observations(&[a, b], &ProviderId::all(), 0);
        assert_eq!(merged.len(), 1);
        let m = &merged[0];
        assert_eq!(m.sources, vec![ProviderId::AdsbLol, ProviderId::Fr24]);
        assert_eq!(m.registration.as_deref(), Some("N512AS"));
        assert_eq!(m.airline_icao.as_deref(), Some("ASA"));
    }

    #[test]
    fn test_freshest_telemetry_wins() {
        let mut stale = obs(ProviderId::AdsbLol, "A1B2C3", 30.0);
        stale.altitude_ft = Some(11000);
        let mut fresh = obs(ProviderId::Opensky, "A1B2C3", 3.0);
        fresh.altitude_ft = Some(11200);
        let merged = merge_observations(&[stale, fresh], &ProviderId::all(), 0);
        let m = &merged[0];
        assert_eq!(m.altitude_ft, Some(11200));
        assert_eq!(m.field_sources["altitude_ft"], ProviderId::Opensky);
    }

    #[test]
    fn test_equal_age_tie_broken_by_priority() {
        let mut fr24 = obs(ProviderId::Fr24, "A1B2C3", 4.0);
        fr24.altitude_ft = Some(12000);
        let mut adsb = obs(ProviderId::AdsbLol, "A1B2C3", 4.0);
        adsb.altitude_ft = Some(11950);

        let priority = [ProviderId::Fr24, ProviderId::AdsbLol, ProviderId::Opensky];
        let merged = merge_observations(&[fr24.clone(), adsb.clone()], &priority, 0);
        assert_eq!(merged[0].altitude_ft, Some(12000));
        assert_eq!(merged[0].field_sources["altitude_ft"], ProviderId::Fr24);

        // Flipping the priority flips the winner.
        let priority = [ProviderId::AdsbLol, ProviderId::Fr24, ProviderId::Opensky];
        let merged = merge_observations(&[fr24, adsb], &priority, 0);
        assert_eq!(merged[0].altitude_ft, Some(11950));
        assert_eq!(merged[0].field_sources["altitude_ft"], ProviderId::AdsbLol);
    }

    #[test]
    fn test_missing_age_ranks_last() {
        let mut ageless = obs(ProviderId::AdsbLol, "A1B2C3", 0.0);
        ageless.age_sec = None;
        ageless.track_deg = Some(90.0);
        let mut aged = obs(ProviderId::Opensky, "A1B2C3", 20.0);
        aged.track_deg = Some(270.0);
        let merged = merge_observations(&[ageless, aged], &ProviderId::all(), 0);
        assert_eq!(merged[0].track_deg, Some(270.0));
        assert_eq!(merged[0].field_sources["track_deg"], ProviderId::Opensky);
    }

    #[test]
    fn test_position_age_follows_position_winner() {
        let mut fresh = obs(ProviderId::AdsbLol, "A1B2C3", 2.0);
        fresh.latitude = Some(46.1);
        fresh.longitude = Some(-122.9);
        fresh.position_timestamp = Some(998);
        let mut stale = obs(ProviderId::Fr24, "A1B2C3", 9.0);
        stale.latitude = Some(46.2);
        stale.longitude = Some(-122.8);
        stale.position_timestamp = Some(991);

        let merged = merge_observations(&[fresh, stale], &ProviderId::all(), 1000);
        let m = &merged[0];
        assert_eq!(m.latitude, Some(46.1));
        assert_eq!(m.position_timestamp, Some(998));
        assert_eq!(m.position_age_sec, Some(2.0));
    }

    #[test]
    fn test_identity_precedence_for_type() {
        let mut opensky = obs(ProviderId::Opensky, "A1B2C3", 1.0);
        opensky.aircraft_type = Some("B737".to_string());
        let mut fr24 = obs(ProviderId::Fr24, "A1B2C3", 5.0);
        fr24.aircraft_type = Some("B738".to_string());
        let mut adsb = obs(ProviderId::AdsbLol, "A1B2C3", 9.0);
        adsb.aircraft_type = Some("B38M".to_string());

        // adsb.lol wins regardless of being the stalest.
        let merged = merge_observations(&[opensky, fr24, adsb], &ProviderId::all(), 0);
        assert_eq!(merged[0].aircraft_type.as_deref(), Some("B38M"));
    }

    #[test]
    fn test_flight_no_prefers_iata_shape() {
        let mut fr24 = obs(ProviderId::Fr24, "A1B2C3", 1.0);
        fr24.flight_no = Some("ASA512".to_string());
        let mut adsb = obs(ProviderId::AdsbLol, "A1B2C3", 1.0);
        adsb.flight_no = Some("AS512".to_string());
        let merged = merge_observations(&[fr24, adsb], &ProviderId::all(), 0);
        // "AS512" matches the IATA pattern; "ASA512" is a callsign shape.
        assert_eq!(merged[0].flight_no.as_deref(), Some("AS512"));
    }

    #[test]
    fn test_flight_no_falls_back_to_any() {
        let mut fr24 = obs(ProviderId::Fr24, "A1B2C3", 1.0);
        fr24.flight_no = Some("TOPCAT11".to_string());
        let merged = merge_observations(&[fr24], &ProviderId::all(), 0);
        assert_eq!(merged[0].flight_no.as_deref(), Some("TOPCAT11"));
    }

    #[test]
    fn test_military_three_valued_merge() {
        let cases = [
            (vec![Some(true), Some(false)], Some(true)),
            (vec![Some(false), None], Some(false)),
            (vec![None, None], None),
            (vec![Some(true), None], Some(true)),
        ];
        for (flags, expected) in cases {
            let observations: Vec<Observation> = flags
                .iter()
                .zip([ProviderId::AdsbLol, ProviderId::Fr24])
                .map(|(flag, provider)| {
                    let mut o = obs(provider, "A1B2C3", 1.0);
                    o.is_military = *flag;
                    o
                })
                .collect();
            let merged = merge_observations(&observations, &ProviderId::all(), 0);
            assert_eq!(merged[0].is_military, expected, "flags {flags:?}");
        }
    }

    #[test]
    fn test_extras_namespaced_by_provider() {
        let mut fr24 = obs(ProviderId::Fr24, "A1B2C3", 1.0);
        fr24.extras
            .insert("radar".to_string(), serde_json::json!("T-KPDX1"));
        let mut adsb = obs(ProviderId::AdsbLol, "A1B2C3", 1.0);
        adsb.extras
            .insert("rssi".to_string(), serde_json::json!(-21.3));
        let merged = merge_observations(&[fr24, adsb], &ProviderId::all(), 0);
        let m = &merged[0];
        assert_eq!(m.extras["extras_fr24_radar"], "T-KPDX1");
        assert_eq!(m.extras["extras_adsb_lol_rssi"], -21.3);
    }

    #[test]
    fn test_sort_by_freshness_then_hex() {
        let mut a = obs(ProviderId::AdsbLol, "CCCCCC", 1.0);
        a.latitude = Some(46.0);
        let b = obs(ProviderId::AdsbLol, "BBBBBB", 9.0);
        let c = obs(ProviderId::AdsbLol, "AAAAAA", 9.0);
        let merged = merge_observations(&[a, b, c], &ProviderId::all(), 0);
        let hexes: Vec<&str> = merged.iter().map(|m| m.hex.as_str()).collect();
        assert_eq!(hexes, vec!["CCCCCC", "AAAAAA", "BBBBBB"]);
    }

    #[test]
    fn test_merge_is_deterministic() {
        let mut a = obs(ProviderId::AdsbLol, "A1B2C3", 4.0);
        a.altitude_ft = Some(11950);
        a.extras.insert("rssi".to_string(), serde_json::json!(-20.1));
        let mut b = obs(ProviderId::Fr24, "A1B2C3", 4.0);
        b.altitude_ft = Some(12000);
        let observations = vec![a, b, obs(ProviderId::Opensky, "FFFFFF", 2.0)];

        let first = merge_observations(&observations, &ProviderId::all(), 77);
        let second = merge_observations(&observations, &ProviderId::all(), 77);
        assert_eq!(first, second);
    }
}
