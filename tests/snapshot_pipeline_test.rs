use serde_json::json;

use skywatch::aircraft::Classification;
use skywatch::catalogs::Catalogs;
use skywatch::enrichment::Enricher;
use skywatch::geo::PointOfInterest;
use skywatch::observation::{Observation, ProviderId};
use skywatch::providers::opensky::parse_state;
use skywatch::selection::scaffolded_payload;
use skywatch::snapshot::build_snapshot;

const NOW: i64 = 1_700_000_100;

fn point() -> PointOfInterest {
    PointOfInterest {
        lat: 46.168689,
        lon: -123.020309,
        radius_nm: 50.0,
    }
}

fn enricher(catalogs: &Catalogs) -> Enricher<'_> {
    Enricher {
        catalogs,
        private_seat_threshold: 8,
        datasets_dir: std::path::Path::new("datasets"),
        airline_logo_base_url: None,
        country_flag_base_url: None,
    }
}

/// Load catalogs from JSONL fixtures, the same path production takes.
fn catalogs_with(files: &[(&str, &[&str])]) -> Catalogs {
    let dir = tempfile::tempdir().unwrap();
    for (name, lines) in files {
        std::fs::write(dir.path().join(name), lines.join("\n")).unwrap();
    }
    Catalogs::load(dir.path())
}

/// An observation positioned `north_nm` nautical miles due north of the
/// point of interest (one arc minute of latitude per NM).
fn positioned(provider: ProviderId, hex: &str, north_nm: f64) -> Observation {
    let mut obs = Observation::new(provider, hex);
    obs.latitude = Some(point().lat + north_nm / 60.0);
    obs.longitude = Some(point().lon);
    obs.age_sec = Some(2.0);
    obs
}

fn snapshot_of(observations: &[Observation]) -> skywatch::Snapshot {
    let catalogs = Catalogs::empty();
    build_snapshot(
        observations,
        &point(),
        &ProviderId::all(),
        &enricher(&catalogs),
        NOW,
    )
}

#[test]
fn test_single_provider_single_aircraft() {
    // One OpenSky state vector: 3048 m baro altitude, 200 m/s ground
    // speed, position reported 4 s before the snapshot.
    let state = json!([
        "ac82ec",
        "ASA512",
        "United States",
        1_700_000_096,
        1_700_000_096,
        -123.0,
        46.0,
        3048.0,
        false,
        200.0,
        270.0,
        null,
        null,
        null,
        "1200"
    ]);
    let obs = parse_state(NOW, state.as_array().unwrap()).unwrap();
    let snapshot = snapshot_of(&[obs]);

    assert_eq!(snapshot.planes.len(), 1);
    let plane = &snapshot.planes[0];
    assert_eq!(plane.hex, "AC82EC");
    assert_eq!(plane.altitude_ft, Some(10000));
    assert_eq!(plane.ground_speed_kt, Some(389));
    assert_eq!(plane.track_deg, Some(270.0));
    assert_eq!(plane.sources, vec![ProviderId::Opensky]);
    assert_eq!(plane.field_sources["latitude"], ProviderId::Opensky);
    assert_eq!(plane.position_timestamp, Some(1_700_000_096));
    assert_eq!(plane.position_age_sec, Some(4.0));

    let distance = plane.distance_nm.unwrap();
    assert!((distance - 10.16).abs() < 0.05, "distance {distance}");
    assert_eq!(plane.within_radius, Some(true));

    let nearest = snapshot.nearest.as_ref().unwrap();
    assert_eq!(nearest.hex, "AC82EC");
    assert_eq!(snapshot.stats.hex_count, 1);
    assert_eq!(snapshot.stats.providers_present, vec![ProviderId::Opensky]);
}

#[test]
fn test_freshness_tie_broken_by_configured_priority() {
    let mut fr24 = positioned(ProviderId::Fr24, "A1B2C3", 5.0);
    fr24.age_sec = Some(4.0);
    fr24.altitude_ft = Some(12000);
    let mut adsb = positioned(ProviderId::AdsbLol, "A1B2C3", 5.0);
    adsb.age_sec = Some(4.0);
    adsb.altitude_ft = Some(11950);

    let catalogs = Catalogs::empty();
    let priority = [ProviderId::Fr24, ProviderId::AdsbLol, ProviderId::Opensky];
    let snapshot = build_snapshot(
        &[fr24, adsb],
        &point(),
        &priority,
        &enricher(&catalogs),
        NOW,
    );

    let plane = &snapshot.planes[0];
    assert_eq!(plane.altitude_ft, Some(12000));
    assert_eq!(plane.field_sources["altitude_ft"], ProviderId::Fr24);
}

#[test]
fn test_military_hierarchy() {
    let catalogs = catalogs_with(&[(
        "aircraft_types_full.jsonl",
        &[
            r#"{"icao":"B738","name":"Boeing 737-800","manufacturer":"Boeing","model":"737-800","seats":189}"#,
        ],
    )]);

    let commercial_at = |nm: f64| {
        let mut obs = positioned(ProviderId::AdsbLol, "C0FFEE", nm);
        obs.aircraft_type = Some("B738".to_string());
        obs.is_military = Some(false);
        obs
    };
    let military_at = |nm: f64| {
        let mut obs = positioned(ProviderId::AdsbLol, "AE01CE", nm);
        obs.is_military = Some(true);
        obs
    };

    // Commercial closer: it wins both selections.
    let snapshot = build_snapshot(
        &[commercial_at(5.0), military_at(7.0)],
        &point(),
        &ProviderId::all(),
        &enricher(&catalogs),
        NOW,
    );
    assert_eq!(snapshot.nearest.as_ref().unwrap().hex, "C0FFEE");
    assert_eq!(
        snapshot.nearest_commercial.as_ref().unwrap().hex,
        "C0FFEE"
    );

    // Military closer: it supersedes the commercial aircraft.
    let snapshot = build_snapshot(
        &[commercial_at(5.0), military_at(4.0)],
        &point(),
        &ProviderId::all(),
        &enricher(&catalogs),
        NOW,
    );
    assert_eq!(snapshot.nearest.as_ref().unwrap().hex, "AE01CE");
    let interesting = snapshot.nearest_commercial.as_ref().unwrap();
    assert_eq!(interesting.hex, "AE01CE");
    assert_eq!(interesting.classification, Some(Classification::Military));
    assert_eq!(interesting.is_military, Some(true));
}

#[test]
fn test_seat_estimate_feeds_classification() {
    // The catalog knows the type but not its seat count.
    let catalogs = catalogs_with(&[(
        "aircraft_types_full.jsonl",
        &[r#"{"icao":"B738","name":"Boeing 737-800","manufacturer":"Boeing","model":"737-800"}"#],
    )]);

    let mut obs = positioned(ProviderId::AdsbLol, "A1B2C3", 3.0);
    obs.aircraft_type = Some("B738".to_string());
    let snapshot = build_snapshot(
        &[obs],
        &point(),
        &ProviderId::all(),
        &enricher(&catalogs),
        NOW,
    );

    let plane = &snapshot.planes[0];
    assert_eq!(plane.souls_on_board_max, Some(230));
    assert!(plane.souls_on_board_max_is_estimate);
    assert_eq!(plane.souls_on_board_max_text, "230");
    assert_eq!(plane.classification, Some(Classification::Commercial));
}

#[test]
fn test_flag_selection_through_pipeline() {
    let catalogs = catalogs_with(&[(
        "airports.jsonl",
        &[
            r#"{"iata":"SEA","name":"Seattle-Tacoma International","city":"Seattle","country_code":"US","country_name":"United States","lat":47.449,"lon":-122.309}"#,
            r#"{"iata":"YVR","name":"Vancouver International","city":"Vancouver","country_code":"CA","country_name":"Canada","lat":49.194,"lon":-123.184}"#,
        ],
    )]);

    let mut obs = positioned(ProviderId::Fr24, "A1B2C3", 3.0);
    obs.origin_iata = Some("SEA".to_string());
    obs.destination_iata = Some("YVR".to_string());
    obs.ground_speed_kt = Some(300);
    let snapshot = build_snapshot(
        &[obs],
        &point(),
        &ProviderId::all(),
        &enricher(&catalogs),
        NOW,
    );

    let plane = &snapshot.planes[0];
    assert_eq!(plane.country_flag_code.as_deref(), Some("CA"));

    // Destination coordinates plus positive speed give remaining range
    // and an ETA consistent with it.
    let remaining = plane.remaining_nm.unwrap();
    let eta = plane.eta_min.unwrap();
    assert!(remaining > 0.0);
    assert!(
        (eta - remaining / 300.0 * 60.0).abs() < 0.1,
        "eta {eta} remaining {remaining}"
    );
}

#[test]
fn test_empty_cycle_still_builds_snapshot() {
    let snapshot = snapshot_of(&[]);
    assert!(snapshot.planes.is_empty());
    assert_eq!(snapshot.stats.hex_count, 0);
    assert!(snapshot.stats.providers_present.is_empty());
    assert!(snapshot.nearest.is_none());
    assert!(snapshot.nearest_commercial.is_none());
    assert_eq!(snapshot.timestamp, NOW);

    // The rendered form stays publishable.
    let value = snapshot.to_scaffolded_value();
    assert_eq!(value["planes"], json!([]));
    assert!(value.get("nearest").is_none());
}

#[test]
fn test_hex_unique_and_uppercase() {
    let observations = vec![
        positioned(ProviderId::AdsbLol, "a1b2c3", 5.0),
        positioned(ProviderId::Fr24, "A1B2C3", 5.1),
        positioned(ProviderId::Opensky, "A1B2C3", 5.2),
        positioned(ProviderId::AdsbLol, "ae01ce", 8.0),
    ];
    let snapshot = snapshot_of(&observations);

    assert_eq!(snapshot.planes.len(), 2);
    let mut seen = std::collections::HashSet::new();
    for plane in &snapshot.planes {
        assert_eq!(plane.hex.len(), 6);
        assert!(
            plane
                .hex
                .chars()
                .all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c)),
            "hex {} is not uppercase hexadecimal",
            plane.hex
        );
        assert!(seen.insert(plane.hex.clone()), "duplicate hex {}", plane.hex);
    }
}

#[test]
fn test_field_sources_subset_of_sources() {
    let mut adsb = positioned(ProviderId::AdsbLol, "A1B2C3", 5.0);
    adsb.altitude_ft = Some(12000);
    adsb.age_sec = Some(1.0);
    let mut opensky = positioned(ProviderId::Opensky, "A1B2C3", 5.05);
    opensky.ground_speed_kt = Some(400);
    opensky.age_sec = Some(9.0);

    let snapshot = snapshot_of(&[adsb, opensky]);
    let plane = &snapshot.planes[0];
    let telemetry_fields = [
        "latitude",
        "longitude",
        "altitude_ft",
        "ground_speed_kt",
        "track_deg",
        "vertical_rate_fpm",
        "squawk",
        "on_ground",
    ];
    assert!(!plane.field_sources.is_empty());
    for (field, provider) in &plane.field_sources {
        assert!(
            telemetry_fields.contains(&field.as_str()),
            "unexpected field {field}"
        );
        assert!(
            plane.sources.contains(provider),
            "{provider} supplied {field} but is not in sources"
        );
    }
}

#[test]
fn test_nearest_is_global_minimum_and_bearings_valid() {
    let observations: Vec<Observation> = (1..=12)
        .map(|i| {
            positioned(
                ProviderId::AdsbLol,
                &format!("A000{i:02}"),
                1.5 * i as f64,
            )
        })
        .collect();
    let snapshot = snapshot_of(&observations);

    let nearest = snapshot.nearest.as_ref().unwrap();
    for plane in &snapshot.planes {
        let distance = plane.distance_nm.unwrap();
        assert!(distance >= 0.0);
        let bearing = plane.bearing_deg.unwrap();
        assert!((0.0..360.0).contains(&bearing), "bearing {bearing}");
        assert!(nearest.distance_nm.unwrap() <= distance);
    }
}

#[test]
fn test_snapshot_build_is_deterministic() {
    let mut adsb = positioned(ProviderId::AdsbLol, "A1B2C3", 5.0);
    adsb.extras.insert("rssi".to_string(), json!(-19.7));
    let observations = vec![
        adsb,
        positioned(ProviderId::Fr24, "A1B2C3", 5.0),
        positioned(ProviderId::Opensky, "AE01CE", 2.0),
    ];

    let first = snapshot_of(&observations);
    let second = snapshot_of(&observations);
    assert_eq!(first.planes, second.planes);
    assert_eq!(
        serde_json::to_value(&first.planes).unwrap(),
        serde_json::to_value(&second.planes).unwrap()
    );
}

#[test]
fn test_scaffolded_nearest_payload_schema() {
    let snapshot = snapshot_of(&[positioned(ProviderId::AdsbLol, "A1B2C3", 5.0)]);
    let payload = scaffolded_payload(snapshot.nearest.as_ref().unwrap());

    for key in [
        "hex",
        "registration",
        "callsign",
        "aircraft_type",
        "airline_icao",
        "airline_iata",
        "origin_iata",
        "destination_iata",
        "classification",
        "airline_logo_url",
        "country_flag_code",
        "souls_on_board_max_text",
        "remaining_nm",
        "eta_min",
    ] {
        assert!(payload.get(key).is_some(), "missing scaffolded key {key}");
        assert!(!payload[key].is_null(), "scaffolded key {key} is null");
    }
    assert_eq!(payload["hex"], "A1B2C3");
    assert_eq!(payload["souls_on_board_max_text"], "N/A");
}
