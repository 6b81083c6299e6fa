use serde_json::{Value, json};

use crate::aircraft::{Classification, MergedAircraft};

/// The two records singled out for publication.
#[derive(Debug, Clone, Default)]
pub struct Selection {
    /// Closest aircraft with a known position.
    pub nearest: Option<MergedAircraft>,
    /// Closest Military/Commercial aircraft, military winning distance
    /// ties.
    pub nearest_commercial: Option<MergedAircraft>,
}

/// Pick the nearest and nearest-interesting aircraft from an enriched,
/// distance-annotated plane list.
pub fn select(planes: &[MergedAircraft]) -> Selection {
    let mut nearest: Option<&MergedAircraft> = None;
    let mut nearest_commercial: Option<&MergedAircraft> = None;
    let mut nearest_military: Option<&MergedAircraft> = None;

    for plane in planes {
        let Some(distance) = plane.distance_nm else {
            continue;
        };
        if nearest.is_none_or(|best| distance < best.distance_nm.unwrap_or(f64::INFINITY)) {
            nearest = Some(plane);
        }
        match plane.classification {
            Some(Classification::Commercial) => {
                if nearest_commercial
                    .is_none_or(|best| distance < best.distance_nm.unwrap_or(f64::INFINITY))
                {
                    nearest_commercial = Some(plane);
                }
            }
            Some(Classification::Military) => {
                if nearest_military
                    .is_none_or(|best| distance < best.distance_nm.unwrap_or(f64::INFINITY))
                {
                    nearest_military = Some(plane);
                }
            }
            _ => {}
        }
    }

    // A military aircraft supersedes a commercial one only when it is at
    // least as close.
    let interesting = match (nearest_military, nearest_commercial) {
        (Some(military), Some(commercial)) => {
            if military.distance_nm <= commercial.distance_nm {
                Some(military)
            } else {
                Some(commercial)
            }
        }
        (Some(military), None) => Some(military),
        (None, Some(commercial)) => Some(commercial),
        (None, None) => None,
    };

    let mut selection = Selection {
        nearest: nearest.cloned(),
        nearest_commercial: interesting.cloned(),
    };
    if let Some(m) = selection.nearest.as_mut() {
        prepare_selected(m);
    }
    if let Some(m) = selection.nearest_commercial.as_mut() {
        prepare_selected(m);
    }
    selection
}

/// Convenience fields the display reads without digging into `lookups`.
pub fn prepare_selected(m: &mut MergedAircraft) {
    if m.airline_iata.is_none() {
        m.airline_iata = m
            .lookups
            .as_ref()
            .and_then(|l| l.airline.as_ref())
            .and_then(|a| a.iata.clone());
    }
}

/// Fields the display relies on unconditionally: padded with benign
/// defaults so the published schema is stable even when nothing was
/// derived.
const DEFAULT_FIELDS: &[(&str, &str)] = &[
    ("hex", ""),
    ("registration", ""),
    ("callsign", ""),
    ("aircraft_type", ""),
    ("airline_icao", ""),
    ("airline_iata", ""),
    ("origin_iata", ""),
    ("destination_iata", ""),
    ("classification", ""),
    ("airline_logo_url", ""),
    ("airline_logo_path", ""),
    ("airline_logo_code", ""),
    ("country_flag_url", ""),
    ("country_flag_code", ""),
    ("country_flag_source", ""),
    ("souls_on_board_max_text", "N/A"),
];

/// Serialize a selected aircraft with the display defaults applied.
pub fn scaffolded_payload(m: &MergedAircraft) -> Value {
    let mut value = serde_json::to_value(m).unwrap_or(Value::Null);
    if let Some(obj) = value.as_object_mut() {
        for (key, default) in DEFAULT_FIELDS {
            let entry = obj.entry(key.to_string()).or_insert(Value::Null);
            if entry.is_null() {
                *entry = json!(default);
            }
        }
        for key in ["remaining_nm", "eta_min"] {
            let entry = obj.entry(key.to_string()).or_insert(Value::Null);
            if entry.is_null() {
                *entry = json!(0.0);
            }
        }
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aircraft::{AirlineLookup, Lookups};

    fn plane(hex: &str, distance: Option<f64>, class: Option<Classification>) -> MergedAircraft {
        let mut m = MergedAircraft::new(hex, 0);
        m.distance_nm = distance;
        m.classification = class;
        m
    }

    #[test]
    fn test_nearest_is_min_distance() {
        let planes = vec![
            plane("AAAAAA", Some(12.0), None),
            plane("BBBBBB", Some(3.5), None),
            plane("CCCCCC", None, None),
        ];
        let selection = select(&planes);
        assert_eq!(selection.nearest.unwrap().hex, "BBBBBB");
        assert!(selection.nearest_commercial.is_none());
    }

    #[test]
    fn test_commercial_wins_when_closer() {
        let planes = vec![
            plane("C0FFEE", Some(5.0), Some(Classification::Commercial)),
            plane("MILIT1", Some(7.0), Some(Classification::Military)),
        ];
        let selection = select(&planes);
        assert_eq!(selection.nearest.unwrap().hex, "C0FFEE");
        assert_eq!(selection.nearest_commercial.unwrap().hex, "C0FFEE");
    }

    #[test]
    fn test_military_supersedes_when_closer() {
        let planes = vec![
            plane("C0FFEE", Some(5.0), Some(Classification::Commercial)),
            plane("MILIT1", Some(4.0), Some(Classification::Military)),
        ];
        let selection = select(&planes);
        assert_eq!(selection.nearest.unwrap().hex, "MILIT1");
        assert_eq!(selection.nearest_commercial.unwrap().hex, "MILIT1");
    }

    #[test]
    fn test_military_wins_distance_tie() {
        let planes = vec![
            plane("C0FFEE", Some(5.0), Some(Classification::Commercial)),
            plane("MILIT1", Some(5.0), Some(Classification::Military)),
        ];
        let selection = select(&planes);
        assert_eq!(selection.nearest_commercial.unwrap().hex, "MILIT1");
    }

    #[test]
    fn test_private_never_selected_as_interesting() {
        let planes = vec![
            plane("PRIV01", Some(1.0), Some(Classification::Private)),
            plane("C0FFEE", Some(9.0), Some(Classification::Commercial)),
        ];
        let selection = select(&planes);
        assert_eq!(selection.nearest.unwrap().hex, "PRIV01");
        assert_eq!(selection.nearest_commercial.unwrap().hex, "C0FFEE");
    }

    #[test]
    fn test_airline_iata_copied_from_lookup() {
        let mut m = plane("AAAAAA", Some(2.0), Some(Classification::Commercial));
        m.lookups = Some(Lookups {
            airline: Some(AirlineLookup {
                iata: Some("AS".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        });
        let selection = select(&[m]);
        assert_eq!(
            selection.nearest.unwrap().airline_iata.as_deref(),
            Some("AS")
        );
    }

    #[test]
    fn test_scaffolded_payload_fills_defaults() {
        let m = plane("AAAAAA", Some(2.0), None);
        let payload = scaffolded_payload(&m);
        assert_eq!(payload["hex"], "AAAAAA");
        assert_eq!(payload["registration"], "");
        assert_eq!(payload["classification"], "");
        assert_eq!(payload["souls_on_board_max_text"], "N/A");
        assert_eq!(payload["remaining_nm"], 0.0);
        assert_eq!(payload["eta_min"], 0.0);
        assert_eq!(payload["country_flag_source"], "");
        // Derived values are left alone.
        assert_eq!(payload["distance_nm"], 2.0);
    }

    #[test]
    fn test_scaffolded_payload_keeps_real_values() {
        let mut m = plane("AAAAAA", Some(2.0), Some(Classification::Commercial));
        m.registration = Some("N512AS".to_string());
        m.remaining_nm = Some(81.4);
        let payload = scaffolded_payload(&m);
        assert_eq!(payload["registration"], "N512AS");
        assert_eq!(payload["classification"], "Commercial");
        assert_eq!(payload["remaining_nm"], 81.4);
    }
}
