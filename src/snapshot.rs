use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::aircraft::MergedAircraft;
use crate::enrichment::Enricher;
use crate::fusion::{merge_observations, sort_merged};
use crate::geo::{PointOfInterest, distance_nm, initial_bearing_deg, round1, round3};
use crate::observation::{Observation, ProviderId};
use crate::selection::{Selection, scaffolded_payload, select};

/// Counts embedded in the snapshot itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotStats {
    pub hex_count: usize,
    pub providers_present: Vec<ProviderId>,
}

/// One cycle's complete published state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    /// Cycle start, epoch seconds.
    pub timestamp: i64,
    pub point: PointOfInterest,
    pub stats: SnapshotStats,
    pub planes: Vec<MergedAircraft>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub nearest: Option<MergedAircraft>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub nearest_commercial: Option<MergedAircraft>,
}

impl Snapshot {
    /// Render the snapshot with display scaffolding applied to the
    /// selected records, the form written to the JSON mirror.
    pub fn to_scaffolded_value(&self) -> Value {
        let mut value = serde_json::to_value(self).unwrap_or(Value::Null);
        if let Some(obj) = value.as_object_mut() {
            if let Some(nearest) = &self.nearest {
                obj.insert("nearest".to_string(), scaffolded_payload(nearest));
            }
            if let Some(nearest_commercial) = &self.nearest_commercial {
                obj.insert(
                    "nearest_commercial".to_string(),
                    scaffolded_payload(nearest_commercial),
                );
            }
        }
        value
    }
}

/// Distance, bearing and in-radius relative to the point of interest.
pub fn apply_range_metrics(m: &mut MergedAircraft, point: &PointOfInterest) {
    let (Some(lat), Some(lon)) = (m.latitude, m.longitude) else {
        m.distance_nm = None;
        m.bearing_deg = None;
        m.within_radius = None;
        return;
    };
    let distance = distance_nm(point.lat, point.lon, lat, lon);
    m.distance_nm = Some(round3(distance));
    m.bearing_deg = Some(round1(initial_bearing_deg(point.lat, point.lon, lat, lon)) % 360.0);
    m.within_radius = Some(distance <= point.radius_nm);
}

/// Build one cycle's snapshot from raw observations: fuse, derive range,
/// enrich, order, and select. Pure in-memory work; all I/O happens before
/// and after this point.
pub fn build_snapshot(
    observations: &[Observation],
    point: &PointOfInterest,
    priority: &[ProviderId],
    enricher: &Enricher<'_>,
    now: i64,
) -> Snapshot {
    let mut planes = merge_observations(observations, priority, now);
    for plane in &mut planes {
        apply_range_metrics(plane, point);
        enricher.enrich(plane);
    }
    sort_merged(&mut planes);

    let Selection {
        nearest,
        nearest_commercial,
    } = select(&planes);

    let mut providers_present: Vec<ProviderId> = Vec::new();
    for obs in observations {
        if !providers_present.contains(&obs.provider) {
            providers_present.push(obs.provider);
        }
    }
    providers_present.sort_by_key(|p| p.as_str());

    Snapshot {
        timestamp: now,
        point: *point,
        stats: SnapshotStats {
            hex_count: planes.len(),
            providers_present,
        },
        planes,
        nearest,
        nearest_commercial,
    }
}
