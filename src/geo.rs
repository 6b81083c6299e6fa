use serde::{Deserialize, Serialize};

/// Mean Earth radius in nautical miles, the working unit of the tracker.
pub const EARTH_RADIUS_NM: f64 = 3440.065;

/// Center of the area of interest plus its radius.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PointOfInterest {
    pub lat: f64,
    pub lon: f64,
    pub radius_nm: f64,
}

/// Lat/lon box around a point, used for provider area queries.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub north: f64,
    pub south: f64,
    pub west: f64,
    pub east: f64,
}

/// Compute the bounding box covering `radius_nm` around a point.
///
/// One arc minute of latitude is one nautical mile; longitude shrinks with
/// cos(lat), floored at 0.1 so the box stays finite near the poles.
pub fn bounding_box(lat: f64, lon: f64, radius_nm: f64) -> BoundingBox {
    let lat_delta = radius_nm / 60.0;
    let lon_delta = radius_nm / (60.0 * lat.to_radians().cos().max(0.1));
    BoundingBox {
        north: lat + lat_delta,
        south: lat - lat_delta,
        west: lon - lon_delta,
        east: lon + lon_delta,
    }
}

/// Great-circle distance between two coordinates via the haversine formula.
pub fn distance_nm(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let dphi = (lat2 - lat1).to_radians();
    let dlambda = (lon2 - lon1).to_radians();

    let a = (dphi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (dlambda / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_NM * c
}

/// Initial great-circle bearing from the first coordinate to the second,
/// normalized into [0, 360).
pub fn initial_bearing_deg(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let dlambda = (lon2 - lon1).to_radians();

    let y = dlambda.sin() * phi2.cos();
    let x = phi1.cos() * phi2.sin() - phi1.sin() * phi2.cos() * dlambda.cos();
    (y.atan2(x).to_degrees() + 360.0) % 360.0
}

pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

pub fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}
