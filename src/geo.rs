// 📍 Geodesic Distance - Great-circle distance between two coordinates
// Haversine formula on a spherical Earth, plus display formatting

use serde::{Deserialize, Serialize};

/// Mean Earth radius in meters
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Distances below this are shown in meters, otherwise kilometers
pub const KILOMETER_THRESHOLD: f64 = 1000.0;

// ============================================================================
// GEO POINT
// ============================================================================

/// A (latitude, longitude) pair in decimal degrees.
///
/// No identity beyond its coordinates. Used for stored places and for the
/// ephemeral user position. Coordinates are not validated.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        GeoPoint { latitude, longitude }
    }

    /// Great-circle distance to another point, in meters
    pub fn distance_to(&self, other: &GeoPoint) -> f64 {
        distance(*self, *other)
    }
}

impl From<(f64, f64)> for GeoPoint {
    fn from((latitude, longitude): (f64, f64)) -> Self {
        GeoPoint::new(latitude, longitude)
    }
}

// ============================================================================
// DISTANCE
// ============================================================================

/// Great-circle surface distance between two points, in meters.
///
/// Total over real inputs. The haversine intermediate is clamped to [0, 1]
/// so rounding near antipodal points never yields NaN; only non-finite
/// coordinates produce a non-finite result.
pub fn distance(a: GeoPoint, b: GeoPoint) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let d_lat = (b.latitude - a.latitude).to_radians();
    let d_lon = (b.longitude - a.longitude).to_radians();

    let sin_lat = (d_lat / 2.0).sin();
    let sin_lon = (d_lon / 2.0).sin();

    let h = sin_lat * sin_lat + lat1.cos() * lat2.cos() * sin_lon * sin_lon;
    let h = h.clamp(0.0, 1.0);

    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_METERS * c
}

/// Render a distance for display.
///
/// Below one kilometer: whole meters, e.g. `"700 m"`.
/// Otherwise: kilometers with two decimals, e.g. `"1.20 km"`.
/// Negative values are not clamped and land in the meters branch.
pub fn format_distance(distance_meters: f64) -> String {
    if distance_meters < KILOMETER_THRESHOLD {
        format!("{} m", distance_meters.round() as i64)
    } else {
        format!("{:.2} km", distance_meters / 1000.0)
    }
}

// ============================================================================
// TESTS
// ============================================================================
