//! # Geographic Utilities
//!
//! Geodetic helpers used by the in-memory stores for coarse spatial
//! filtering. Exact distance and length math happens in the planar frame
//! (see [`crate::projection`]); the functions here only decide which
//! candidates are worth looking at.
//!
//! | Function | Description |
//! |----------|-------------|
//! | [`haversine_distance`] | Great-circle distance between two GPS points |
//! | [`compute_bounds`] | Bounding box of a GPS track |
//! | [`meters_to_degrees`] | Convert meters to approximate degrees at a latitude |
//!
//! All functions expect WGS84 coordinates (latitude/longitude in degrees).

use geo::{Distance, Haversine, Point};

use crate::{Bounds, GpsPoint};

/// Calculate the great-circle distance between two GPS points using the Haversine formula.
///
/// Returns the distance in meters along the Earth's surface.
///
/// # Example
///
/// ```rust
/// use poi_matcher::{GpsPoint, geo_utils};
///
/// let hamburg = GpsPoint::new(53.5511, 9.9937);
/// let dresden = GpsPoint::new(51.0504, 13.7373);
///
/// let distance = geo_utils::haversine_distance(&hamburg, &dresden);
/// assert!((distance - 377_000.0).abs() < 5_000.0);
/// ```
#[inline]
pub fn haversine_distance(p1: &GpsPoint, p2: &GpsPoint) -> f64 {
    let point1 = Point::new(p1.longitude, p1.latitude);
    let point2 = Point::new(p2.longitude, p2.latitude);
    Haversine::distance(point1, point2)
}

/// Convert meters to approximate degrees at a given latitude.
///
/// The longitude scale is used for both axes, which over-estimates the
/// latitude span. Suitable for search envelopes where a slightly larger
/// square is acceptable.
///
/// - At the equator, 1 degree ≈ 111,320 meters
/// - The value grows with 1 / cos(latitude), capped near the poles
#[inline]
pub fn meters_to_degrees(meters: f64, latitude: f64) -> f64 {
    let lat_rad = latitude.to_radians();
    let meters_per_degree = 111_320.0 * lat_rad.cos().max(0.1);
    meters / meters_per_degree
}

/// Compute the bounding box of a GPS track.
///
/// For empty input, returns bounds with MIN/MAX values that contain nothing.
pub fn compute_bounds(points: &[GpsPoint]) -> Bounds {
    let mut min_lat = f64::MAX;
    let mut max_lat = f64::MIN;
    let mut min_lng = f64::MAX;
    let mut max_lng = f64::MIN;

    for p in points {
        min_lat = min_lat.min(p.latitude);
        max_lat = max_lat.max(p.latitude);
        min_lng = min_lng.min(p.longitude);
        max_lng = max_lng.max(p.longitude);
    }

    Bounds { min_lat, max_lat, min_lng, max_lng }
}
