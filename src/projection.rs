//! Local planar projection.
//!
//! Distances and lengths on raw longitude/latitude degrees are not
//! Euclidean. Every route is therefore re-projected into a local tangent
//! plane anchored at its first vertex: x grows east, y grows north, both in
//! meters. The scale factors come from the WGS84 ellipsoid radii of
//! curvature at the anchor latitude, which keeps the frame accurate to well
//! under 0.1% across a city.
//!
//! The projection is linear, so `to_geodetic(to_planar(p)) == p` up to
//! floating point rounding.

use geo::Coord;

use crate::GpsPoint;

const WGS84_SEMI_MAJOR_AXIS: f64 = 6_378_137.0;
const WGS84_ECCENTRICITY_SQ: f64 = 6.694_379_990_14e-3;

/// Smallest cosine used for the east-west scale, keeps the frame finite at the poles.
const MIN_COS_LAT: f64 = 1e-6;

/// Equirectangular projection around a fixed origin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocalProjection {
    origin: GpsPoint,
    meters_per_degree_lat: f64,
    meters_per_degree_lon: f64,
}

impl LocalProjection {
    /// Create a projection anchored at `origin`.
    ///
    /// # Example
    /// ```
    /// use poi_matcher::{GpsPoint, LocalProjection};
    ///
    /// let origin = GpsPoint::new(51.05, 13.73);
    /// let projection = LocalProjection::new(origin);
    ///
    /// let planar = projection.to_planar(&GpsPoint::new(51.051, 13.73));
    /// assert!(planar.x.abs() < 1e-9);
    /// assert!((planar.y - 111.26).abs() < 0.1);
    /// ```
    pub fn new(origin: GpsPoint) -> Self {
        let lat_rad = origin.latitude.to_radians();
        let sin_lat = lat_rad.sin();
        let w = 1.0 - WGS84_ECCENTRICITY_SQ * sin_lat * sin_lat;

        // Meridional and prime vertical radii of curvature
        let meridional = WGS84_SEMI_MAJOR_AXIS * (1.0 - WGS84_ECCENTRICITY_SQ) / w.powf(1.5);
        let prime_vertical = WGS84_SEMI_MAJOR_AXIS / w.sqrt();

        let cos_lat = lat_rad.cos().max(MIN_COS_LAT);

        Self {
            origin,
            meters_per_degree_lat: meridional.to_radians(),
            meters_per_degree_lon: (prime_vertical * cos_lat).to_radians(),
        }
    }

    pub fn origin(&self) -> GpsPoint {
        self.origin
    }

    /// Geodetic to planar meters.
    pub fn to_planar(&self, point: &GpsPoint) -> Coord {
        let d_lon = wrap_longitude(point.longitude - self.origin.longitude);
        Coord {
            x: d_lon * self.meters_per_degree_lon,
            y: (point.latitude - self.origin.latitude) * self.meters_per_degree_lat,
        }
    }

    /// Planar meters back to geodetic.
    pub fn to_geodetic(&self, coord: Coord) -> GpsPoint {
        GpsPoint::new(
            self.origin.latitude + coord.y / self.meters_per_degree_lat,
            wrap_longitude(self.origin.longitude + coord.x / self.meters_per_degree_lon),
        )
    }
}

/// Normalize a longitude (or longitude difference) into [-180, 180).
fn wrap_longitude(lon: f64) -> f64 {
    if (-180.0..180.0).contains(&lon) {
        lon
    } else {
        (lon + 180.0).rem_euclid(360.0) - 180.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo_utils::haversine_distance;

    #[test]
    fn test_origin_maps_to_zero() {
        let origin = GpsPoint::new(53.55, 9.99);
        let projection = LocalProjection::new(origin);
        let planar = projection.to_planar(&origin);
        assert_eq!(planar, Coord { x: 0.0, y: 0.0 });
    }

    #[test]
    fn test_round_trip_is_centimeter_accurate() {
        let projection = LocalProjection::new(GpsPoint::new(53.55, 9.99));
        for (lat, lon) in [(53.60, 10.05), (53.50, 9.90), (53.551, 9.991)] {
            let p = GpsPoint::new(lat, lon);
            let back = projection.to_geodetic(projection.to_planar(&p));
            assert!(haversine_distance(&p, &back) < 0.01);
        }
    }

    #[test]
    fn test_planar_distance_matches_haversine() {
        let origin = GpsPoint::new(51.05, 13.73);
        let projection = LocalProjection::new(origin);
        let other = GpsPoint::new(51.06, 13.75);

        let planar = projection.to_planar(&other);
        let planar_dist = (planar.x * planar.x + planar.y * planar.y).sqrt();
        let haversine = haversine_distance(&origin, &other);

        // Within 0.5% at ~1.7km
        assert!((planar_dist - haversine).abs() / haversine < 0.005);
    }

    #[test]
    fn test_antimeridian_wraps() {
        let projection = LocalProjection::new(GpsPoint::new(0.0, 179.9995));
        let east = projection.to_planar(&GpsPoint::new(0.0, -179.9995));
        assert!(east.x > 0.0 && east.x < 200.0);

        let back = projection.to_geodetic(east);
        assert!((back.longitude + 179.9995).abs() < 1e-9);
    }
}
