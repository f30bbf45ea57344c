//! Left/right classification of a landmark at a decision point.
//!
//! A coarse test on geodetic deltas rather than a true bearing: the travel
//! direction is reduced to its dominant axis (north/south or east/west) and
//! the landmark is compared against the current vertex on the other axis.
//! Decision points are close together, so this is good enough for spoken
//! directions.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::GpsPoint;

/// Side of the road relative to the direction of travel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Left,
    Right,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Left => write!(f, "left"),
            Side::Right => write!(f, "right"),
        }
    }
}

/// Travel direction at `vertex` as `(dlat, dlon)` in degrees.
///
/// Uses the predecessor of `vertex`; the first vertex has none and looks
/// ahead to its successor instead. `None` if the route is too short or the
/// index is out of range.
pub fn travel_delta(route: &[GpsPoint], vertex: usize) -> Option<(f64, f64)> {
    let current = route.get(vertex)?;
    let (from, to) = if vertex > 0 {
        (&route[vertex - 1], current)
    } else {
        (current, route.get(1)?)
    };
    Some((to.latitude - from.latitude, to.longitude - from.longitude))
}

/// Side of `landmark` for a traveller at `current` moving by `(dlat, dlon)`.
pub fn side_of(current: &GpsPoint, (dlat, dlon): (f64, f64), landmark: &GpsPoint) -> Side {
    if dlat.abs() > dlon.abs() {
        let east = landmark.longitude > current.longitude;
        let north = dlat > 0.0;
        if east == north {
            Side::Right
        } else {
            Side::Left
        }
    } else {
        let landmark_north = landmark.latitude > current.latitude;
        let east = dlon >= 0.0;
        if landmark_north == east {
            Side::Left
        } else {
            Side::Right
        }
    }
}

/// Side of `landmark` at route vertex `vertex`.
///
/// # Example
/// ```
/// use poi_matcher::{classify_side, GpsPoint, Side};
///
/// let route = vec![GpsPoint::new(51.050, 13.737), GpsPoint::new(51.051, 13.737)];
/// let church = GpsPoint::new(51.051, 13.738); // east of the second vertex
///
/// assert_eq!(classify_side(&route, 1, &church), Some(Side::Right));
/// ```
pub fn classify_side(route: &[GpsPoint], vertex: usize, landmark: &GpsPoint) -> Option<Side> {
    let delta = travel_delta(route, vertex)?;
    Some(side_of(&route[vertex], delta, landmark))
}

#[cfg(test)]
mod tests {
    use super::*;

    const ORIGIN: GpsPoint = GpsPoint { latitude: 51.05, longitude: 13.73 };

    fn offset(dlat: f64, dlon: f64) -> GpsPoint {
        GpsPoint::new(ORIGIN.latitude + dlat, ORIGIN.longitude + dlon)
    }

    #[test]
    fn test_moving_north() {
        let route = vec![offset(-0.001, 0.0), ORIGIN];
        assert_eq!(classify_side(&route, 1, &offset(0.0, 0.0005)), Some(Side::Right));
        assert_eq!(classify_side(&route, 1, &offset(0.0, -0.0005)), Some(Side::Left));
    }

    #[test]
    fn test_moving_south() {
        let route = vec![offset(0.001, 0.0), ORIGIN];
        assert_eq!(classify_side(&route, 1, &offset(0.0, 0.0005)), Some(Side::Left));
        assert_eq!(classify_side(&route, 1, &offset(0.0, -0.0005)), Some(Side::Right));
    }

    #[test]
    fn test_moving_east() {
        let route = vec![offset(0.0, -0.001), ORIGIN];
        assert_eq!(classify_side(&route, 1, &offset(0.0005, 0.0)), Some(Side::Left));
        assert_eq!(classify_side(&route, 1, &offset(-0.0005, 0.0)), Some(Side::Right));
    }

    #[test]
    fn test_moving_west() {
        let route = vec![offset(0.0, 0.001), ORIGIN];
        assert_eq!(classify_side(&route, 1, &offset(0.0005, 0.0)), Some(Side::Right));
        assert_eq!(classify_side(&route, 1, &offset(-0.0005, 0.0)), Some(Side::Left));
    }

    #[test]
    fn test_first_vertex_looks_ahead() {
        // Heading north from the first vertex
        let route = vec![ORIGIN, offset(0.001, 0.0)];
        assert_eq!(classify_side(&route, 0, &offset(0.0, 0.0005)), Some(Side::Right));
    }

    #[test]
    fn test_dominant_axis_decides() {
        // Mostly north with a slight eastward drift
        let route = vec![offset(-0.001, -0.0002), ORIGIN];
        assert_eq!(classify_side(&route, 1, &offset(0.0003, 0.0005)), Some(Side::Right));
    }

    #[test]
    fn test_out_of_range() {
        let route = vec![ORIGIN];
        assert_eq!(classify_side(&route, 0, &ORIGIN), None);
        assert_eq!(classify_side(&route, 3, &ORIGIN), None);
    }
}
