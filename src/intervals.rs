//! Arc-length intervals marking where features influence a route.

use geo::Coord;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::features::NearbyFeatureSet;
use crate::route::PlanarRoute;
use crate::MatchConfig;

/// A stretch `[start, end]` of the route, in meters from its start.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Interval {
    pub start: f64,
    pub end: f64,
}

impl Interval {
    /// Create an interval, swapping the bounds if given in reverse.
    pub fn new(start: f64, end: f64) -> Self {
        if start <= end {
            Self { start, end }
        } else {
            Self { start: end, end: start }
        }
    }

    /// `[center - elongation, center + elongation]` clamped to `[0, route_length]`.
    pub fn around(center: f64, elongation: f64, route_length: f64) -> Self {
        Self {
            start: (center - elongation).max(0.0),
            end: (center + elongation).min(route_length),
        }
    }

    pub fn length(&self) -> f64 {
        self.end - self.start
    }

    pub fn contains(&self, distance: f64) -> bool {
        distance >= self.start && distance <= self.end
    }
}

/// Merge overlapping or touching intervals.
///
/// The result is sorted by start, non-overlapping, and covers exactly the
/// union of the input. Merging an already merged list returns it unchanged.
///
/// # Example
/// ```
/// use poi_matcher::{merge_intervals, Interval};
///
/// let merged = merge_intervals(vec![
///     Interval::new(10.0, 20.0),
///     Interval::new(30.0, 40.0),
///     Interval::new(15.0, 25.0),
/// ]);
/// assert_eq!(merged, vec![Interval::new(10.0, 25.0), Interval::new(30.0, 40.0)]);
/// ```
pub fn merge_intervals(intervals: impl IntoIterator<Item = Interval>) -> Vec<Interval> {
    let mut sorted: Vec<Interval> = intervals.into_iter().collect();
    sorted.sort_by(|a, b| a.start.total_cmp(&b.start));

    let mut merged: Vec<Interval> = Vec::with_capacity(sorted.len());
    for next in sorted {
        match merged.last_mut() {
            Some(current) if next.start <= current.end => {
                current.end = current.end.max(next.end);
            }
            _ => merged.push(next),
        }
    }
    merged
}

/// Interval of a planar line piece: its two ends projected onto the route.
pub fn line_interval(route: &PlanarRoute, piece: &[Coord]) -> Option<Interval> {
    let first = piece.first()?;
    let last = piece.last()?;
    Some(Interval::new(route.project(*first), route.project(*last)))
}

/// Build the unmerged influence intervals for one category.
///
/// Point features strictly closer than `threshold` to the route become
/// `elongation`-padded intervals around their projection. Line features are
/// clipped to the route buffer and every remaining piece contributes the
/// interval between its projected ends, without padding.
pub fn build_intervals(
    route: &PlanarRoute,
    nearby: &NearbyFeatureSet,
    threshold: f64,
    elongation: f64,
    config: &MatchConfig,
) -> Vec<Interval> {
    let mut intervals = Vec::with_capacity(nearby.points.len() + nearby.lines.len());

    for feature in &nearby.points {
        let planar = route.to_planar(&feature.coordinate);
        if route.distance_to(planar) >= threshold {
            continue;
        }
        let d = route.project(planar);
        intervals.push(Interval::around(d, elongation, route.length()));
    }

    for feature in &nearby.lines {
        let planar: Vec<Coord> = feature.points.iter().map(|p| route.to_planar(p)).collect();
        let pieces = route.clip_line(&planar, threshold, config.clip_step_meters);
        intervals.extend(pieces.iter().filter_map(|piece| line_interval(route, piece)));
    }

    debug!(
        "{} points, {} lines -> {} intervals",
        nearby.points.len(),
        nearby.lines.len(),
        intervals.len()
    );

    intervals
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::{LineFeature, PointFeature};
    use crate::route::tests::planar_route;

    fn iv(start: f64, end: f64) -> Interval {
        Interval::new(start, end)
    }

    /// Small deterministic generator so the property tests need no extra crates.
    struct Lcg(u64);

    impl Lcg {
        fn next_f64(&mut self) -> f64 {
            self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            (self.0 >> 11) as f64 / (1u64 << 53) as f64
        }
    }

    fn random_intervals(rng: &mut Lcg, count: usize) -> Vec<Interval> {
        (0..count)
            .map(|_| {
                let start = rng.next_f64() * 1000.0;
                iv(start, start + rng.next_f64() * 60.0)
            })
            .collect()
    }

    fn covered(intervals: &[Interval], d: f64) -> bool {
        intervals.iter().any(|i| i.contains(d))
    }

    #[test]
    fn test_merge_example() {
        let merged = merge_intervals(vec![iv(10.0, 20.0), iv(15.0, 25.0), iv(30.0, 40.0)]);
        assert_eq!(merged, vec![iv(10.0, 25.0), iv(30.0, 40.0)]);
    }

    #[test]
    fn test_merge_touching_and_nested() {
        let merged = merge_intervals(vec![iv(0.0, 10.0), iv(10.0, 12.0), iv(2.0, 5.0)]);
        assert_eq!(merged, vec![iv(0.0, 12.0)]);
    }

    #[test]
    fn test_merge_empty() {
        assert!(merge_intervals(Vec::new()).is_empty());
    }

    #[test]
    fn test_merge_properties() {
        let mut rng = Lcg(42);
        for round in 0..50 {
            let input = random_intervals(&mut rng, 1 + round % 25);
            let merged = merge_intervals(input.clone());

            // Sorted and strictly separated
            for w in merged.windows(2) {
                assert!(w[0].end < w[1].start);
            }

            // Idempotent
            assert_eq!(merge_intervals(merged.clone()), merged);

            // Every input lies inside one merged interval
            for i in &input {
                assert!(merged.iter().any(|m| m.start <= i.start && i.end <= m.end));
            }

            // Same union, checked on a fine grid
            for k in 0..=10_600 {
                let d = k as f64 * 0.1;
                assert_eq!(covered(&input, d), covered(&merged, d));
            }
        }
    }

    #[test]
    fn test_interval_around_clamps() {
        assert_eq!(Interval::around(50.0, 20.0, 100.0), iv(30.0, 70.0));
        assert_eq!(Interval::around(5.0, 20.0, 100.0), iv(0.0, 25.0));
        assert_eq!(Interval::around(95.0, 20.0, 100.0), iv(75.0, 100.0));
    }

    #[test]
    fn test_point_feature_interval() {
        let route = planar_route(&[(0.0, 0.0), (100.0, 0.0)]);
        let feature = PointFeature::new("construction", route.to_geodetic(Coord { x: 50.0, y: 2.0 }));
        let nearby = NearbyFeatureSet { points: vec![feature], lines: vec![] };

        let intervals = build_intervals(&route, &nearby, 5.0, 20.0, &MatchConfig::default());
        assert_eq!(intervals.len(), 1);
        assert!((intervals[0].start - 30.0).abs() < 1e-6);
        assert!((intervals[0].end - 70.0).abs() < 1e-6);
    }

    #[test]
    fn test_point_at_threshold_is_excluded() {
        let route = planar_route(&[(0.0, 0.0), (100.0, 0.0)]);
        let at = PointFeature::new("construction", route.to_geodetic(Coord { x: 50.0, y: 5.0 }));
        let inside = PointFeature::new("construction", route.to_geodetic(Coord { x: 50.0, y: 4.99 }));

        let nearby = NearbyFeatureSet { points: vec![at], lines: vec![] };
        let config = MatchConfig::default();
        // The round trip through geodetic coordinates may land a hair either
        // side of 5m, so place the boundary point exactly in planar terms
        let exact = route.distance_to(route.to_planar(&nearby.points[0].coordinate));
        let intervals = build_intervals(&route, &nearby, exact, 20.0, &config);
        assert!(intervals.is_empty());

        let nearby = NearbyFeatureSet { points: vec![inside], lines: vec![] };
        assert_eq!(build_intervals(&route, &nearby, 5.0, 20.0, &config).len(), 1);
    }

    #[test]
    fn test_line_feature_interval_has_no_elongation() {
        let route = planar_route(&[(0.0, 0.0), (100.0, 0.0)]);
        let line = LineFeature::new(
            "veloroute",
            vec![
                route.to_geodetic(Coord { x: 60.0, y: 1.0 }),
                route.to_geodetic(Coord { x: 20.0, y: 1.0 }),
            ],
        );
        let nearby = NearbyFeatureSet { points: vec![], lines: vec![line] };

        let intervals = build_intervals(&route, &nearby, 5.0, 20.0, &MatchConfig::default());
        assert_eq!(intervals.len(), 1);
        // Ends are ordered even though the line runs against the route
        assert!((intervals[0].start - 20.0).abs() < 1e-3);
        assert!((intervals[0].end - 60.0).abs() < 1e-3);
    }
}
