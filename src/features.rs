//! Categorized point and line features, and the range query that supplies them.
//!
//! Matching never owns feature storage. It asks a [`NearbyFeatures`]
//! implementation for the features of one category near the route and works
//! on what comes back. [`FeatureStore`] is an in-memory implementation backed
//! by R-trees, used by the demos and tests and suitable for small datasets
//! loaded at startup.

use rstar::primitives::{GeomWithData, Rectangle};
use rstar::{RTree, AABB};
use serde::{Deserialize, Serialize};

use crate::error::LookupError;
use crate::route::PlanarRoute;
use crate::{Bounds, GpsPoint};

/// Well-known feature categories.
pub mod category {
    pub const CONSTRUCTION: &str = "construction";
    pub const ACCIDENT_HOTSPOT: &str = "accidenthotspot";
    pub const GREEN_WAVE: &str = "greenwave";
    pub const VELOROUTE: &str = "veloroute";

    /// Categories matched when a request does not name any.
    pub const DEFAULT: [&str; 4] = [CONSTRUCTION, ACCIDENT_HOTSPOT, GREEN_WAVE, VELOROUTE];
}

/// A point of interest, e.g. a construction site or a green-wave start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointFeature {
    pub category: String,
    pub coordinate: GpsPoint,
}

impl PointFeature {
    pub fn new(category: &str, coordinate: GpsPoint) -> Self {
        Self {
            category: category.to_string(),
            coordinate,
        }
    }
}

/// A line-shaped feature, e.g. a velo route or an accident-prone stretch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineFeature {
    pub category: String,
    pub points: Vec<GpsPoint>,
}

impl LineFeature {
    pub fn new(category: &str, points: Vec<GpsPoint>) -> Self {
        Self {
            category: category.to_string(),
            points,
        }
    }
}

/// Features of one category near a route.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NearbyFeatureSet {
    pub points: Vec<PointFeature>,
    pub lines: Vec<LineFeature>,
}

impl NearbyFeatureSet {
    pub fn is_empty(&self) -> bool {
        self.points.is_empty() && self.lines.is_empty()
    }
}

/// Spatial range query over a feature store.
///
/// Implementations return the point features of `category` closer than
/// `threshold_meters` to the route, and the line features that come that
/// close somewhere along their length. Returning a few extra candidates is
/// harmless: matching applies the exact threshold itself.
pub trait NearbyFeatures: Send + Sync {
    fn nearby_features(
        &self,
        category: &str,
        route: &[GpsPoint],
        threshold_meters: f64,
    ) -> Result<NearbyFeatureSet, LookupError>;
}

type IndexedPoint = GeomWithData<[f64; 2], usize>;
type IndexedLine = GeomWithData<Rectangle<[f64; 2]>, usize>;

/// In-memory feature store with R-tree indexes over `[lng, lat]`.
#[derive(Debug, Clone)]
pub struct FeatureStore {
    points: Vec<PointFeature>,
    lines: Vec<LineFeature>,
    point_tree: RTree<IndexedPoint>,
    line_tree: RTree<IndexedLine>,
}

impl FeatureStore {
    /// Index the given features. Invalid coordinates and lines with fewer
    /// than 2 points are skipped.
    pub fn new(points: Vec<PointFeature>, lines: Vec<LineFeature>) -> Self {
        let points: Vec<PointFeature> = points
            .into_iter()
            .filter(|p| p.coordinate.is_valid())
            .collect();
        let lines: Vec<LineFeature> = lines
            .into_iter()
            .filter(|l| l.points.len() >= 2 && l.points.iter().all(|p| p.is_valid()))
            .collect();

        let point_tree = RTree::bulk_load(
            points
                .iter()
                .enumerate()
                .map(|(i, p)| GeomWithData::new(p.coordinate.to_lon_lat(), i))
                .collect(),
        );
        let line_tree = RTree::bulk_load(
            lines
                .iter()
                .enumerate()
                .filter_map(|(i, l)| {
                    let b = Bounds::from_points(&l.points)?;
                    let rect = Rectangle::from_corners([b.min_lng, b.min_lat], [b.max_lng, b.max_lat]);
                    Some(GeomWithData::new(rect, i))
                })
                .collect(),
        );

        Self {
            points,
            lines,
            point_tree,
            line_tree,
        }
    }

    pub fn len(&self) -> usize {
        self.points.len() + self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl NearbyFeatures for FeatureStore {
    fn nearby_features(
        &self,
        category: &str,
        route: &[GpsPoint],
        threshold_meters: f64,
    ) -> Result<NearbyFeatureSet, LookupError> {
        let Some(planar) = PlanarRoute::from_points(route) else {
            return Ok(NearbyFeatureSet::default());
        };
        let Some(bounds) = Bounds::from_points(route) else {
            return Ok(NearbyFeatureSet::default());
        };
        let search = bounds.expand(threshold_meters);
        let envelope = AABB::from_corners(
            [search.min_lng, search.min_lat],
            [search.max_lng, search.max_lat],
        );

        let points = self
            .point_tree
            .locate_in_envelope(&envelope)
            .map(|entry| &self.points[entry.data])
            .filter(|p| p.category == category)
            .filter(|p| planar.distance_to(planar.to_planar(&p.coordinate)) < threshold_meters)
            .cloned()
            .collect();

        // Lines are only pre-filtered by envelope; matching clips them exactly
        let lines = self
            .line_tree
            .locate_in_envelope_intersecting(&envelope)
            .map(|entry| &self.lines[entry.data])
            .filter(|l| l.category == category)
            .cloned()
            .collect();

        Ok(NearbyFeatureSet { points, lines })
    }
}
