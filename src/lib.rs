//! # POI Matcher
//!
//! Matches categorized geographic features against a planned bike route.
//!
//! This library provides:
//! - Route feature matching: point and line features (construction sites,
//!   accident hotspots, green-wave corridors, velo routes) are projected onto
//!   the route and returned as the route sub-segments they affect
//! - Landmark matching: turn-by-turn instructions are annotated with the
//!   closest landmark and the side of the road it lies on
//! - Typed validation of the JSON request bodies and serialization of the
//!   responses
//!
//! ## Features
//!
//! - **`parallel`** - Match independent feature categories on the rayon pool
//!
//! ## Quick Start
//!
//! ```rust
//! use poi_matcher::{
//!     CancelToken, FeatureMatchRequest, FeatureStore, GpsPoint, MatchConfig, PointFeature,
//!     match_features,
//! };
//!
//! // A route heading north through Dresden
//! let route: Vec<GpsPoint> = (0..5)
//!     .map(|i| GpsPoint::new(51.0500 + i as f64 * 0.001, 13.7373))
//!     .collect();
//!
//! // A construction site right next to the third vertex
//! let store = FeatureStore::new(
//!     vec![PointFeature::new("construction", GpsPoint::new(51.0520, 13.73731))],
//!     vec![],
//! );
//!
//! let request = FeatureMatchRequest::new(route);
//! let response = match_features(&store, &request, &MatchConfig::default(), &CancelToken::new())
//!     .unwrap();
//!
//! assert_eq!(response.segments("construction").len(), 1);
//! assert!(response.segments("greenwave").is_empty());
//! ```

use serde::{Deserialize, Serialize};

pub mod direction;
pub mod error;
pub mod features;
pub mod geo_utils;
pub mod intervals;
pub mod landmarks;
pub mod matching;
pub mod projection;
pub mod request;
pub mod route;
pub mod segments;

pub use direction::{classify_side, Side};
pub use error::{LookupError, MatchError, Result, ValidationError};
pub use features::{
    category, FeatureStore, LineFeature, NearbyFeatureSet, NearbyFeatures, PointFeature,
};
pub use intervals::{merge_intervals, Interval};
pub use landmarks::{
    select_landmark, Landmark, LandmarkClassifier, LandmarkConfig, LandmarkMatch, LandmarkStore,
    NearbyLandmarks, TagTranslations,
};
pub use matching::{
    match_decision_point, match_features, match_landmarks, segments_for_features, CancelToken,
};
pub use projection::LocalProjection;
pub use request::{
    FeatureMatchRequest, FeatureMatchResponse, Instruction, LandmarkAnnotation,
    LandmarkMatchRequest, LandmarkMatchResponse, LandmarkMode,
};
pub use route::PlanarRoute;
pub use segments::{reconstruct_segments, MatchedSegment};

// ============================================================================
// Core Types
// ============================================================================

/// A GPS coordinate with latitude and longitude.
///
/// # Example
/// ```
/// use poi_matcher::GpsPoint;
/// let point = GpsPoint::new(53.5511, 9.9937); // Hamburg
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GpsPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GpsPoint {
    /// Create a new GPS point.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// Check if the point has valid coordinates.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.latitude >= -90.0
            && self.latitude <= 90.0
            && self.longitude >= -180.0
            && self.longitude <= 180.0
    }

    /// The point as `[lon, lat]`, the order used on the wire.
    pub fn to_lon_lat(&self) -> [f64; 2] {
        [self.longitude, self.latitude]
    }
}

/// Bounding box for a route or feature.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl Bounds {
    /// Create bounds from GPS points.
    pub fn from_points(points: &[GpsPoint]) -> Option<Self> {
        if points.is_empty() {
            return None;
        }
        Some(geo_utils::compute_bounds(points))
    }

    /// Get the center point of the bounds.
    pub fn center(&self) -> GpsPoint {
        GpsPoint::new(
            (self.min_lat + self.max_lat) / 2.0,
            (self.min_lng + self.max_lng) / 2.0,
        )
    }

    /// Grow the bounds by `meters` on every side.
    ///
    /// Uses the conservative degree conversion of
    /// [`geo_utils::meters_to_degrees`], so the result may be slightly larger
    /// than requested but never smaller.
    pub fn expand(&self, meters: f64) -> Self {
        let buffer = geo_utils::meters_to_degrees(meters, self.center().latitude);
        Self {
            min_lat: self.min_lat - buffer,
            max_lat: self.max_lat + buffer,
            min_lng: self.min_lng - buffer,
            max_lng: self.max_lng + buffer,
        }
    }
}

/// Configuration for route feature matching.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchConfig {
    /// Buffer around the route in which features are considered, when the
    /// request does not specify one.
    /// Default: 5 meters
    pub default_threshold_meters: u32,

    /// Padding added on both sides of a point feature's projected position,
    /// when the request does not specify one.
    /// Default: 20 meters
    pub default_elongation_meters: u32,

    /// Categories matched when the request does not name any.
    /// Default: construction, accidenthotspot, greenwave, veloroute
    pub default_categories: Vec<String>,

    /// Sample spacing used when clipping line features to the route buffer.
    /// Never coarser than half the threshold. Default: 1.0 meter
    pub clip_step_meters: f64,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            default_threshold_meters: 5,
            default_elongation_meters: 20,
            default_categories: category::DEFAULT.iter().map(|c| c.to_string()).collect(),
            clip_step_meters: 1.0,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
