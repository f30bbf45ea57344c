//! Request-level orchestration.
//!
//! ## Feature matching
//! Per requested category: range query -> interval builder -> merger ->
//! segment reconstructor -> geodetic segments. Categories are independent
//! and run on the rayon pool when the `parallel` feature is enabled.
//!
//! ## Landmark matching
//! Per instruction except the last (the destination): range query around
//! the decision point -> landmark selection -> left/right classification ->
//! annotated instruction text.
//!
//! A [`CancelToken`] is checked before each category and each decision
//! point. A lookup failure anywhere fails the whole request.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use log::{debug, info};

use crate::direction::classify_side;
use crate::error::{MatchError, Result, ValidationError};
use crate::features::{NearbyFeatureSet, NearbyFeatures};
use crate::intervals::{build_intervals, merge_intervals};
use crate::landmarks::{select_landmark, LandmarkConfig, LandmarkMatch, NearbyLandmarks};
use crate::request::{
    is_valid_category, FeatureMatchRequest, FeatureMatchResponse, LandmarkAnnotation,
    LandmarkMatchRequest, LandmarkMatchResponse,
};
use crate::route::{planar_distance, PlanarRoute};
use crate::segments::{reconstruct_segments, MatchedSegment};
use crate::{GpsPoint, MatchConfig};

/// Shared cancellation flag for an in-flight request.
///
/// Clones share the flag, so a handle kept by the caller can cancel work
/// running elsewhere.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    /// `Err(MatchError::Cancelled)` once cancelled.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(MatchError::Cancelled)
        } else {
            Ok(())
        }
    }
}

fn planar_route(points: &[GpsPoint]) -> Result<PlanarRoute> {
    if points.len() < 2 {
        return Err(ValidationError::TooFewRoutePoints(points.len()).into());
    }
    if let Some(index) = points.iter().position(|p| !p.is_valid()) {
        return Err(ValidationError::InvalidRoutePoint { index }.into());
    }
    PlanarRoute::from_points(points)
        .ok_or_else(|| ValidationError::TooFewRoutePoints(points.len()).into())
}

// ============================================================================
// Feature matching
// ============================================================================

/// Matched segments for one category's nearby features.
pub fn segments_for_features(
    route: &PlanarRoute,
    nearby: &NearbyFeatureSet,
    threshold: f64,
    elongation: f64,
    config: &MatchConfig,
) -> Vec<MatchedSegment> {
    if nearby.is_empty() {
        return vec![];
    }
    let intervals = build_intervals(route, nearby, threshold, elongation, config);
    let merged = merge_intervals(intervals);
    reconstruct_segments(route, &merged)
        .into_iter()
        .map(|coords| {
            MatchedSegment::new(coords.into_iter().map(|c| route.to_geodetic(c)).collect())
        })
        .collect()
}

/// Match every requested category against the route.
///
/// Every requested category appears in the response, with an empty list
/// when nothing matched.
pub fn match_features<S: NearbyFeatures + ?Sized>(
    store: &S,
    request: &FeatureMatchRequest,
    config: &MatchConfig,
    cancel: &CancelToken,
) -> Result<FeatureMatchResponse> {
    let start = Instant::now();
    let route = planar_route(&request.route)?;
    if !request.categories.iter().all(|c| is_valid_category(c)) {
        return Err(ValidationError::InvalidCategories.into());
    }
    let threshold = f64::from(request.threshold_meters);
    let elongation = f64::from(request.elongation_meters);

    let match_category = |category: &String| -> Result<(String, Vec<MatchedSegment>)> {
        cancel.check()?;
        let nearby = store.nearby_features(category, &request.route, threshold)?;
        let segments = segments_for_features(&route, &nearby, threshold, elongation, config);
        debug!(
            "Category {}: {} points, {} lines -> {} segments",
            category,
            nearby.points.len(),
            nearby.lines.len(),
            segments.len()
        );
        Ok((category.clone(), segments))
    };

    #[cfg(feature = "parallel")]
    let segments: BTreeMap<String, Vec<MatchedSegment>> = {
        use rayon::prelude::*;
        request
            .categories
            .par_iter()
            .map(match_category)
            .collect::<Result<_>>()?
    };

    #[cfg(not(feature = "parallel"))]
    let segments: BTreeMap<String, Vec<MatchedSegment>> = request
        .categories
        .iter()
        .map(match_category)
        .collect::<Result<_>>()?;

    info!(
        "Matched {} categories on a {:.0}m route ({} segments) in {:?}",
        segments.len(),
        route.length(),
        segments.values().map(Vec::len).sum::<usize>(),
        start.elapsed()
    );

    Ok(FeatureMatchResponse::new(segments))
}

// ============================================================================
// Landmark matching
// ============================================================================

/// Select and orient a landmark for the decision point at route vertex
/// `vertex`.
///
/// Distances are measured in the route's planar frame; landmarks at or
/// beyond `threshold` meters are ignored.
pub fn match_decision_point<S: NearbyLandmarks + ?Sized>(
    store: &S,
    route_points: &[GpsPoint],
    planar: &PlanarRoute,
    vertex: usize,
    threshold: f64,
    config: &LandmarkConfig,
) -> Result<Option<LandmarkMatch>> {
    let (Some(point), Some(origin)) = (route_points.get(vertex), planar.vertex(vertex)) else {
        return Ok(None);
    };

    let candidates = store
        .nearby_landmarks(point, threshold)?
        .into_iter()
        .map(|landmark| {
            let distance = planar_distance(origin, planar.to_planar(&landmark.coordinate));
            (landmark, distance)
        })
        .collect();

    let Some((landmark, distance_meters)) = select_landmark(candidates, threshold, config) else {
        return Ok(None);
    };
    let Some(side) = classify_side(route_points, vertex, &landmark.coordinate) else {
        return Ok(None);
    };

    Ok(Some(LandmarkMatch {
        landmark,
        distance_meters,
        side,
    }))
}

/// Annotate the request's instructions with landmarks.
///
/// Matched instructions get `" at <label> on the <side>"` appended to their
/// text and a `landmark` field. The last instruction is never annotated.
pub fn match_landmarks<S: NearbyLandmarks + ?Sized>(
    store: &S,
    request: &LandmarkMatchRequest,
    config: &LandmarkConfig,
    cancel: &CancelToken,
) -> Result<LandmarkMatchResponse> {
    let start = Instant::now();
    let planar = planar_route(&request.route)?;
    let threshold = f64::from(request.threshold(config));

    let mut instructions = request.instructions.clone();
    let decision_points = instructions.len().saturating_sub(1);
    let mut matched = 0;

    for instruction in instructions.iter_mut().take(decision_points) {
        cancel.check()?;
        let vertex = instruction.decision_point();
        let Some(found) =
            match_decision_point(store, &request.route, &planar, vertex, threshold, config)?
        else {
            debug!("No landmark for decision point {}", vertex);
            continue;
        };

        instruction.text = format!(
            "{} at {} on the {}",
            instruction.text,
            found.landmark.label(),
            found.side
        );
        instruction.landmark = Some(LandmarkAnnotation::from(&found));
        matched += 1;
    }

    info!(
        "Annotated {}/{} decision points ({} mode, {:.0}m) in {:?}",
        matched,
        decision_points,
        request.mode,
        threshold,
        start.elapsed()
    );

    Ok(LandmarkMatchResponse::new(instructions))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::direction::Side;
    use crate::error::LookupError;
    use crate::features::{FeatureStore, LineFeature, PointFeature};
    use crate::geo_utils::haversine_distance;
    use crate::landmarks::tests::landmark;
    use crate::landmarks::{Landmark, LandmarkStore};
    use crate::request::{Instruction, LandmarkMode};
    use crate::route::tests::planar_route as planar_test_route;
    use geo::Coord;

    struct FailingStore;

    impl NearbyFeatures for FailingStore {
        fn nearby_features(
            &self,
            _category: &str,
            _route: &[GpsPoint],
            _threshold_meters: f64,
        ) -> std::result::Result<NearbyFeatureSet, LookupError> {
            Err(LookupError("database unavailable".to_string()))
        }
    }

    impl NearbyLandmarks for FailingStore {
        fn nearby_landmarks(
            &self,
            _point: &GpsPoint,
            _threshold_meters: f64,
        ) -> std::result::Result<Vec<Landmark>, LookupError> {
            Err(LookupError("database unavailable".to_string()))
        }
    }

    fn request(route: Vec<GpsPoint>, categories: &[&str]) -> FeatureMatchRequest {
        FeatureMatchRequest {
            categories: categories.iter().map(|c| c.to_string()).collect(),
            ..FeatureMatchRequest::new(route)
        }
    }

    #[test]
    fn test_point_feature_segment() {
        // 100m straight edge, construction site 2m off at 50m
        let planar = planar_test_route(&[(0.0, 0.0), (100.0, 0.0)]);
        let route: Vec<GpsPoint> = planar.vertices().iter().map(|c| planar.to_geodetic(*c)).collect();
        let site = planar.to_geodetic(Coord { x: 50.0, y: 2.0 });
        let store = FeatureStore::new(vec![PointFeature::new("construction", site)], vec![]);

        let response = match_features(
            &store,
            &request(route, &["construction"]),
            &MatchConfig::default(),
            &CancelToken::new(),
        )
        .unwrap();

        let segments = response.segments("construction");
        assert_eq!(segments.len(), 1);
        let segment = &segments[0];
        assert_eq!(segment.points.len(), 2);
        let start = planar.to_geodetic(Coord { x: 30.0, y: 0.0 });
        let end = planar.to_geodetic(Coord { x: 70.0, y: 0.0 });
        assert!(haversine_distance(segment.first().unwrap(), &start) < 0.01);
        assert!(haversine_distance(segment.last().unwrap(), &end) < 0.01);
    }

    #[test]
    fn test_line_feature_segment() {
        let planar = planar_test_route(&[(0.0, 0.0), (100.0, 0.0), (200.0, 0.0)]);
        let route: Vec<GpsPoint> = planar.vertices().iter().map(|c| planar.to_geodetic(*c)).collect();
        let line = LineFeature::new(
            "veloroute",
            vec![
                planar.to_geodetic(Coord { x: 80.0, y: 1.0 }),
                planar.to_geodetic(Coord { x: 150.0, y: 1.0 }),
            ],
        );
        let store = FeatureStore::new(vec![], vec![line]);

        let response = match_features(
            &store,
            &request(route, &["veloroute"]),
            &MatchConfig::default(),
            &CancelToken::new(),
        )
        .unwrap();

        let segments = response.segments("veloroute");
        assert_eq!(segments.len(), 1);
        // 80 -> vertex at 100 -> 150
        assert_eq!(segments[0].points.len(), 3);
    }

    #[test]
    fn test_empty_candidates_still_succeed() {
        let route = vec![GpsPoint::new(51.05, 13.73), GpsPoint::new(51.06, 13.73)];
        let store = FeatureStore::new(vec![], vec![]);
        let response = match_features(
            &store,
            &FeatureMatchRequest::new(route.clone()),
            &MatchConfig::default(),
            &CancelToken::new(),
        )
        .unwrap();

        assert!(response.success);
        assert_eq!(response.segments.len(), 4);
        assert!(response.segments.values().all(Vec::is_empty));

        let response = match_features(
            &store,
            &request(route, &[]),
            &MatchConfig::default(),
            &CancelToken::new(),
        )
        .unwrap();
        assert_eq!(response.to_json().unwrap(), serde_json::json!({"success": true}));
    }

    #[test]
    fn test_reserved_category_is_rejected() {
        let route = vec![GpsPoint::new(51.05, 13.73), GpsPoint::new(51.06, 13.73)];
        let result = match_features(
            &FeatureStore::new(vec![], vec![]),
            &request(route, &["construction", "success"]),
            &MatchConfig::default(),
            &CancelToken::new(),
        );
        assert_eq!(
            result,
            Err(MatchError::Validation(ValidationError::InvalidCategories))
        );
    }

    #[test]
    fn test_categories_are_matched_independently() {
        // Runs on the rayon pool with `--features parallel`
        let planar = planar_test_route(&[(0.0, 0.0), (100.0, 0.0), (200.0, 0.0)]);
        let route: Vec<GpsPoint> = planar.vertices().iter().map(|c| planar.to_geodetic(*c)).collect();
        let near = |x: f64| planar.to_geodetic(Coord { x, y: 1.0 });
        let store = FeatureStore::new(
            vec![
                PointFeature::new("construction", near(30.0)),
                PointFeature::new("construction", near(150.0)),
                PointFeature::new("accidenthotspot", near(100.0)),
                PointFeature::new("greenwave", near(40.0)),
                PointFeature::new("greenwave", near(50.0)),
            ],
            vec![],
        );
        let categories: Vec<String> = (0..16).map(|i| format!("unused{}", i)).collect();
        let mut all: Vec<&str> = vec!["construction", "accidenthotspot", "greenwave", "veloroute"];
        all.extend(categories.iter().map(String::as_str));

        let response = match_features(
            &store,
            &request(route, &all),
            &MatchConfig::default(),
            &CancelToken::new(),
        )
        .unwrap();

        assert_eq!(response.segments.len(), 20);
        assert_eq!(response.segments("construction").len(), 2);
        assert_eq!(response.segments("accidenthotspot").len(), 1);
        // Overlapping intervals [20, 60] and [30, 70] merge
        assert_eq!(response.segments("greenwave").len(), 1);
        assert!(response.segments("veloroute").is_empty());
        assert!(response.segments("unused7").is_empty());
    }

    #[test]
    fn test_lookup_failure_fails_request() {
        let route = vec![GpsPoint::new(51.05, 13.73), GpsPoint::new(51.06, 13.73)];
        let result = match_features(
            &FailingStore,
            &FeatureMatchRequest::new(route),
            &MatchConfig::default(),
            &CancelToken::new(),
        );
        assert!(matches!(result, Err(MatchError::Lookup(_))));
    }

    #[test]
    fn test_cancelled_request() {
        let route = vec![GpsPoint::new(51.05, 13.73), GpsPoint::new(51.06, 13.73)];
        let cancel = CancelToken::new();
        let handle = cancel.clone();
        handle.cancel();

        let result = match_features(
            &FeatureStore::new(vec![], vec![]),
            &FeatureMatchRequest::new(route),
            &MatchConfig::default(),
            &cancel,
        );
        assert_eq!(result, Err(MatchError::Cancelled));
    }

    #[test]
    fn test_invalid_route_is_rejected() {
        let route = vec![GpsPoint::new(51.05, 13.73), GpsPoint::new(95.0, 13.73)];
        let result = match_features(
            &FeatureStore::new(vec![], vec![]),
            &FeatureMatchRequest::new(route),
            &MatchConfig::default(),
            &CancelToken::new(),
        );
        assert_eq!(
            result,
            Err(MatchError::Validation(ValidationError::InvalidRoutePoint { index: 1 }))
        );
    }

    // ------------------------------------------------------------------------
    // Landmarks
    // ------------------------------------------------------------------------

    /// North for ~111m, then east.
    fn turn_route() -> Vec<GpsPoint> {
        vec![
            GpsPoint::new(51.050, 13.730),
            GpsPoint::new(51.051, 13.730),
            GpsPoint::new(51.051, 13.732),
        ]
    }

    fn turn_instructions() -> Vec<Instruction> {
        vec![
            Instruction::new([0, 1], "Continue", 0),
            Instruction::new([1, 2], "Turn right", 2),
            Instruction::new([2, 2], "Arrive", 4),
        ]
    }

    #[test]
    fn test_landmark_annotation() {
        // ~10m east of the turn
        let mut church = landmark("n1", "Kirche", GpsPoint::new(51.051, 13.73014));
        church.name = "Kreuzkirche".to_string();
        let store = LandmarkStore::new(vec![church]);

        let response = match_landmarks(
            &store,
            &LandmarkMatchRequest::new(turn_route(), turn_instructions()),
            &LandmarkConfig::default(),
            &CancelToken::new(),
        )
        .unwrap();

        assert_eq!(response.matched_count(), 1);
        let turn = &response.instructions[1];
        assert_eq!(turn.text, "Turn right at Kreuzkirche on the right");
        let annotation = turn.landmark.as_ref().unwrap();
        assert_eq!(annotation.id, "n1");
        assert_eq!(annotation.side, Side::Right);
        assert!((annotation.distance_meters - 10.0).abs() < 0.5);
        assert_eq!(response.instructions[0].text, "Continue");
    }

    #[test]
    fn test_last_instruction_is_never_annotated() {
        let kiosk = landmark("n2", "Kiosk", GpsPoint::new(51.0511, 13.732));
        let store = LandmarkStore::new(vec![kiosk]);

        let response = match_landmarks(
            &store,
            &LandmarkMatchRequest::new(turn_route(), turn_instructions()),
            &LandmarkConfig::default(),
            &CancelToken::new(),
        )
        .unwrap();

        assert_eq!(response.matched_count(), 0);
        assert_eq!(response.instructions[2].text, "Arrive");
    }

    #[test]
    fn test_extended_mode_widens_search() {
        // ~40m west of the turn
        let store = LandmarkStore::new(vec![landmark("n3", "Kirche", GpsPoint::new(51.051, 13.72943))]);
        let mut request = LandmarkMatchRequest::new(turn_route(), turn_instructions());
        let config = LandmarkConfig::default();

        let response = match_landmarks(&store, &request, &config, &CancelToken::new()).unwrap();
        assert_eq!(response.matched_count(), 0);

        request.mode = LandmarkMode::Extended;
        let response = match_landmarks(&store, &request, &config, &CancelToken::new()).unwrap();
        assert_eq!(response.matched_count(), 1);
        assert_eq!(response.instructions[1].text, "Turn right at Kirche on the left");
    }

    #[test]
    fn test_landmark_threshold_is_exclusive() {
        let route = turn_route();
        let planar = PlanarRoute::from_points(&route).unwrap();
        let church = landmark("n4", "Kirche", GpsPoint::new(51.051, 13.73014));
        let exact = planar_distance(planar.vertex(1).unwrap(), planar.to_planar(&church.coordinate));
        let store = LandmarkStore::new(vec![church]);
        let config = LandmarkConfig::default();

        let at = match_decision_point(&store, &route, &planar, 1, exact, &config).unwrap();
        assert!(at.is_none());
        let inside = match_decision_point(&store, &route, &planar, 1, exact + 0.01, &config).unwrap();
        assert!(inside.is_some());
    }

    #[test]
    fn test_landmark_lookup_failure() {
        let result = match_landmarks(
            &FailingStore,
            &LandmarkMatchRequest::new(turn_route(), turn_instructions()),
            &LandmarkConfig::default(),
            &CancelToken::new(),
        );
        assert!(matches!(result, Err(MatchError::Lookup(_))));
    }
}
