//! Basic example of matching features against a route.
//!
//! Run with: RUST_LOG=debug cargo run --example basic_matching

use poi_matcher::{
    category, match_features, CancelToken, FeatureMatchRequest, FeatureStore, GpsPoint,
    LineFeature, MatchConfig, PointFeature,
};

fn main() {
    env_logger::init();

    // Request body as sent by the app (Dresden, heading north then east)
    let body = r#"{
        "route": [
            {"lon": 13.7373, "lat": 51.0500},
            {"lon": 13.7373, "lat": 51.0520},
            {"lon": 13.7400, "lat": 51.0520},
            {"lon": 13.7430, "lat": 51.0521}
        ],
        "threshold": 5,
        "elongation": 20
    }"#;

    let config = MatchConfig::default();
    let request = match FeatureMatchRequest::from_json(body, &config) {
        Ok(request) => request,
        Err(e) => {
            println!("{}", e.to_json_body());
            return;
        }
    };

    let store = FeatureStore::new(
        vec![
            // Right next to the route
            PointFeature::new(category::CONSTRUCTION, GpsPoint::new(51.0510, 13.73732)),
            // Two nearby accident hotspots whose intervals overlap
            PointFeature::new(category::ACCIDENT_HOTSPOT, GpsPoint::new(51.05200, 13.7390)),
            PointFeature::new(category::ACCIDENT_HOTSPOT, GpsPoint::new(51.05201, 13.7394)),
            // ~300m off the route
            PointFeature::new(category::CONSTRUCTION, GpsPoint::new(51.0510, 13.7420)),
        ],
        vec![LineFeature::new(
            category::VELOROUTE,
            vec![
                GpsPoint::new(51.0490, 13.73731),
                GpsPoint::new(51.0515, 13.73731),
                GpsPoint::new(51.0515, 13.7360),
            ],
        )],
    );

    println!("Feature Matching Example\n");
    println!(
        "Route: {} points, threshold={}m, elongation={}m\n",
        request.route.len(),
        request.threshold_meters,
        request.elongation_meters
    );

    let response = match match_features(&store, &request, &config, &CancelToken::new()) {
        Ok(response) => response,
        Err(e) => {
            println!("Matching failed: {}", e);
            return;
        }
    };

    for category in &request.categories {
        let segments = response.segments(category);
        println!("{}: {} segment(s)", category, segments.len());
        for segment in segments {
            println!("   {} points", segment.points.len());
        }
    }

    println!("\nResponse body:");
    match serde_json::to_string_pretty(&response) {
        Ok(json) => println!("{}", json),
        Err(e) => println!("Serialization failed: {}", e),
    }
}
