//! Annotating turn instructions with landmarks.
//!
//! Run with: RUST_LOG=info cargo run --example landmark_directions

use std::collections::BTreeMap;

use poi_matcher::{
    match_landmarks, CancelToken, GpsPoint, Landmark, LandmarkClassifier, LandmarkConfig,
    LandmarkMatchRequest, LandmarkStore, TagTranslations,
};

fn tags(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn main() {
    env_logger::init();

    let translations = match TagTranslations::from_json(
        r#"{
            "tag:amenity": {"message": "Annehmlichkeit"},
            "tag:amenity=place_of_worship": {"message": "Kirche"},
            "tag:amenity=bench": {"message": "Sitzbank"},
            "tag:shop": {"message": "Geschäft"},
            "tag:shop=bakery": {"message": "Bäckerei"}
        }"#,
    ) {
        Ok(translations) => translations,
        Err(e) => {
            println!("Invalid translation table: {}", e);
            return;
        }
    };

    // Import raw nodes the way a landmark loader would
    let mut classifier = LandmarkClassifier::new(translations);
    let nodes = vec![
        ("node/1", GpsPoint::new(51.05200, 13.73745), tags(&[("amenity", "place_of_worship"), ("name", "Martin-Luther-Kirche")])),
        ("node/2", GpsPoint::new(51.05195, 13.73725), tags(&[("amenity", "bench")])),
        ("node/3", GpsPoint::new(51.05210, 13.74005), tags(&[("shop", "bakery")])),
        ("node/4", GpsPoint::new(51.05205, 13.74020), tags(&[("railway", "level_crossing")])),
    ];
    let landmarks: Vec<Landmark> = nodes
        .into_iter()
        .filter_map(|(id, coordinate, tags)| classifier.classify(id, coordinate, tags))
        .collect();
    println!(
        "Imported {} landmarks ({:.0}% of tags untranslated)\n",
        landmarks.len(),
        classifier.untranslated_percentage()
    );
    let store = LandmarkStore::new(landmarks);

    let body = r#"{
        "route": {"coordinates": [
            [13.7373, 51.0500], [13.7373, 51.0520], [13.7400, 51.0520], [13.7400, 51.0540]
        ]},
        "instructions": [
            {"interval": [0, 1], "text": "Continue onto Hauptstraße", "sign": 0},
            {"interval": [1, 2], "text": "Turn right onto Kirchgasse", "sign": 2},
            {"interval": [2, 3], "text": "Turn left onto Bäckerweg", "sign": -2},
            {"interval": [3, 3], "text": "Arrive at destination", "sign": 4}
        ],
        "mode": "standard"
    }"#;

    let request = match LandmarkMatchRequest::from_json(body) {
        Ok(request) => request,
        Err(e) => {
            println!("{}", e.to_json_body());
            return;
        }
    };

    let config = LandmarkConfig::default();
    match match_landmarks(&store, &request, &config, &CancelToken::new()) {
        Ok(response) => {
            for instruction in &response.instructions {
                println!("{}", instruction.text);
            }
        }
        Err(e) => println!("Matching failed: {}", e),
    }
}
