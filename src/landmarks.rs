//! Landmarks and the selection of one landmark per decision point.
//!
//! ## Selection
//! Candidates within the threshold are ordered by `(distance, id)` and
//! scanned while tracking the closest accepted one:
//! - a normal landmark is accepted when strictly closer than the current best
//! - a low-priority landmark (bench, waste basket, ...) additionally needs to
//!   be within half the threshold, and is never accepted once a normal
//!   landmark has been
//!
//! Distances equal to the threshold are excluded.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use log::debug;
use rstar::primitives::GeomWithData;
use rstar::{RTree, AABB};
use serde::{Deserialize, Serialize};

use crate::direction::Side;
use crate::error::LookupError;
use crate::geo_utils::haversine_distance;
use crate::{Bounds, GpsPoint};

/// Type used when no tag identifies what a landmark is.
pub const DEFAULT_LANDMARK_TYPE: &str = "Landmarke";

/// A named, categorized place that helps riders recognize a turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub id: String,
    pub name: String,
    pub coordinate: GpsPoint,
    /// Broad group, e.g. "Annehmlichkeit" for OSM `amenity`
    pub category: String,
    /// Display label, e.g. "Kirche"
    #[serde(rename = "type")]
    pub kind: String,
    /// Raw key/value attributes
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

impl Landmark {
    /// Text used in instructions: the name when present, otherwise the type.
    pub fn label(&self) -> &str {
        if self.name.trim().is_empty() {
            &self.kind
        } else {
            &self.name
        }
    }

    pub fn is_low_priority(&self, config: &LandmarkConfig) -> bool {
        config.low_priority_types.iter().any(|t| t == &self.kind)
    }

    /// Build a landmark from OSM-style tags.
    ///
    /// Shorthand for a one-off [`LandmarkClassifier::classify`]; use the
    /// classifier directly when importing many nodes to keep track of
    /// untranslated tags.
    pub fn from_tags(
        id: &str,
        coordinate: GpsPoint,
        tags: BTreeMap<String, String>,
        translations: &TagTranslations,
    ) -> Option<Self> {
        LandmarkClassifier::new(translations.clone()).classify(id, coordinate, tags)
    }
}

/// Configuration for landmark matching.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LandmarkConfig {
    /// Search radius around a decision point in standard mode.
    /// Default: 30 meters
    pub standard_threshold_meters: u32,

    /// Search radius in extended mode, for sparse areas.
    /// Default: 50 meters
    pub extended_threshold_meters: u32,

    /// Landmark types that only qualify within half the radius and when no
    /// better candidate exists.
    pub low_priority_types: Vec<String>,
}

impl Default for LandmarkConfig {
    fn default() -> Self {
        Self {
            standard_threshold_meters: 30,
            extended_threshold_meters: 50,
            low_priority_types: [
                "Sitzbank",
                "Abfalleimer",
                "Briefkasten",
                "Fahrradparkplatz",
                "Parkplatz",
                "Verkaufsautomat",
                "Hydrant",
                "Straßenlaterne",
            ]
            .iter()
            .map(|t| t.to_string())
            .collect(),
        }
    }
}

/// A landmark chosen for a decision point.
#[derive(Debug, Clone, PartialEq)]
pub struct LandmarkMatch {
    pub landmark: Landmark,
    pub distance_meters: f64,
    pub side: Side,
}

/// Spatial range query over a landmark store.
///
/// Implementations return the landmarks within `threshold_meters` of
/// `point`. Selection re-checks the distance in the route's planar frame, so
/// a slightly generous radius is fine.
pub trait NearbyLandmarks: Send + Sync {
    fn nearby_landmarks(
        &self,
        point: &GpsPoint,
        threshold_meters: f64,
    ) -> Result<Vec<Landmark>, LookupError>;
}

/// Pick the landmark for one decision point.
///
/// `candidates` pairs each landmark with its distance to the decision
/// point. Returns the selected landmark and its distance.
pub fn select_landmark(
    mut candidates: Vec<(Landmark, f64)>,
    threshold: f64,
    config: &LandmarkConfig,
) -> Option<(Landmark, f64)> {
    candidates.retain(|(_, d)| *d < threshold);
    candidates.sort_by(|(la, da), (lb, db)| da.total_cmp(db).then_with(|| la.id.cmp(&lb.id)));

    let mut best: Option<(Landmark, f64)> = None;
    let mut normal_accepted = false;

    for (landmark, distance) in candidates {
        let closer = best.as_ref().map_or(true, |(_, d)| distance < *d);
        if !closer {
            continue;
        }
        if landmark.is_low_priority(config) {
            if normal_accepted || distance > threshold / 2.0 {
                continue;
            }
        } else {
            normal_accepted = true;
        }
        best = Some((landmark, distance));
    }

    if let Some((landmark, distance)) = &best {
        debug!("Selected landmark {} ({}) at {:.1}m", landmark.id, landmark.kind, distance);
    }
    best
}

type IndexedLandmark = GeomWithData<[f64; 2], usize>;

/// In-memory landmark store with an R-tree index over `[lng, lat]`.
#[derive(Debug, Clone)]
pub struct LandmarkStore {
    landmarks: Vec<Landmark>,
    tree: RTree<IndexedLandmark>,
}

impl LandmarkStore {
    /// Index the given landmarks, skipping invalid coordinates.
    pub fn new(landmarks: Vec<Landmark>) -> Self {
        let landmarks: Vec<Landmark> = landmarks
            .into_iter()
            .filter(|l| l.coordinate.is_valid())
            .collect();
        let tree = RTree::bulk_load(
            landmarks
                .iter()
                .enumerate()
                .map(|(i, l)| GeomWithData::new(l.coordinate.to_lon_lat(), i))
                .collect(),
        );
        Self { landmarks, tree }
    }

    pub fn len(&self) -> usize {
        self.landmarks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.landmarks.is_empty()
    }
}

impl NearbyLandmarks for LandmarkStore {
    fn nearby_landmarks(
        &self,
        point: &GpsPoint,
        threshold_meters: f64,
    ) -> Result<Vec<Landmark>, LookupError> {
        let search = Bounds::from_points(std::slice::from_ref(point))
            .map(|b| b.expand(threshold_meters))
            .ok_or_else(|| LookupError("empty query point".to_string()))?;
        let envelope = AABB::from_corners(
            [search.min_lng, search.min_lat],
            [search.max_lng, search.max_lat],
        );

        Ok(self
            .tree
            .locate_in_envelope(&envelope)
            .map(|entry| &self.landmarks[entry.data])
            .filter(|l| haversine_distance(point, &l.coordinate) < threshold_meters)
            .cloned()
            .collect())
    }
}

// ============================================================================
// Landmarks from raw tags
// ============================================================================

/// OSM keys that identify what a node is, in order of preference.
const DEFAULT_KEYS: [&str; 18] = [
    "amenity",
    "historic",
    "tourism",
    "leisure",
    "shop",
    "public_transport",
    "man_made",
    "railway",
    "sport",
    "aerialway",
    "aeroway",
    "barrier",
    "craft",
    "emergency",
    "healthcare",
    "landuse",
    "military",
    "power",
];

/// Types that are never useful as landmarks: riders often follow railway
/// lines, so crossings are everywhere.
const DEFAULT_DISCARDED_TYPES: [&str; 3] = ["Bahnübergang", "Eisenbahnübergang", "Gleisweiche"];

#[derive(Debug, Deserialize)]
struct TranslationEntry {
    #[serde(default)]
    message: String,
}

/// Translation table and key precedence for turning tags into landmarks.
///
/// The table maps `tag:<key>` and `tag:<key>=<value>` to display text, as in
/// the openstreetmap-tag-translations project.
#[derive(Debug, Clone)]
pub struct TagTranslations {
    pub keys: Vec<String>,
    pub messages: HashMap<String, String>,
    pub discarded_types: Vec<String>,
}

impl Default for TagTranslations {
    fn default() -> Self {
        Self {
            keys: DEFAULT_KEYS.iter().map(|k| k.to_string()).collect(),
            messages: HashMap::new(),
            discarded_types: DEFAULT_DISCARDED_TYPES.iter().map(|t| t.to_string()).collect(),
        }
    }
}

impl TagTranslations {
    /// Load a translation table of the form
    /// `{"tag:amenity=cinema": {"message": "Kino"}, ...}`.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let entries: HashMap<String, TranslationEntry> = serde_json::from_str(json)?;
        let messages = entries
            .into_iter()
            .filter(|(_, entry)| !entry.message.is_empty())
            .map(|(key, entry)| (key, entry.message))
            .collect();
        Ok(Self {
            messages,
            ..Self::default()
        })
    }
}

/// Builds landmarks from tags and records which tags had no translation.
#[derive(Debug, Clone, Default)]
pub struct LandmarkClassifier {
    translations: TagTranslations,
    known_tags: BTreeSet<String>,
    unknown_tags: BTreeSet<String>,
}

impl LandmarkClassifier {
    pub fn new(translations: TagTranslations) -> Self {
        Self {
            translations,
            known_tags: BTreeSet::new(),
            unknown_tags: BTreeSet::new(),
        }
    }

    /// Translate `key` (when `value` is empty) or `key=value`, falling back
    /// to the raw text.
    pub fn translate(&mut self, key: &str, value: &str) -> String {
        let (lookup, fallback) = if value.is_empty() {
            (format!("tag:{}", key), key)
        } else {
            (format!("tag:{}={}", key, value), value)
        };
        match self.translations.messages.get(&lookup) {
            Some(message) => {
                self.known_tags.insert(lookup);
                message.clone()
            }
            None => {
                let text = fallback.to_string();
                self.unknown_tags.insert(lookup);
                text
            }
        }
    }

    /// Build a landmark from a tagged node.
    ///
    /// The first preferred key present decides category and type; nodes
    /// without any fall back to [`DEFAULT_LANDMARK_TYPE`]. Returns `None`
    /// for invalid coordinates and discarded types.
    pub fn classify(
        &mut self,
        id: &str,
        coordinate: GpsPoint,
        tags: BTreeMap<String, String>,
    ) -> Option<Landmark> {
        if !coordinate.is_valid() {
            return None;
        }

        let matched = self
            .translations
            .keys
            .iter()
            .find_map(|key| tags.get(key).map(|value| (key.clone(), value.clone())));

        let (category, kind) = match matched {
            Some((key, value)) => {
                let kind = self.translate(&key, &value);
                let category = self.translate(&key, "");
                (category, kind)
            }
            None => {
                debug!("No category found for landmark {}, using default", id);
                (DEFAULT_LANDMARK_TYPE.to_string(), DEFAULT_LANDMARK_TYPE.to_string())
            }
        };

        if self.translations.discarded_types.contains(&kind) {
            return None;
        }

        Some(Landmark {
            id: id.to_string(),
            name: tags.get("name").cloned().unwrap_or_default(),
            coordinate,
            category,
            kind,
            tags,
        })
    }

    pub fn known_tags(&self) -> &BTreeSet<String> {
        &self.known_tags
    }

    pub fn unknown_tags(&self) -> &BTreeSet<String> {
        &self.unknown_tags
    }

    /// Share of looked-up tags without a translation, in percent.
    pub fn untranslated_percentage(&self) -> f64 {
        let total = self.known_tags.len() + self.unknown_tags.len();
        if total == 0 {
            return 0.0;
        }
        self.unknown_tags.len() as f64 / total as f64 * 100.0
    }
}
