//! Typed request and response bodies.
//!
//! Bodies are first deserialized into private wire structs, then each field
//! is deserialized into its own type and range-checked, so every rejection
//! maps to one [`ValidationError`] variant. The engine only ever sees the
//! validated structs below.
//!
//! | Request | Route format | Optional fields |
//! |---------|--------------|-----------------|
//! | [`FeatureMatchRequest`] | `[{"lon": .., "lat": ..}, ...]` | `threshold`, `elongation`, `categories` |
//! | [`LandmarkMatchRequest`] | `{"coordinates": [[lon, lat], ...]}` | `threshold`, `mode` |

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use crate::direction::Side;
use crate::error::ValidationError;
use crate::landmarks::{LandmarkConfig, LandmarkMatch};
use crate::segments::MatchedSegment;
use crate::{GpsPoint, MatchConfig};

/// Response keys that cannot be used as category names.
const RESERVED_KEYS: [&str; 1] = ["success"];

// ============================================================================
// Wire schema
// ============================================================================

#[derive(Debug, Deserialize)]
struct FeatureMatchBody {
    #[serde(default)]
    route: Option<Value>,
    #[serde(default, alias = "thresholdMeters")]
    threshold: Option<Value>,
    #[serde(default, alias = "elongationMeters")]
    elongation: Option<Value>,
    #[serde(default)]
    categories: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct LonLat {
    lon: f64,
    lat: f64,
}

#[derive(Debug, Deserialize)]
struct LandmarkMatchBody {
    #[serde(default)]
    route: Option<Value>,
    #[serde(default)]
    instructions: Option<Value>,
    #[serde(default, alias = "thresholdMeters")]
    threshold: Option<Value>,
    #[serde(default)]
    mode: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct LineString {
    coordinates: Vec<Value>,
}

/// Deserialize one field of a body, reporting `error` when it has the wrong
/// shape.
fn typed<T: DeserializeOwned>(value: Value, error: ValidationError) -> Result<T, ValidationError> {
    serde_json::from_value(value).map_err(|_| error)
}

fn parse_body<T: DeserializeOwned>(value: Value) -> Result<T, ValidationError> {
    serde_json::from_value(value).map_err(|e| ValidationError::MalformedBody(e.to_string()))
}

fn parse_str(body: &str) -> Result<Value, ValidationError> {
    serde_json::from_str(body).map_err(|e| ValidationError::MalformedBody(e.to_string()))
}

/// Non-negative integer that fits a `u32`. Floats, strings and negative
/// numbers are rejected.
fn optional_u32(value: Option<Value>, error: ValidationError) -> Result<Option<u32>, ValidationError> {
    let Some(value) = value else {
        return Ok(None);
    };
    let number: Number = typed(value, error.clone())?;
    number
        .as_u64()
        .and_then(|v| u32::try_from(v).ok())
        .map(Some)
        .ok_or(error)
}

fn checked_point(point: GpsPoint, index: usize) -> Result<GpsPoint, ValidationError> {
    if point.is_valid() {
        Ok(point)
    } else {
        Err(ValidationError::InvalidRoutePoint { index })
    }
}

fn checked_route(points: Vec<GpsPoint>) -> Result<Vec<GpsPoint>, ValidationError> {
    if points.len() < 2 {
        return Err(ValidationError::TooFewRoutePoints(points.len()));
    }
    Ok(points)
}

// ============================================================================
// Feature matching
// ============================================================================

/// A validated route feature matching request.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatchRequest {
    pub route: Vec<GpsPoint>,
    pub threshold_meters: u32,
    pub elongation_meters: u32,
    pub categories: Vec<String>,
}

impl FeatureMatchRequest {
    /// Request for `route` using the default threshold, elongation and
    /// categories.
    pub fn new(route: Vec<GpsPoint>) -> Self {
        let config = MatchConfig::default();
        Self {
            route,
            threshold_meters: config.default_threshold_meters,
            elongation_meters: config.default_elongation_meters,
            categories: config.default_categories,
        }
    }

    /// Parse and validate a JSON body.
    ///
    /// # Example
    /// ```
    /// use poi_matcher::{FeatureMatchRequest, MatchConfig, ValidationError};
    ///
    /// let body = r#"{"route": [{"lon": 13.73, "lat": 51.05}, {"lon": 13.74, "lat": 51.05}],
    ///               "threshold": 10}"#;
    /// let request = FeatureMatchRequest::from_json(body, &MatchConfig::default()).unwrap();
    /// assert_eq!(request.threshold_meters, 10);
    /// assert_eq!(request.elongation_meters, 20);
    ///
    /// let negative = r#"{"route": [{"lon": 13.73, "lat": 51.05}, {"lon": 13.74, "lat": 51.05}],
    ///                   "threshold": -1}"#;
    /// assert_eq!(
    ///     FeatureMatchRequest::from_json(negative, &MatchConfig::default()),
    ///     Err(ValidationError::InvalidThreshold)
    /// );
    /// ```
    pub fn from_json(body: &str, config: &MatchConfig) -> Result<Self, ValidationError> {
        Self::from_value(&parse_str(body)?, config)
    }

    pub fn from_value(value: &Value, config: &MatchConfig) -> Result<Self, ValidationError> {
        let body: FeatureMatchBody = parse_body(value.clone())?;

        let route = parse_point_objects(body.route)?;
        let threshold_meters = optional_u32(body.threshold, ValidationError::InvalidThreshold)?
            .unwrap_or(config.default_threshold_meters);
        let elongation_meters = optional_u32(body.elongation, ValidationError::InvalidElongation)?
            .unwrap_or(config.default_elongation_meters);
        let categories = match body.categories {
            None => config.default_categories.clone(),
            Some(value) => parse_categories(value)?,
        };

        Ok(Self {
            route,
            threshold_meters,
            elongation_meters,
            categories,
        })
    }
}

/// `[{"lon": .., "lat": ..}, ...]`
fn parse_point_objects(value: Option<Value>) -> Result<Vec<GpsPoint>, ValidationError> {
    let entries: Vec<Value> = typed(
        value.ok_or(ValidationError::MissingRoute)?,
        ValidationError::MissingRoute,
    )?;

    let points = entries
        .into_iter()
        .enumerate()
        .map(|(index, entry)| {
            let LonLat { lon, lat } = typed(entry, ValidationError::InvalidRoutePoint { index })?;
            checked_point(GpsPoint::new(lat, lon), index)
        })
        .collect::<Result<Vec<_>, _>>()?;

    checked_route(points)
}

fn parse_categories(value: Value) -> Result<Vec<String>, ValidationError> {
    let entries: Vec<String> = typed(value, ValidationError::InvalidCategories)?;
    let mut categories: Vec<String> = Vec::with_capacity(entries.len());
    for entry in &entries {
        let name = entry.trim();
        if !is_valid_category(name) {
            return Err(ValidationError::InvalidCategories);
        }
        if !categories.iter().any(|c| c == name) {
            categories.push(name.to_string());
        }
    }
    Ok(categories)
}

/// Non-empty and not clashing with a response key.
pub(crate) fn is_valid_category(name: &str) -> bool {
    !name.is_empty() && !RESERVED_KEYS.contains(&name)
}

/// Matched segments per category.
///
/// Serialized flat: `{"success": true, "<category>": [[[lon, lat], ...], ...]}`.
/// Every requested category is present, possibly with an empty list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureMatchResponse {
    pub success: bool,
    #[serde(flatten)]
    pub segments: BTreeMap<String, Vec<MatchedSegment>>,
}

impl FeatureMatchResponse {
    pub fn new(segments: BTreeMap<String, Vec<MatchedSegment>>) -> Self {
        Self {
            success: true,
            segments,
        }
    }

    /// Segments of `category`, empty if it was not requested.
    pub fn segments(&self, category: &str) -> &[MatchedSegment] {
        self.segments
            .get(category)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn to_json(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }
}

// ============================================================================
// Landmark matching
// ============================================================================

/// Search radius preset for landmark matching.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LandmarkMode {
    #[default]
    Standard,
    /// Wider radius for areas with few landmarks
    Extended,
}

impl LandmarkMode {
    pub fn default_threshold(&self, config: &LandmarkConfig) -> u32 {
        match self {
            LandmarkMode::Standard => config.standard_threshold_meters,
            LandmarkMode::Extended => config.extended_threshold_meters,
        }
    }
}

impl FromStr for LandmarkMode {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "standard" => Ok(LandmarkMode::Standard),
            "extended" => Ok(LandmarkMode::Extended),
            other => Err(ValidationError::UnknownMode(other.to_string())),
        }
    }
}

impl fmt::Display for LandmarkMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LandmarkMode::Standard => write!(f, "standard"),
            LandmarkMode::Extended => write!(f, "extended"),
        }
    }
}

/// Landmark attached to an instruction in the response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LandmarkAnnotation {
    pub id: String,
    pub name: String,
    pub category: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub lat: f64,
    pub lon: f64,
    #[serde(rename = "distanceMeters")]
    pub distance_meters: f64,
    pub side: Side,
}

impl From<&LandmarkMatch> for LandmarkAnnotation {
    fn from(m: &LandmarkMatch) -> Self {
        Self {
            id: m.landmark.id.clone(),
            name: m.landmark.name.clone(),
            category: m.landmark.category.clone(),
            kind: m.landmark.kind.clone(),
            lat: m.landmark.coordinate.latitude,
            lon: m.landmark.coordinate.longitude,
            distance_meters: m.distance_meters,
            side: m.side,
        }
    }
}

/// A turn-by-turn instruction from the routing engine.
///
/// Fields other than `interval`, `text` and `sign` (distance, time, street
/// name, ...) are carried through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    /// Route vertex indices `[start, end]` covered by the instruction
    pub interval: [usize; 2],
    pub text: String,
    pub sign: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub landmark: Option<LandmarkAnnotation>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Instruction {
    pub fn new(interval: [usize; 2], text: &str, sign: i64) -> Self {
        Self {
            interval,
            text: text.to_string(),
            sign,
            landmark: None,
            extra: Map::new(),
        }
    }

    /// Route vertex where the instruction starts.
    pub fn decision_point(&self) -> usize {
        self.interval[0]
    }
}

/// A validated landmark matching request.
#[derive(Debug, Clone, PartialEq)]
pub struct LandmarkMatchRequest {
    pub route: Vec<GpsPoint>,
    pub instructions: Vec<Instruction>,
    /// Explicit search radius; the mode's default applies when absent
    pub threshold_meters: Option<u32>,
    pub mode: LandmarkMode,
}

impl LandmarkMatchRequest {
    pub fn new(route: Vec<GpsPoint>, instructions: Vec<Instruction>) -> Self {
        Self {
            route,
            instructions,
            threshold_meters: None,
            mode: LandmarkMode::default(),
        }
    }

    /// Search radius in meters for this request.
    pub fn threshold(&self, config: &LandmarkConfig) -> u32 {
        self.threshold_meters
            .unwrap_or_else(|| self.mode.default_threshold(config))
    }

    pub fn from_json(body: &str) -> Result<Self, ValidationError> {
        Self::from_value(&parse_str(body)?)
    }

    pub fn from_value(value: &Value) -> Result<Self, ValidationError> {
        let body: LandmarkMatchBody = parse_body(value.clone())?;

        let route = parse_coordinates(body.route)?;
        let entries: Vec<Value> = typed(
            body.instructions.ok_or(ValidationError::MissingInstructions)?,
            ValidationError::MissingInstructions,
        )?;
        let instructions = entries
            .into_iter()
            .enumerate()
            .map(|(index, entry)| parse_instruction(index, entry, route.len()))
            .collect::<Result<Vec<_>, _>>()?;
        let threshold_meters = optional_u32(body.threshold, ValidationError::InvalidThreshold)?;
        let mode = match body.mode {
            None => LandmarkMode::default(),
            Some(Value::String(mode)) => mode.parse()?,
            Some(other) => return Err(ValidationError::UnknownMode(other.to_string())),
        };

        Ok(Self {
            route,
            instructions,
            threshold_meters,
            mode,
        })
    }
}

/// `{"coordinates": [[lon, lat], ...]}`, extra ordinates such as elevation
/// are ignored.
fn parse_coordinates(value: Option<Value>) -> Result<Vec<GpsPoint>, ValidationError> {
    let line: LineString = typed(
        value.ok_or(ValidationError::MissingRoute)?,
        ValidationError::MissingRoute,
    )?;

    let points = line
        .coordinates
        .into_iter()
        .enumerate()
        .map(|(index, entry)| {
            let invalid = ValidationError::InvalidRoutePoint { index };
            let position: Vec<f64> = typed(entry, invalid.clone())?;
            match position.as_slice() {
                [lon, lat, ..] => checked_point(GpsPoint::new(*lat, *lon), index),
                _ => Err(invalid),
            }
        })
        .collect::<Result<Vec<_>, _>>()?;

    checked_route(points)
}

fn parse_instruction(
    index: usize,
    value: Value,
    route_len: usize,
) -> Result<Instruction, ValidationError> {
    let mut instruction: Instruction =
        serde_json::from_value(value).map_err(|e| ValidationError::InvalidInstruction {
            index,
            reason: e.to_string(),
        })?;

    let [start, end] = instruction.interval;
    if start > end || end >= route_len {
        return Err(ValidationError::InvalidInstruction {
            index,
            reason: "interval outside the route".to_string(),
        });
    }

    // Annotations are produced here, never accepted from the client
    instruction.landmark = None;
    Ok(instruction)
}

/// The instruction list, with matched instructions annotated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LandmarkMatchResponse {
    pub success: bool,
    pub instructions: Vec<Instruction>,
}

impl LandmarkMatchResponse {
    pub fn new(instructions: Vec<Instruction>) -> Self {
        Self {
            success: true,
            instructions,
        }
    }

    /// Number of instructions that received a landmark.
    pub fn matched_count(&self) -> usize {
        self.instructions
            .iter()
            .filter(|i| i.landmark.is_some())
            .count()
    }
}
