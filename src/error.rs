//! Error types for request validation, external lookups and matching.

use serde_json::json;
use thiserror::Error;

/// A request body that cannot be turned into a typed request.
///
/// These are client errors: the request is rejected before any matching
/// work is done.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Invalid request: {0}")]
    MalformedBody(String),

    #[error("No route data")]
    MissingRoute,

    #[error("Invalid route data at point {index}")]
    InvalidRoutePoint { index: usize },

    #[error("Invalid route points: at least 2 required, got {0}")]
    TooFewRoutePoints(usize),

    #[error("Invalid threshold.")]
    InvalidThreshold,

    #[error("Invalid elongation.")]
    InvalidElongation,

    #[error("Invalid categories.")]
    InvalidCategories,

    #[error("No instructions")]
    MissingInstructions,

    #[error("Invalid instruction {index}: {reason}")]
    InvalidInstruction { index: usize, reason: String },

    #[error("Unknown mode: {0}")]
    UnknownMode(String),
}

impl ValidationError {
    /// JSON body sent back to the client, `{"error": "<message>"}`.
    pub fn to_json_body(&self) -> serde_json::Value {
        json!({ "error": self.to_string() })
    }
}

/// Failure reported by a `NearbyFeatures` or `NearbyLandmarks` collaborator.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Lookup failed: {0}")]
pub struct LookupError(pub String);

/// Error returned by the matching entry points.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MatchError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Lookup(#[from] LookupError),

    #[error("Request cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, MatchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_body() {
        let body = ValidationError::InvalidThreshold.to_json_body();
        assert_eq!(body["error"], "Invalid threshold.");
    }

    #[test]
    fn test_lookup_error_converts() {
        let err: MatchError = LookupError("database unavailable".to_string()).into();
        assert_eq!(err.to_string(), "Lookup failed: database unavailable");
    }
}
