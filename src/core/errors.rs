use thiserror::Error;

use crate::core::geo_index::GeoIndexError;

/// A malformed input row or asset. Never fatal to a batch.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("Missing attribute: {0}")]
    MissingAttribute(String),

    #[error("Invalid number in column {column}: {value}")]
    InvalidNumber { column: String, value: String },

    #[error("Square meters must be positive, got {0}")]
    NonPositiveSqm(f64),

    #[error("Invalid coordinates: lat={lat}, lon={lon}")]
    InvalidCoordinates { lat: f64, lon: f64 },

    #[error("Price must be non-negative, got {0}")]
    NegativePrice(f64),
}

/// Errors surfaced by the valuation engine and the batch runner
#[derive(Debug, Error)]
pub enum ValuationError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Spatial query failed after {attempts} attempts: {source}")]
    TransientQuery {
        attempts: u32,
        #[source]
        source: GeoIndexError,
    },

    #[error("Spatial index error: {0}")]
    Index(GeoIndexError),

    /// Invalid configuration; aborts a batch before any row is processed
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl ValuationError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, ValuationError::Configuration(_))
    }
}
