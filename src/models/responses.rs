use serde::{Deserialize, Serialize};

use crate::core::batch::{BatchCounts, RowReport};
use crate::models::row::AssetRow;

/// Response of the batch valuation endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchValuationResponse {
    pub run_id: uuid::Uuid,
    /// Input rows, augmented, in input order
    pub rows: Vec<AssetRow>,
    pub report: Vec<RowReport>,
    #[serde(flatten)]
    pub counts: BatchCounts,
    /// Summaries that could not be stored
    #[serde(default)]
    pub persist_failures: usize,
    pub processed_at: chrono::DateTime<chrono::Utc>,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub storage: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub status_code: u16,
}
