use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::core::batch::BatchConfig;
use crate::models::domain::{Asset, AssetKey, AttributeFilters, ValuationParams};
use crate::models::row::AssetRow;

/// Request to value a sheet of potential assets
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct BatchValuationRequest {
    #[validate(length(min = 1, max = 100000))]
    pub rows: Vec<AssetRow>,
    #[serde(default)]
    #[serde(alias = "must_columns", rename = "mustColumns")]
    pub must_columns: Vec<String>,
    /// Initial search radius in meters
    #[validate(range(exclusive_min = 0.0))]
    #[serde(alias = "location_tolerance", rename = "locationTolerance")]
    pub location_tolerance: Option<f64>,
    #[validate(range(min = 0.0))]
    #[serde(alias = "sqm_tolerance", rename = "sqmTolerance")]
    pub sqm_tolerance: Option<f64>,
    #[serde(alias = "skip_sqm_lt", rename = "skipSqmLt")]
    pub skip_sqm_lt: Option<f64>,
    #[serde(default)]
    #[serde(alias = "skip_if_has_comparison", rename = "skipIfHasComparison")]
    pub skip_if_has_comparison: bool,
    #[serde(default)]
    #[serde(alias = "skip_if_has_percent", rename = "skipIfHasPercent")]
    pub skip_if_has_percent_marker: bool,
    #[serde(default)]
    #[serde(alias = "skip_if_not_residential", rename = "skipIfNotResidential")]
    pub skip_if_not_residential: bool,
    /// Comparable sources to draw from; empty means all
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(default)]
    pub portfolios: Vec<String>,
    #[validate(range(min = 1, max = 64))]
    pub workers: Option<usize>,
    /// Store the potential assets and their summaries after valuation
    #[serde(default)]
    pub persist: bool,
}

impl BatchValuationRequest {
    pub fn to_batch_config(&self, default_location_tolerance: f64) -> BatchConfig {
        BatchConfig {
            must_columns: self.must_columns.clone(),
            location_tolerance: self.location_tolerance.unwrap_or(default_location_tolerance),
            sqm_tolerance: self.sqm_tolerance,
            skip_sqm_lt: self.skip_sqm_lt,
            skip_if_has_comparison: self.skip_if_has_comparison,
            skip_if_has_percent_marker: self.skip_if_has_percent_marker,
            skip_if_not_residential: self.skip_if_not_residential,
            filters: AttributeFilters {
                sources: self.sources.clone(),
                portfolios: self.portfolios.clone(),
                ..Default::default()
            },
            workers: self.workers,
        }
    }
}

/// Request to value a single asset
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetValuationRequest {
    pub asset: Asset,
    #[serde(default)]
    pub params: Option<ValuationParams>,
    #[serde(default)]
    pub persist: bool,
}

/// Query string of the summary lookup
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SummaryQuery {
    #[validate(length(min = 1))]
    pub source: String,
    #[serde(default)]
    pub portfolio: String,
    #[validate(length(min = 1))]
    pub code: String,
}

impl SummaryQuery {
    pub fn key(&self) -> AssetKey {
        AssetKey {
            source: self.source.clone(),
            portfolio: self.portfolio.clone(),
            source_unique_code: self.code.clone(),
        }
    }
}
