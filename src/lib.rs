//! Reval Engine - comparable-based revaluation of real-estate assets
//!
//! For every potential asset the engine finds nearby comparable listings of
//! similar size, widening the search radius until enough evidence is found,
//! reduces their price/sqm to robust statistics and derives a market
//! valuation, a maximum purchase price and a buy score.

pub mod config;
pub mod core;
pub mod models;
pub mod routes;
pub mod services;

// Re-export commonly used types
pub use crate::core::{
    BatchConfig, BatchRunner, EngineSettings, ExpansionPolicy, GeoIndex, ValuationEngine, ValuationError,
};
pub use models::{Asset, AssetRole, AssetRow, ComparisonSummary, GeoPoint, ValuationParams, ValuationStatus};
pub use services::InMemoryGeoIndex;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_exports() {
        let bbox = crate::core::calculate_bounding_box(&GeoPoint::new(37.9838, 23.7275), 1_000.0);
        assert!(bbox.min_lat < 37.9838);
    }
}
