// Core algorithm exports
pub mod batch;
pub mod distance;
pub mod errors;
pub mod expander;
pub mod filters;
pub mod geo_index;
pub mod scoring;
pub mod statistics;
pub mod valuation;

pub use batch::{BatchConfig, BatchCounts, BatchOutcome, BatchRunner, RowReport, RowStatus, UnvaluedReason};
pub use distance::{calculate_bounding_box, haversine_distance, is_within_bounding_box};
pub use errors::{ValidationError, ValuationError};
pub use expander::{Expansion, ExpansionPolicy, ToleranceExpander};
pub use filters::{matches_filters, skip_reason, RowMarkers, SkipReason};
pub use geo_index::{query_with_retry, GeoIndex, GeoIndexError};
pub use scoring::{calculate_score, revalue, Revaluation};
pub use statistics::StatisticsAggregator;
pub use valuation::{EngineSettings, ValuationEngine};
