// Model exports
pub mod domain;
pub mod requests;
pub mod responses;
pub mod row;

pub use domain::{
    Asset, AssetKey, AssetRole, AttributeFilters, BoundingBox, ComparableMatch, ComparableQuery,
    ComparisonSummary, GeoPoint, PriceStatistics, SqmRange, ValuationParams, ValuationStatus,
};
pub use requests::{AssetValuationRequest, BatchValuationRequest, SummaryQuery};
pub use responses::{BatchValuationResponse, ErrorResponse, HealthResponse};
pub use row::AssetRow;
