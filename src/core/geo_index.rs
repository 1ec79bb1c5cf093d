use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

use crate::core::errors::ValuationError;
use crate::models::{ComparableMatch, ComparableQuery};

/// Errors raised by a spatial store
#[derive(Debug, Error)]
pub enum GeoIndexError {
    #[error("Spatial query timed out")]
    Timeout,

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),
}

impl GeoIndexError {
    /// Timeouts and connection failures are worth retrying
    pub fn is_transient(&self) -> bool {
        matches!(self, GeoIndexError::Timeout | GeoIndexError::Connection(_))
    }
}

/// Spatial + attribute index over comparable listings.
///
/// Implementations must:
/// - measure great-circle distance, in meters;
/// - treat the radius and the sqm range as inclusive;
/// - return matches nearest first, at most `query.limit` of them;
/// - return an empty vector, not an error, when nothing matches.
#[async_trait]
pub trait GeoIndex: Send + Sync {
    async fn query(&self, query: &ComparableQuery) -> Result<Vec<ComparableMatch>, GeoIndexError>;
}

/// Run a query under a per-call timeout, retrying transient failures.
///
/// The same query is sent up to `retries + 1` times. Non-transient errors are
/// returned immediately.
pub async fn query_with_retry(
    index: &dyn GeoIndex,
    query: &ComparableQuery,
    timeout: Duration,
    retries: u32,
) -> Result<Vec<ComparableMatch>, ValuationError> {
    let attempts = retries + 1;
    let mut last_error = GeoIndexError::Timeout;

    for attempt in 1..=attempts {
        match tokio::time::timeout(timeout, index.query(query)).await {
            Ok(Ok(matches)) => return Ok(matches),
            Ok(Err(e)) if e.is_transient() => {
                warn!(
                    "Spatial query attempt {}/{} failed (radius {}m): {}",
                    attempt, attempts, query.radius_m, e
                );
                last_error = e;
            }
            Ok(Err(e)) => return Err(ValuationError::Index(e)),
            Err(_) => {
                warn!(
                    "Spatial query attempt {}/{} timed out after {:?} (radius {}m)",
                    attempt, attempts, timeout, query.radius_m
                );
                last_error = GeoIndexError::Timeout;
            }
        }
    }

    Err(ValuationError::TransientQuery {
        attempts,
        source: last_error,
    })
}
