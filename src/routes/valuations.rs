use actix_web::{web, HttpResponse, Responder};
use std::sync::Arc;
use validator::Validate;

use crate::core::batch::BatchRunner;
use crate::core::errors::ValuationError;
use crate::models::{
    AssetRole, AssetValuationRequest, BatchValuationRequest, BatchValuationResponse, ErrorResponse,
    HealthResponse, SummaryQuery, ValuationParams,
};
use crate::services::PostgresClient;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub runner: Arc<BatchRunner>,
    /// Store for persisted summaries; absent when running on an in-memory index
    pub postgres: Option<Arc<PostgresClient>>,
    pub default_location_tolerance: f64,
}

/// Configure all valuation routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg
        .route("/health", web::get().to(health_check))
        .route("/valuations/batch", web::post().to(value_batch))
        .route("/valuations/asset", web::post().to(value_asset))
        .route("/summaries", web::get().to(get_summary));
}

fn error_response(error: &ValuationError) -> HttpResponse {
    if error.is_fatal() || matches!(error, ValuationError::Validation(_)) {
        return HttpResponse::BadRequest().json(ErrorResponse {
            error: "invalid_request".to_string(),
            message: error.to_string(),
            status_code: 400,
        });
    }

    HttpResponse::InternalServerError().json(ErrorResponse {
        error: "valuation_failed".to_string(),
        message: error.to_string(),
        status_code: 500,
    })
}

fn validation_failed(errors: validator::ValidationErrors) -> HttpResponse {
    HttpResponse::BadRequest().json(ErrorResponse {
        error: "Validation failed".to_string(),
        message: errors.to_string(),
        status_code: 400,
    })
}

/// Health check endpoint
async fn health_check(state: web::Data<AppState>) -> impl Responder {
    let (status, storage) = match &state.postgres {
        Some(postgres) => match postgres.health_check().await {
            Ok(true) => ("healthy", "postgres"),
            _ => ("degraded", "postgres"),
        },
        None => ("healthy", "memory"),
    };

    HttpResponse::Ok().json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        storage: storage.to_string(),
        timestamp: chrono::Utc::now(),
    })
}

/// Batch valuation endpoint
///
/// POST /api/v1/valuations/batch
///
/// Request body:
/// ```json
/// {
///   "rows": [{ "code": "A1", "sqm": 80, "price": 120000, "coords": "37.98,23.72" }],
///   "mustColumns": ["sqm", "coords"],
///   "locationTolerance": 100,
///   "sqmTolerance": 10,
///   "skipSqmLt": 20,
///   "skipIfHasComparison": false,
///   "skipIfHasPercent": true,
///   "skipIfNotResidential": true,
///   "persist": false
/// }
/// ```
async fn value_batch(
    state: web::Data<AppState>,
    req: web::Json<BatchValuationRequest>,
) -> impl Responder {
    if let Err(errors) = req.validate() {
        tracing::info!("Validation failed for batch request: {}", errors);
        return validation_failed(errors);
    }

    let req = req.into_inner();
    let config = req.to_batch_config(state.default_location_tolerance);
    let run_id = uuid::Uuid::new_v4();

    tracing::info!("Batch {} received with {} rows", run_id, req.rows.len());

    let outcome = match state.runner.run(&config, req.rows).await {
        Ok(outcome) => outcome,
        Err(e) => {
            tracing::error!("Batch {} rejected: {}", run_id, e);
            return error_response(&e);
        }
    };

    let mut persist_failures = 0;
    if req.persist {
        match &state.postgres {
            Some(postgres) => {
                for (index, summary) in &outcome.summaries {
                    let stored = match outcome.rows[*index].to_potential_asset(*index) {
                        Ok(asset) => postgres
                            .persist_valuation(&asset, summary)
                            .await
                            .map_err(|e| e.to_string()),
                        Err(e) => Err(e.to_string()),
                    };
                    if let Err(e) = stored {
                        tracing::warn!("Failed to store summary of row {}: {}", index, e);
                        persist_failures += 1;
                    }
                }
            }
            None => {
                tracing::warn!("Batch {} asked to persist but no store is configured", run_id);
                persist_failures = outcome.summaries.len();
            }
        }
    }

    HttpResponse::Ok().json(BatchValuationResponse {
        run_id,
        rows: outcome.rows,
        report: outcome.report,
        counts: outcome.counts,
        persist_failures,
        processed_at: chrono::Utc::now(),
    })
}

/// Single asset valuation endpoint
///
/// POST /api/v1/valuations/asset
async fn value_asset(
    state: web::Data<AppState>,
    req: web::Json<AssetValuationRequest>,
) -> impl Responder {
    let req = req.into_inner();
    let params = req.params.unwrap_or_else(|| ValuationParams {
        location_tolerance: state.default_location_tolerance,
        ..Default::default()
    });

    let summary = match state.runner.engine().value(&req.asset, &params).await {
        Ok(summary) => summary,
        Err(e) => {
            tracing::warn!("Valuation of {} failed: {}", req.asset.key(), e);
            return error_response(&e);
        }
    };

    if req.persist {
        if let Some(postgres) = &state.postgres {
            let mut asset = req.asset.clone();
            asset.role = AssetRole::Potential;
            if let Err(e) = postgres.persist_valuation(&asset, &summary).await {
                tracing::warn!("Failed to store summary of {}: {}", asset.key(), e);
            }
        }
    }

    HttpResponse::Ok().json(summary)
}

/// Stored summary lookup
///
/// GET /api/v1/summaries?source={source}&portfolio={portfolio}&code={code}
async fn get_summary(
    state: web::Data<AppState>,
    query: web::Query<SummaryQuery>,
) -> impl Responder {
    if let Err(errors) = query.validate() {
        return validation_failed(errors);
    }

    let Some(postgres) = &state.postgres else {
        return HttpResponse::NotFound().json(ErrorResponse {
            error: "storage_disabled".to_string(),
            message: "No summary store is configured".to_string(),
            status_code: 404,
        });
    };

    let key = query.key();
    match postgres.get_summary(&key).await {
        Ok(Some(summary)) => HttpResponse::Ok().json(summary),
        Ok(None) => HttpResponse::NotFound().json(ErrorResponse {
            error: "not_found".to_string(),
            message: format!("No summary for {}", key),
            status_code: 404,
        }),
        Err(e) => {
            tracing::error!("Failed to fetch summary for {}: {}", key, e);
            HttpResponse::InternalServerError().json(ErrorResponse {
                error: "Failed to fetch summary".to_string(),
                message: e.to_string(),
                status_code: 500,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::errors::ValidationError;
    use crate::core::geo_index::GeoIndexError;
    use actix_web::http::StatusCode;

    #[test]
    fn test_error_status_codes() {
        let config = ValuationError::Configuration("max_steps must be at least 1".to_string());
        assert_eq!(error_response(&config).status(), StatusCode::BAD_REQUEST);

        let invalid = ValuationError::Validation(ValidationError::NonPositiveSqm(0.0));
        assert_eq!(error_response(&invalid).status(), StatusCode::BAD_REQUEST);

        let down = ValuationError::TransientQuery {
            attempts: 3,
            source: GeoIndexError::Connection("connection refused".to_string()),
        };
        assert!(!down.is_fatal());
        assert_eq!(error_response(&down).status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
