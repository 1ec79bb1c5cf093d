use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::core::errors::ValuationError;
use crate::core::expander::ExpansionPolicy;
use crate::core::filters::{skip_reason, RowMarkers, SkipReason};
use crate::core::valuation::ValuationEngine;
use crate::models::row::{columns, AssetRow};
use crate::models::{AttributeFilters, ComparisonSummary, ValuationParams, ValuationStatus};

/// Run-level options passed through from the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Rows missing any of these columns are skipped
    #[serde(default)]
    pub must_columns: Vec<String>,
    #[serde(default = "default_location_tolerance")]
    pub location_tolerance: f64,
    /// Overrides the source-specific sqm tolerance
    #[serde(default)]
    pub sqm_tolerance: Option<f64>,
    #[serde(default)]
    pub skip_sqm_lt: Option<f64>,
    #[serde(default)]
    pub skip_if_has_comparison: bool,
    #[serde(default)]
    pub skip_if_has_percent_marker: bool,
    #[serde(default)]
    pub skip_if_not_residential: bool,
    #[serde(default)]
    pub filters: AttributeFilters,
    /// Worker count; the runner default applies when absent
    #[serde(default)]
    pub workers: Option<usize>,
}

fn default_location_tolerance() -> f64 {
    crate::models::domain::default_location_tolerance()
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            must_columns: Vec::new(),
            location_tolerance: default_location_tolerance(),
            sqm_tolerance: None,
            skip_sqm_lt: None,
            skip_if_has_comparison: false,
            skip_if_has_percent_marker: false,
            skip_if_not_residential: false,
            filters: AttributeFilters::default(),
            workers: None,
        }
    }
}

impl BatchConfig {
    pub fn new(location_tolerance: f64, sqm_tolerance: Option<f64>) -> Self {
        Self {
            location_tolerance,
            sqm_tolerance,
            ..Default::default()
        }
    }

    /// Checked once before any row runs
    pub fn validate(&self, policy: &ExpansionPolicy) -> Result<(), ValuationError> {
        policy.validate()?;
        policy.validate_tolerance(self.location_tolerance)?;

        if let Some(tolerance) = self.sqm_tolerance {
            if !(tolerance.is_finite() && tolerance >= 0.0) {
                return Err(ValuationError::Configuration(format!(
                    "sqm_tolerance must be non-negative, got {}",
                    tolerance
                )));
            }
        }
        if let Some(floor) = self.skip_sqm_lt {
            if !floor.is_finite() {
                return Err(ValuationError::Configuration(format!(
                    "skip_sqm_lt must be finite, got {}",
                    floor
                )));
            }
        }
        if self.workers == Some(0) {
            return Err(ValuationError::Configuration(
                "workers must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    fn params(&self) -> ValuationParams {
        ValuationParams {
            location_tolerance: self.location_tolerance,
            sqm_tolerance: self.sqm_tolerance,
            filters: self.filters.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnvaluedReason {
    NoComparables,
    QueryFailed,
    WorkerFailed,
}

impl UnvaluedReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnvaluedReason::NoComparables => "no_comparables",
            UnvaluedReason::QueryFailed => "query_failed",
            UnvaluedReason::WorkerFailed => "worker_failed",
        }
    }
}

/// Per-row result of a batch run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RowStatus {
    Valued,
    SparseEvidence,
    Unvalued { reason: UnvaluedReason },
    Skipped { reason: SkipReason },
    Invalid { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowReport {
    pub index: usize,
    #[serde(flatten)]
    pub status: RowStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BatchCounts {
    pub valued: usize,
    pub sparse: usize,
    pub unvalued: usize,
    pub skipped: usize,
    pub invalid: usize,
}

impl BatchCounts {
    fn record(&mut self, status: &RowStatus) {
        match status {
            RowStatus::Valued => self.valued += 1,
            RowStatus::SparseEvidence => self.sparse += 1,
            RowStatus::Unvalued { .. } => self.unvalued += 1,
            RowStatus::Skipped { .. } => self.skipped += 1,
            RowStatus::Invalid { .. } => self.invalid += 1,
        }
    }
}

/// Output of a batch run, rows in input order
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub rows: Vec<AssetRow>,
    pub report: Vec<RowReport>,
    /// Summaries of every row that reached the engine, by row index
    pub summaries: Vec<(usize, ComparisonSummary)>,
    pub counts: BatchCounts,
}

/// What a worker sends back for one row
#[derive(Debug)]
struct RowOutcome {
    row: AssetRow,
    status: RowStatus,
    summary: Option<ComparisonSummary>,
}

/// Fans rows out over a fixed pool of worker tasks.
///
/// Workers pull row indices from a shared cursor and send results back over a
/// channel; the collector writes them into an index-addressed buffer, so the
/// output order always equals the input order.
pub struct BatchRunner {
    engine: Arc<ValuationEngine>,
    markers: Arc<RowMarkers>,
    workers: usize,
}

impl BatchRunner {
    pub fn new(engine: Arc<ValuationEngine>, markers: RowMarkers, workers: usize) -> Self {
        Self {
            engine,
            markers: Arc::new(markers),
            workers: workers.max(1),
        }
    }

    pub fn engine(&self) -> &Arc<ValuationEngine> {
        &self.engine
    }

    /// Process every row. Per-row failures are recorded, never raised; only an
    /// invalid configuration aborts, before any row is processed.
    pub async fn run(&self, config: &BatchConfig, rows: Vec<AssetRow>) -> Result<BatchOutcome, ValuationError> {
        config.validate(&self.engine.settings().expansion)?;

        let total = rows.len();
        let workers = config.workers.unwrap_or(self.workers).min(total).max(1);
        info!("Starting batch of {} rows with {} workers", total, workers);

        let rows = Arc::new(rows);
        let config = Arc::new(config.clone());
        let cursor = Arc::new(AtomicUsize::new(0));
        let (tx, mut rx) = mpsc::channel::<(usize, RowOutcome)>(workers * 2);

        let mut handles = Vec::with_capacity(workers);
        for worker in 0..workers {
            let rows = Arc::clone(&rows);
            let config = Arc::clone(&config);
            let cursor = Arc::clone(&cursor);
            let engine = Arc::clone(&self.engine);
            let markers = Arc::clone(&self.markers);
            let tx = tx.clone();

            handles.push(tokio::spawn(async move {
                loop {
                    let index = cursor.fetch_add(1, Ordering::Relaxed);
                    let Some(row) = rows.get(index) else {
                        break;
                    };
                    let outcome = process_row(&engine, &markers, &config, index, row).await;
                    if tx.send((index, outcome)).await.is_err() {
                        break;
                    }
                }
                debug!("Batch worker {} finished", worker);
            }));
        }
        drop(tx);

        let mut buffer: Vec<Option<RowOutcome>> = (0..total).map(|_| None).collect();
        while let Some((index, outcome)) = rx.recv().await {
            buffer[index] = Some(outcome);
        }

        for handle in handles {
            if let Err(e) = handle.await {
                error!("Batch worker failed: {}", e);
            }
        }

        let rows = Arc::try_unwrap(rows).unwrap_or_else(|shared| shared.as_ref().clone());
        let mut outcome = BatchOutcome {
            rows: Vec::with_capacity(total),
            report: Vec::with_capacity(total),
            summaries: Vec::new(),
            counts: BatchCounts::default(),
        };

        // Empty slots belong to workers that panicked; needs the unwinding panic strategy
        for (index, (slot, original)) in buffer.into_iter().zip(rows).enumerate() {
            let RowOutcome { row, status, summary } = slot.unwrap_or_else(|| {
                warn!("Row {} was lost by its worker, marking unvalued", index);
                let mut row = original;
                row.mark_unvalued(UnvaluedReason::WorkerFailed.as_str());
                RowOutcome {
                    row,
                    status: RowStatus::Unvalued {
                        reason: UnvaluedReason::WorkerFailed,
                    },
                    summary: None,
                }
            });

            outcome.counts.record(&status);
            outcome.rows.push(row);
            outcome.report.push(RowReport { index, status });
            if let Some(summary) = summary {
                outcome.summaries.push((index, summary));
            }
        }

        info!(
            "Batch finished: {} valued, {} sparse, {} unvalued, {} skipped, {} invalid",
            outcome.counts.valued,
            outcome.counts.sparse,
            outcome.counts.unvalued,
            outcome.counts.skipped,
            outcome.counts.invalid
        );

        Ok(outcome)
    }
}

async fn process_row(
    engine: &ValuationEngine,
    markers: &RowMarkers,
    config: &BatchConfig,
    index: usize,
    row: &AssetRow,
) -> RowOutcome {
    if let Some(reason) = skip_reason(row, config, markers) {
        debug!("Skipping row {}: {:?}", index, reason);
        return RowOutcome {
            row: row.clone(),
            status: RowStatus::Skipped { reason },
            summary: None,
        };
    }

    let asset = match row.to_potential_asset(index) {
        Ok(asset) => asset,
        Err(e) => {
            debug!("Row {} is invalid: {}", index, e);
            return RowOutcome {
                row: row.clone(),
                status: RowStatus::Invalid { reason: e.to_string() },
                summary: None,
            };
        }
    };

    match engine.value(&asset, &config.params()).await {
        Ok(summary) => {
            let mut row = row.clone();
            row.apply_summary(&summary);
            let status = match summary.status {
                ValuationStatus::Valued => RowStatus::Valued,
                ValuationStatus::SparseEvidence => RowStatus::SparseEvidence,
                ValuationStatus::Unvalued => {
                    row.set(columns::UNVALUED_REASON, UnvaluedReason::NoComparables.as_str());
                    RowStatus::Unvalued {
                        reason: UnvaluedReason::NoComparables,
                    }
                }
            };
            RowOutcome {
                row,
                status,
                summary: Some(summary),
            }
        }
        Err(ValuationError::Validation(e)) => RowOutcome {
            row: row.clone(),
            status: RowStatus::Invalid { reason: e.to_string() },
            summary: None,
        },
        Err(e) => {
            warn!("Row {} ({}) could not be valued: {}", index, asset.key(), e);
            let mut row = row.clone();
            row.mark_unvalued(UnvaluedReason::QueryFailed.as_str());
            RowOutcome {
                row,
                status: RowStatus::Unvalued {
                    reason: UnvaluedReason::QueryFailed,
                },
                summary: None,
            }
        }
    }
}
