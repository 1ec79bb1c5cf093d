use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::core::errors::ValuationError;
use crate::core::expander::{ExpansionPolicy, ToleranceExpander};
use crate::core::geo_index::GeoIndex;
use crate::core::scoring::{revalue, Revaluation, DEFAULT_MARGIN_FACTOR};
use crate::core::statistics::{StatisticsAggregator, DEFAULT_OUTLIER_SIGMA};
use crate::models::{Asset, ComparisonSummary, SqmRange, ValuationParams, ValuationStatus};

/// Tunables of the valuation engine
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    pub expansion: ExpansionPolicy,
    pub outlier_sigma: f64,
    pub margin_factor: f64,
    /// Sqm tolerance used when neither the caller nor the source sets one
    pub default_sqm_tolerance: f64,
    pub sqm_tolerance_by_source: HashMap<String, f64>,
    pub query_timeout: Duration,
    pub query_retries: u32,
    pub query_limit: usize,
    /// Derive a valuation from fewer than `min_evidence` comparables
    pub value_sparse_evidence: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            expansion: ExpansionPolicy::default(),
            outlier_sigma: DEFAULT_OUTLIER_SIGMA,
            margin_factor: DEFAULT_MARGIN_FACTOR,
            default_sqm_tolerance: 10.0,
            sqm_tolerance_by_source: HashMap::new(),
            query_timeout: Duration::from_millis(5_000),
            query_retries: 2,
            query_limit: 200,
            value_sparse_evidence: true,
        }
    }
}

impl EngineSettings {
    pub fn validate(&self) -> Result<(), ValuationError> {
        self.expansion.validate()?;

        if !(self.outlier_sigma.is_finite() && self.outlier_sigma >= 0.0) {
            return Err(ValuationError::Configuration(format!(
                "outlier_sigma must be non-negative, got {}",
                self.outlier_sigma
            )));
        }
        if !(self.margin_factor.is_finite() && self.margin_factor > 0.0) {
            return Err(ValuationError::Configuration(format!(
                "margin_factor must be positive, got {}",
                self.margin_factor
            )));
        }
        let tolerances = std::iter::once(self.default_sqm_tolerance)
            .chain(self.sqm_tolerance_by_source.values().copied());
        for tolerance in tolerances {
            if !(tolerance.is_finite() && tolerance >= 0.0) {
                return Err(ValuationError::Configuration(format!(
                    "sqm tolerance must be non-negative, got {}",
                    tolerance
                )));
            }
        }
        if self.query_timeout.is_zero() {
            return Err(ValuationError::Configuration(
                "query timeout must be positive".to_string(),
            ));
        }
        if self.query_limit == 0 {
            return Err(ValuationError::Configuration(
                "query_limit must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Values one potential asset against the comparables around it.
///
/// Stateless between calls: no caching, no persistence, and the asset is
/// never mutated. Safe to share across worker tasks.
pub struct ValuationEngine {
    index: Arc<dyn GeoIndex>,
    settings: EngineSettings,
    aggregator: StatisticsAggregator,
}

impl ValuationEngine {
    pub fn new(index: Arc<dyn GeoIndex>, settings: EngineSettings) -> Result<Self, ValuationError> {
        settings.validate()?;
        let aggregator = StatisticsAggregator::new(settings.outlier_sigma);
        Ok(Self {
            index,
            settings,
            aggregator,
        })
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Caller's tolerance, else the source default, else the global default
    pub fn sqm_tolerance_for(&self, source: &str, explicit: Option<f64>) -> f64 {
        explicit
            .or_else(|| self.settings.sqm_tolerance_by_source.get(source).copied())
            .unwrap_or(self.settings.default_sqm_tolerance)
    }

    /// Find comparables for `asset`, aggregate their price/sqm and derive the
    /// revaluation.
    ///
    /// Zero usable comparables is not an error: the summary comes back
    /// `Unvalued` with null statistics.
    pub async fn value(
        &self,
        asset: &Asset,
        params: &ValuationParams,
    ) -> Result<ComparisonSummary, ValuationError> {
        asset.validate()?;

        let sqm_tolerance = self.sqm_tolerance_for(&asset.source, params.sqm_tolerance);
        if !(sqm_tolerance.is_finite() && sqm_tolerance >= 0.0) {
            return Err(ValuationError::Configuration(format!(
                "sqm tolerance must be non-negative, got {}",
                sqm_tolerance
            )));
        }
        let sqm_range = SqmRange::around(asset.sqm, sqm_tolerance);

        let mut filters = params.filters.clone();
        if filters.exclude.is_none() {
            filters.exclude = Some(asset.key());
        }

        let expansion = ToleranceExpander::new(self.index.as_ref(), &self.settings.expansion)
            .with_timeout(self.settings.query_timeout, self.settings.query_retries)
            .resolve(
                asset.location,
                sqm_range,
                &filters,
                self.settings.query_limit,
                params.location_tolerance,
            )
            .await?;

        let stats = self
            .aggregator
            .aggregate(expansion.matches.iter().map(|m| &m.asset));

        let status = match stats.count {
            0 => ValuationStatus::Unvalued,
            n if n < self.settings.expansion.min_evidence => ValuationStatus::SparseEvidence,
            _ => ValuationStatus::Valued,
        };

        let revaluation = match status {
            ValuationStatus::Valued => self.derive(asset, stats.normalized_mean),
            ValuationStatus::SparseEvidence if self.settings.value_sparse_evidence => {
                self.derive(asset, stats.normalized_mean)
            }
            _ => Revaluation::default(),
        };

        // Matches are nearest first
        let reference_url = expansion
            .matches
            .iter()
            .filter(|m| m.asset.price_per_sqm().is_some())
            .find_map(|m| m.asset.url.clone());

        debug!(
            "Valued {}: {} comparables within {}m after {} steps ({})",
            asset.key(),
            stats.count,
            expansion.searched_radius,
            expansion.steps,
            status.as_str()
        );

        Ok(ComparisonSummary {
            asset_key: asset.key(),
            assets_count: stats.count,
            average: stats.average,
            min: stats.min,
            max: stats.max,
            median: stats.median,
            std: stats.std,
            normalized_mean: stats.normalized_mean,
            outliers_excluded: stats.outliers_excluded,
            revaluated_price_meter: revaluation.revaluated_price_meter,
            revaluation_total_price: revaluation.revaluation_total_price,
            max_buy_price: revaluation.max_buy_price,
            score: revaluation.score,
            searched_radius: expansion.searched_radius,
            expansion_steps: expansion.steps,
            reference_url,
            asset_url: asset.url.clone(),
            status,
        })
    }

    fn derive(&self, asset: &Asset, market_price_meter: Option<f64>) -> Revaluation {
        revalue(market_price_meter, asset.sqm, asset.price, self.settings.margin_factor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AssetRole, GeoPoint};
    use crate::services::memory::InMemoryGeoIndex;

    const SYNTAGMA: GeoPoint = GeoPoint {
        lat: 37.9755,
        lon: 23.7348,
    };

    fn target() -> Asset {
        Asset::new(AssetRole::Potential, SYNTAGMA, 80.0, "auction", "AUC-1").with_price(120_000.0)
    }

    /// A comparable `north_m` meters due north of Syntagma
    fn comparable(code: &str, north_m: f64, sqm: f64, price: f64) -> Asset {
        let lat = SYNTAGMA.lat + north_m / 111_195.0;
        Asset::new(AssetRole::Comparable, GeoPoint::new(lat, SYNTAGMA.lon), sqm, "market", code)
            .with_price(price)
            .with_url(format!("https://listings.example/{}", code))
    }

    fn engine(assets: Vec<Asset>) -> ValuationEngine {
        let index = InMemoryGeoIndex::from_assets(assets);
        ValuationEngine::new(Arc::new(index), EngineSettings::default()).unwrap()
    }

    #[tokio::test]
    async fn test_athens_scenario() {
        let engine = engine(vec![
            comparable("C1", 50.0, 80.0, 120_000.0),
            comparable("C2", 60.0, 80.0, 128_000.0),
            comparable("C3", 70.0, 80.0, 136_000.0),
        ]);

        let summary = engine.value(&target(), &ValuationParams::default()).await.unwrap();

        assert_eq!(summary.status, ValuationStatus::Valued);
        assert_eq!(summary.assets_count, 3);
        assert_eq!(summary.average, Some(1600.0));
        assert_eq!(summary.normalized_mean, Some(1600.0));
        assert_eq!(summary.revaluated_price_meter, Some(1600.0));
        assert_eq!(summary.revaluation_total_price, Some(128_000.0));
        assert!((summary.max_buy_price.unwrap() - 108_800.0).abs() < 1e-6);
        assert_eq!(summary.score, Some(0.0625));
        assert_eq!(summary.searched_radius, 100.0);
        assert_eq!(summary.reference_url.as_deref(), Some("https://listings.example/C1"));
    }

    #[tokio::test]
    async fn test_zero_evidence() {
        let engine = engine(vec![comparable("FAR", 20_000.0, 80.0, 120_000.0)]);
        let summary = engine.value(&target(), &ValuationParams::default()).await.unwrap();

        assert_eq!(summary.status, ValuationStatus::Unvalued);
        assert_eq!(summary.assets_count, 0);
        assert_eq!(summary.searched_radius, 5_000.0);
        assert_eq!(summary.average, None);
        assert_eq!(summary.revaluated_price_meter, None);
        assert_eq!(summary.score, None);
    }

    #[tokio::test]
    async fn test_sparse_evidence() {
        let assets = vec![comparable("C1", 50.0, 80.0, 128_000.0)];

        let valued = engine(assets.clone());
        let summary = valued.value(&target(), &ValuationParams::default()).await.unwrap();
        assert_eq!(summary.status, ValuationStatus::SparseEvidence);
        assert_eq!(summary.revaluated_price_meter, Some(1600.0));

        let strict = ValuationEngine::new(
            Arc::new(InMemoryGeoIndex::from_assets(assets)),
            EngineSettings {
                value_sparse_evidence: false,
                ..Default::default()
            },
        )
        .unwrap();
        let summary = strict.value(&target(), &ValuationParams::default()).await.unwrap();
        assert_eq!(summary.status, ValuationStatus::SparseEvidence);
        assert_eq!(summary.average, Some(1600.0));
        assert_eq!(summary.revaluated_price_meter, None);
    }

    #[tokio::test]
    async fn test_idempotent() {
        let engine = engine(vec![
            comparable("C1", 150.0, 75.0, 110_000.0),
            comparable("C2", 300.0, 85.0, 140_000.0),
            comparable("C3", 900.0, 82.0, 125_000.0),
            comparable("C4", 1_200.0, 79.0, 131_000.0),
        ]);

        let first = engine.value(&target(), &ValuationParams::default()).await.unwrap();
        let second = engine.value(&target(), &ValuationParams::default()).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_sqm_tolerance_resolution() {
        let mut settings = EngineSettings::default();
        settings.sqm_tolerance_by_source.insert("auction".to_string(), 25.0);
        let engine = ValuationEngine::new(Arc::new(InMemoryGeoIndex::new()), settings).unwrap();

        assert_eq!(engine.sqm_tolerance_for("auction", Some(5.0)), 5.0);
        assert_eq!(engine.sqm_tolerance_for("auction", None), 25.0);
        assert_eq!(engine.sqm_tolerance_for("market", None), 10.0);
    }

    #[tokio::test]
    async fn test_target_never_its_own_comparable() {
        let mut own_listing = target();
        own_listing.role = AssetRole::Comparable;
        own_listing.source = "market".to_string();

        let engine = engine(vec![own_listing.clone()]);
        let mut asset = target();
        asset.source = "market".to_string();

        let summary = engine.value(&asset, &ValuationParams::default()).await.unwrap();
        assert_eq!(summary.assets_count, 0);
    }

    #[tokio::test]
    async fn test_invalid_asset_rejected() {
        let engine = engine(vec![]);
        let mut asset = target();
        asset.sqm = -3.0;

        let result = engine.value(&asset, &ValuationParams::default()).await;
        assert!(matches!(result, Err(ValuationError::Validation(_))));
    }

    #[test]
    fn test_settings_validation() {
        assert!(EngineSettings::default().validate().is_ok());

        let bad_margin = EngineSettings {
            margin_factor: 0.0,
            ..Default::default()
        };
        assert!(matches!(
            bad_margin.validate(),
            Err(ValuationError::Configuration(_))
        ));
    }

    #[test]
    fn test_engine_rejects_zero_expansion_steps() {
        let settings = EngineSettings {
            expansion: ExpansionPolicy {
                max_steps: 0,
                ..Default::default()
            },
            ..Default::default()
        };
        let index = Arc::new(InMemoryGeoIndex::new());
        assert!(matches!(
            ValuationEngine::new(index, settings),
            Err(ValuationError::Configuration(_))
        ));
    }
}
