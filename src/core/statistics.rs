use crate::models::{Asset, PriceStatistics};

/// Default outlier bound, in standard deviations from the raw mean
pub const DEFAULT_OUTLIER_SIGMA: f64 = 2.0;

/// Reduces matched comparables to price/sqm statistics.
///
/// Pure and order-independent: values are sorted before any reduction, so the
/// same multiset of prices always yields bit-identical output.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatisticsAggregator {
    outlier_sigma: f64,
}

impl StatisticsAggregator {
    pub fn new(outlier_sigma: f64) -> Self {
        Self { outlier_sigma }
    }

    /// Aggregate over assets; those without a usable price/sqm are ignored
    pub fn aggregate<'a, I>(&self, assets: I) -> PriceStatistics
    where
        I: IntoIterator<Item = &'a Asset>,
    {
        let values: Vec<f64> = assets.into_iter().filter_map(Asset::price_per_sqm).collect();
        self.summarize(&values)
    }

    /// Aggregate over raw price/sqm values
    pub fn summarize(&self, values: &[f64]) -> PriceStatistics {
        let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
        if sorted.is_empty() {
            return PriceStatistics::default();
        }
        sorted.sort_by(f64::total_cmp);

        let min = sorted[0];
        let max = sorted[sorted.len() - 1];
        let average = mean(&sorted).clamp(min, max);
        let std = population_std(&sorted, average);
        let (normalized, outliers_excluded) =
            normalized_mean(&sorted, average, std, self.outlier_sigma);

        PriceStatistics {
            count: sorted.len(),
            average: Some(average),
            min: Some(min),
            max: Some(max),
            median: Some(median(&sorted)),
            std: Some(std),
            normalized_mean: Some(normalized.clamp(min, max)),
            outliers_excluded,
        }
    }
}

impl Default for StatisticsAggregator {
    fn default() -> Self {
        Self::new(DEFAULT_OUTLIER_SIGMA)
    }
}

#[inline]
fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn population_std(values: &[f64], mean: f64) -> f64 {
    if values.len() == 1 {
        return 0.0;
    }
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// Median of an already sorted, non-empty slice
fn median(sorted: &[f64]) -> f64 {
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Mean over values within `sigma` standard deviations of the raw mean.
/// Falls back to the raw mean when the filter would drop everything.
fn normalized_mean(sorted: &[f64], raw_mean: f64, std: f64, sigma: f64) -> (f64, usize) {
    let bound = sigma * std;
    let kept: Vec<f64> = sorted
        .iter()
        .copied()
        .filter(|v| (v - raw_mean).abs() <= bound)
        .collect();

    if kept.is_empty() {
        return (raw_mean, 0);
    }

    (mean(&kept), sorted.len() - kept.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_set() {
        let stats = StatisticsAggregator::default().summarize(&[]);

        assert_eq!(stats.count, 0);
        assert_eq!(stats.average, None);
        assert_eq!(stats.std, None);
        assert_eq!(stats.normalized_mean, None);
    }

    #[test]
    fn test_single_value() {
        let stats = StatisticsAggregator::default().summarize(&[1750.0]);

        assert_eq!(stats.count, 1);
        assert_eq!(stats.std, Some(0.0));
        assert_eq!(stats.median, Some(1750.0));
        assert_eq!(stats.normalized_mean, Some(1750.0));
    }

    #[test]
    fn test_basic_statistics() {
        let stats = StatisticsAggregator::default().summarize(&[1700.0, 1500.0, 1600.0]);

        assert_eq!(stats.count, 3);
        assert_eq!(stats.average, Some(1600.0));
        assert_eq!(stats.min, Some(1500.0));
        assert_eq!(stats.max, Some(1700.0));
        assert_eq!(stats.median, Some(1600.0));
        assert_eq!(stats.normalized_mean, Some(1600.0));
        assert_eq!(stats.outliers_excluded, 0);

        let std = stats.std.unwrap();
        assert!((std - 81.6497).abs() < 1e-3, "got {}", std);
    }

    #[test]
    fn test_even_count_median() {
        let stats = StatisticsAggregator::default().summarize(&[1000.0, 4000.0, 2000.0, 3000.0]);
        assert_eq!(stats.median, Some(2500.0));
    }

    #[test]
    fn test_outlier_excluded_from_normalized_mean() {
        // Nine listings around 2000 and one mispriced at 20000
        let mut values = vec![1950.0, 2000.0, 2050.0, 1980.0, 2020.0, 1990.0, 2010.0, 1970.0, 2030.0];
        values.push(20_000.0);

        let stats = StatisticsAggregator::default().summarize(&values);
        let normalized = stats.normalized_mean.unwrap();

        assert_eq!(stats.outliers_excluded, 1);
        assert!(stats.average.unwrap() > 3_000.0);
        assert!((normalized - 2000.0).abs() < 1e-9, "got {}", normalized);
    }

    #[test]
    fn test_order_independent() {
        let aggregator = StatisticsAggregator::default();
        let a = aggregator.summarize(&[0.1, 0.7, 0.2, 1234.5, 3.3]);
        let b = aggregator.summarize(&[3.3, 1234.5, 0.2, 0.7, 0.1]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_normalized_mean_within_range() {
        let aggregator = StatisticsAggregator::new(0.5);
        let sets: [&[f64]; 4] = [
            &[0.1, 0.1, 0.1],
            &[1.0, 1_000_000.0],
            &[5.0, 5.0, 5.0, 9.0],
            &[1200.0, 1300.0, 1250.0, 4000.0, 100.0],
        ];

        for values in sets {
            let stats = aggregator.summarize(values);
            let normalized = stats.normalized_mean.unwrap();
            assert!(normalized >= stats.min.unwrap() && normalized <= stats.max.unwrap());
        }
    }

    #[test]
    fn test_zero_sigma_falls_back_to_raw_mean() {
        // With sigma 0 every value deviates from the mean, nothing survives
        let stats = StatisticsAggregator::new(0.0).summarize(&[1000.0, 2000.0]);
        assert_eq!(stats.normalized_mean, Some(1500.0));
        assert_eq!(stats.outliers_excluded, 0);
    }

    #[test]
    fn test_aggregate_skips_unpriced_assets() {
        use crate::models::{AssetRole, GeoPoint};

        let point = GeoPoint::new(37.98, 23.72);
        let assets = vec![
            Asset::new(AssetRole::Comparable, point, 80.0, "market", "1").with_price(120_000.0),
            Asset::new(AssetRole::Comparable, point, 80.0, "market", "2"),
        ];

        let stats = StatisticsAggregator::default().aggregate(&assets);
        assert_eq!(stats.count, 1);
        assert_eq!(stats.average, Some(1500.0));
    }
}
