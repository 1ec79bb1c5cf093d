/// Default share of the market value we are willing to pay
pub const DEFAULT_MARGIN_FACTOR: f64 = 0.85;

/// Valuation outputs derived from the market price/sqm
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Revaluation {
    pub revaluated_price_meter: Option<f64>,
    pub revaluation_total_price: Option<f64>,
    pub max_buy_price: Option<f64>,
    pub score: Option<f64>,
}

/// Derive the revaluation of an asset from the market price/sqm
///
/// Formulas:
/// revaluated_price_meter  = market price/sqm (outlier-adjusted)
/// revaluation_total_price = revaluated_price_meter * sqm
/// max_buy_price           = revaluation_total_price * margin_factor
/// score                   = (revaluation_total_price - ask_price) / revaluation_total_price
pub fn revalue(
    market_price_meter: Option<f64>,
    sqm: f64,
    ask_price: Option<f64>,
    margin_factor: f64,
) -> Revaluation {
    let Some(price_meter) = market_price_meter.filter(|p| p.is_finite()) else {
        return Revaluation::default();
    };

    let total = price_meter * sqm;
    let total = total.is_finite().then_some(total);

    Revaluation {
        revaluated_price_meter: Some(price_meter),
        revaluation_total_price: total,
        max_buy_price: total.map(|t| t * margin_factor),
        score: calculate_score(total, ask_price),
    }
}

/// Signed deal attractiveness: positive when the ask is below market value.
/// `None` without an ask price or when the market value is missing or zero.
#[inline]
pub fn calculate_score(revaluation_total_price: Option<f64>, ask_price: Option<f64>) -> Option<f64> {
    let total = revaluation_total_price?;
    let ask = ask_price?;
    if total == 0.0 || !total.is_finite() || !ask.is_finite() {
        return None;
    }
    Some((total - ask) / total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_revalue_athens_flat() {
        let revaluation = revalue(Some(1600.0), 80.0, Some(120_000.0), DEFAULT_MARGIN_FACTOR);

        assert_eq!(revaluation.revaluated_price_meter, Some(1600.0));
        assert_eq!(revaluation.revaluation_total_price, Some(128_000.0));
        assert!((revaluation.max_buy_price.unwrap() - 108_800.0).abs() < 1e-6);
        assert_eq!(revaluation.score, Some(0.0625));
    }

    #[test]
    fn test_revalue_without_market_price() {
        let revaluation = revalue(None, 80.0, Some(120_000.0), DEFAULT_MARGIN_FACTOR);
        assert_eq!(revaluation, Revaluation::default());
    }

    #[test]
    fn test_score_sign() {
        // Ask below market value
        assert!(calculate_score(Some(128_000.0), Some(100_000.0)).unwrap() > 0.0);

        // Ask above market value
        assert!(calculate_score(Some(128_000.0), Some(150_000.0)).unwrap() < 0.0);

        // At market value
        assert_eq!(calculate_score(Some(128_000.0), Some(128_000.0)), Some(0.0));
    }

    #[test]
    fn test_score_undefined_cases() {
        assert_eq!(calculate_score(Some(128_000.0), None), None);
        assert_eq!(calculate_score(None, Some(100_000.0)), None);
        assert_eq!(calculate_score(Some(0.0), Some(100_000.0)), None);
    }

    #[test]
    fn test_missing_ask_still_prices_asset() {
        let revaluation = revalue(Some(2000.0), 50.0, None, 0.9);

        assert_eq!(revaluation.revaluation_total_price, Some(100_000.0));
        assert!((revaluation.max_buy_price.unwrap() - 90_000.0).abs() < 1e-6);
        assert_eq!(revaluation.score, None);
    }
}
