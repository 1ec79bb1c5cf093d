use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::errors::ValidationError;
use crate::models::domain::{Asset, AssetRole, ComparisonSummary, GeoPoint};

/// Column names read from and written to tabular rows
pub mod columns {
    // Input
    pub const SQM: &str = "sqm";
    pub const PRICE: &str = "price";
    pub const COORDS: &str = "coords";
    pub const LAT: &str = "lat";
    pub const LON: &str = "lon";
    pub const CODE: &str = "code";
    pub const SOURCE: &str = "source";
    pub const PORTFOLIO: &str = "portfolio";
    pub const TITLE: &str = "title";
    pub const DESCRIPTION: &str = "description";
    pub const SUBCATEGORY: &str = "subcategory";
    /// Greek-language headers of scraped listing sheets
    pub const TITLE_GR: &str = "TitleGR";
    pub const SUBCATEGORY_GR: &str = "SubCategoryGR";
    pub const LEVEL: &str = "level";
    pub const PARKING: &str = "parking";
    pub const CONSTRUCTION_YEAR: &str = "construction_year";
    pub const ADDRESS: &str = "address";
    pub const MUNICIPALITY: &str = "municipality";
    pub const PREFECTURE: &str = "prefecture";
    pub const URL: &str = "url";

    // Output
    pub const PRICE_PER_SQM: &str = "price/sqm";
    pub const COMPARISON_AVERAGE: &str = "comparison_average";
    pub const COMPARISON_MIN: &str = "comparison_min";
    pub const COMPARISON_MAX: &str = "comparison_max";
    pub const COMPARISON_MEDIAN: &str = "comparison_median";
    pub const COMPARISON_STD: &str = "comparison_std";
    pub const COMPARISON_NORMALIZED_MEAN: &str = "comparison_normalized_mean";
    pub const ASSETS_COUNT: &str = "#assets";
    pub const REVALUATED_PRICE_METER: &str = "revaluated_price_meter";
    pub const REVALUATION_TOTAL_PRICE: &str = "revaluation_total_price";
    pub const MAX_BUY_PRICE: &str = "max_buy_price";
    pub const SCORE: &str = "score";
    pub const SEARCHED_RADIUS: &str = "searched_radius";
    pub const COMPARISON_URL: &str = "comparison_url";
    pub const VALUATION_STATUS: &str = "valuation_status";
    pub const UNVALUED_REASON: &str = "unvalued_reason";

    /// Accepted spellings, first present wins
    pub const TITLE_ALIASES: [&str; 2] = [TITLE, TITLE_GR];
    pub const SUBCATEGORY_ALIASES: [&str; 2] = [SUBCATEGORY, SUBCATEGORY_GR];

    /// Every column written back by a valuation
    pub const OUTPUT: [&str; 16] = [
        PRICE_PER_SQM,
        COMPARISON_AVERAGE,
        COMPARISON_MIN,
        COMPARISON_MAX,
        COMPARISON_MEDIAN,
        COMPARISON_STD,
        COMPARISON_NORMALIZED_MEAN,
        ASSETS_COUNT,
        REVALUATED_PRICE_METER,
        REVALUATION_TOTAL_PRICE,
        MAX_BUY_PRICE,
        SCORE,
        SEARCHED_RADIUS,
        COMPARISON_URL,
        VALUATION_STATUS,
        UNVALUED_REASON,
    ];
}

/// Source label used when a row carries none
pub const DEFAULT_ROW_SOURCE: &str = "potential";

/// One row of a potential-asset sheet: named columns with JSON values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetRow(Map<String, Value>);

impl From<Map<String, Value>> for AssetRow {
    fn from(columns: Map<String, Value>) -> Self {
        Self(columns)
    }
}

impl AssetRow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style column setter
    pub fn with(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.set(column, value);
        self
    }

    pub fn set(&mut self, column: &str, value: impl Into<Value>) {
        self.0.insert(column.to_string(), value.into());
    }

    pub fn columns(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_columns(self) -> Map<String, Value> {
        self.0
    }

    /// Column value, treating JSON null as absent
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.0.get(column).filter(|v| !v.is_null())
    }

    /// Present, non-null and not a blank string
    pub fn has_value(&self, column: &str) -> bool {
        match self.get(column) {
            Some(Value::String(s)) => !s.trim().is_empty(),
            Some(_) => true,
            None => false,
        }
    }

    /// Numeric column. Numbers and numeric strings are accepted.
    pub fn number(&self, column: &str) -> Result<Option<f64>, ValidationError> {
        let invalid = |value: &Value| ValidationError::InvalidNumber {
            column: column.to_string(),
            value: value.to_string(),
        };

        match self.get(column) {
            None => Ok(None),
            Some(Value::Number(n)) => n.as_f64().map(Some).ok_or_else(|| invalid(&Value::Number(n.clone()))),
            Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
            Some(value @ Value::String(s)) => s
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .map(Some)
                .ok_or_else(|| invalid(value)),
            Some(value) => Err(invalid(value)),
        }
    }

    /// Text column; numbers are rendered as text
    pub fn text(&self, column: &str) -> Option<String> {
        match self.get(column)? {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Text of the first alias that carries a value
    pub fn first_text(&self, aliases: &[&str]) -> Option<String> {
        aliases.iter().find_map(|column| self.text(column))
    }

    /// Yes/no column
    pub fn flag(&self, column: &str) -> Option<bool> {
        match self.get(column)? {
            Value::Bool(b) => Some(*b),
            Value::Number(n) => n.as_f64().map(|v| v != 0.0),
            Value::String(s) => match s.trim().to_lowercase().as_str() {
                "true" | "yes" | "y" | "1" | "ναι" => Some(true),
                "false" | "no" | "n" | "0" | "όχι" | "οχι" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    /// Location from `lat` + `lon` columns, falling back to a `coords` column
    pub fn location(&self) -> Result<Option<GeoPoint>, ValidationError> {
        if let (Some(lat), Some(lon)) = (self.number(columns::LAT)?, self.number(columns::LON)?) {
            return Ok(Some(GeoPoint::new(lat, lon)));
        }

        match self.text(columns::COORDS) {
            None => Ok(None),
            Some(raw) => GeoPoint::parse_coords(&raw)
                .map(Some)
                .ok_or(ValidationError::InvalidNumber {
                    column: columns::COORDS.to_string(),
                    value: raw,
                }),
        }
    }

    /// Whether a previous run already wrote a comparison into this row
    pub fn has_comparison(&self) -> bool {
        self.has_value(columns::COMPARISON_AVERAGE)
    }

    /// Build the potential asset this row describes.
    ///
    /// `index` is the row position, used as the code when the row has none.
    pub fn to_potential_asset(&self, index: usize) -> Result<Asset, ValidationError> {
        let location = self
            .location()?
            .ok_or_else(|| ValidationError::MissingAttribute(columns::COORDS.to_string()))?;
        let sqm = self
            .number(columns::SQM)?
            .ok_or_else(|| ValidationError::MissingAttribute(columns::SQM.to_string()))?;

        let source = self.text(columns::SOURCE).unwrap_or_else(|| DEFAULT_ROW_SOURCE.to_string());
        let code = self.text(columns::CODE).unwrap_or_else(|| format!("row-{}", index));

        let mut asset = Asset::new(AssetRole::Potential, location, sqm, source, code);
        asset.price = self.number(columns::PRICE)?;
        asset.portfolio = self.text(columns::PORTFOLIO).unwrap_or_default();
        asset.level = self.number(columns::LEVEL).ok().flatten().map(|l| l.round() as i32);
        asset.parking = self.flag(columns::PARKING);
        asset.construction_year = self
            .number(columns::CONSTRUCTION_YEAR)
            .ok()
            .flatten()
            .map(|y| y.round() as i32);
        asset.title = self.first_text(&columns::TITLE_ALIASES);
        asset.description = self.text(columns::DESCRIPTION);
        asset.address = self.text(columns::ADDRESS);
        asset.municipality = self.text(columns::MUNICIPALITY);
        asset.prefecture = self.text(columns::PREFECTURE);
        asset.subcategory = self.first_text(&columns::SUBCATEGORY_ALIASES);
        asset.url = self.text(columns::URL);

        asset.validate()?;
        Ok(asset)
    }

    /// Write the summary fields into the row. Missing values become null.
    pub fn apply_summary(&mut self, summary: &ComparisonSummary) {
        let own_price_meter = match (self.number(columns::PRICE), self.number(columns::SQM)) {
            (Ok(Some(price)), Ok(Some(sqm))) if sqm > 0.0 => Some(price / sqm),
            _ => None,
        };

        self.set(columns::PRICE_PER_SQM, own_price_meter);
        self.set(columns::COMPARISON_AVERAGE, summary.average);
        self.set(columns::COMPARISON_MIN, summary.min);
        self.set(columns::COMPARISON_MAX, summary.max);
        self.set(columns::COMPARISON_MEDIAN, summary.median);
        self.set(columns::COMPARISON_STD, summary.std);
        self.set(columns::COMPARISON_NORMALIZED_MEAN, summary.normalized_mean);
        self.set(columns::ASSETS_COUNT, summary.assets_count as u64);
        self.set(columns::REVALUATED_PRICE_METER, summary.revaluated_price_meter);
        self.set(columns::REVALUATION_TOTAL_PRICE, summary.revaluation_total_price);
        self.set(columns::MAX_BUY_PRICE, summary.max_buy_price);
        self.set(columns::SCORE, summary.score);
        self.set(columns::SEARCHED_RADIUS, summary.searched_radius);
        self.set(columns::COMPARISON_URL, summary.reference_url.clone());
        self.set(columns::VALUATION_STATUS, summary.status.as_str());
        self.set(columns::UNVALUED_REASON, Value::Null);
    }

    /// Mark a row that could not be valued at all.
    ///
    /// Every output column is reset, so nothing from an earlier run survives.
    /// `#assets` is null rather than 0 because no search completed.
    pub fn mark_unvalued(&mut self, reason: &str) {
        for column in columns::OUTPUT {
            self.set(column, Value::Null);
        }
        self.set(columns::VALUATION_STATUS, "unvalued");
        self.set(columns::UNVALUED_REASON, reason);
    }
}
