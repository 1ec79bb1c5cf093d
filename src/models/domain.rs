use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::errors::ValidationError;

/// WGS84 coordinate pair
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Latitude within [-90, 90] and longitude within [-180, 180]
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lon)
    }

    /// Parse a `"lat,lon"` pair as found in the `coords` spreadsheet column
    pub fn parse_coords(raw: &str) -> Option<Self> {
        let (lat, lon) = raw.split_once(',')?;
        let lat = lat.trim().parse::<f64>().ok()?;
        let lon = lon.trim().parse::<f64>().ok()?;
        Some(Self { lat, lon })
    }
}

/// Classification of an asset record. Both roles share the same shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetRole {
    /// A candidate deal being evaluated for purchase
    Potential,
    /// A market listing used as pricing evidence
    #[default]
    Comparable,
}

impl AssetRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetRole::Potential => "potential",
            AssetRole::Comparable => "comparable",
        }
    }
}

/// Dedup key of an asset within ingestion, also the identity of its summary
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssetKey {
    pub source: String,
    #[serde(default)]
    pub portfolio: String,
    #[serde(rename = "code")]
    pub source_unique_code: String,
}

impl fmt::Display for AssetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.source, self.portfolio, self.source_unique_code)
    }
}

/// A real-estate unit, either a potential deal or a comparable listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    #[serde(default)]
    pub role: AssetRole,
    pub location: GeoPoint,
    pub sqm: f64,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub level: Option<i32>,
    #[serde(default)]
    pub parking: Option<bool>,
    #[serde(rename = "constructionYear", alias = "construction_year", default)]
    pub construction_year: Option<i32>,
    pub source: String,
    #[serde(default)]
    pub portfolio: String,
    #[serde(rename = "code", alias = "source_unique_code")]
    pub source_unique_code: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub municipality: Option<String>,
    #[serde(default)]
    pub prefecture: Option<String>,
    #[serde(default)]
    pub subcategory: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

impl Asset {
    /// Create an asset with only the mandatory attributes set
    pub fn new(
        role: AssetRole,
        location: GeoPoint,
        sqm: f64,
        source: impl Into<String>,
        source_unique_code: impl Into<String>,
    ) -> Self {
        Self {
            role,
            location,
            sqm,
            price: None,
            level: None,
            parking: None,
            construction_year: None,
            source: source.into(),
            portfolio: String::new(),
            source_unique_code: source_unique_code.into(),
            title: None,
            description: None,
            address: None,
            municipality: None,
            prefecture: None,
            subcategory: None,
            url: None,
        }
    }

    pub fn with_price(mut self, price: f64) -> Self {
        self.price = Some(price);
        self
    }

    pub fn with_portfolio(mut self, portfolio: impl Into<String>) -> Self {
        self.portfolio = portfolio.into();
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn key(&self) -> AssetKey {
        AssetKey {
            source: self.source.clone(),
            portfolio: self.portfolio.clone(),
            source_unique_code: self.source_unique_code.clone(),
        }
    }

    /// Price per square meter, if the asset carries a usable price
    #[inline]
    pub fn price_per_sqm(&self) -> Option<f64> {
        match self.price {
            Some(price) if self.sqm > 0.0 && price.is_finite() => {
                let value = price / self.sqm;
                value.is_finite().then_some(value)
            }
            _ => None,
        }
    }

    /// Check the location, area and price invariants
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.location.is_valid() {
            return Err(ValidationError::InvalidCoordinates {
                lat: self.location.lat,
                lon: self.location.lon,
            });
        }
        if !(self.sqm.is_finite() && self.sqm > 0.0) {
            return Err(ValidationError::NonPositiveSqm(self.sqm));
        }
        if let Some(price) = self.price {
            if !(price.is_finite() && price >= 0.0) {
                return Err(ValidationError::NegativePrice(price));
            }
        }
        Ok(())
    }
}

/// Inclusive square-meter window
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SqmRange {
    pub min: f64,
    pub max: f64,
}

impl SqmRange {
    /// `sqm ± tolerance`, with the lower bound clamped at zero
    pub fn around(sqm: f64, tolerance: f64) -> Self {
        Self {
            min: (sqm - tolerance).max(0.0),
            max: sqm + tolerance,
        }
    }

    #[inline]
    pub fn contains(&self, sqm: f64) -> bool {
        sqm >= self.min && sqm <= self.max
    }
}

/// Optional metadata filters applied on top of the spatial search
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AttributeFilters {
    #[serde(default)]
    pub role: AssetRole,
    /// Empty means any source
    #[serde(default)]
    pub sources: Vec<String>,
    /// Empty means any portfolio
    #[serde(default)]
    pub portfolios: Vec<String>,
    #[serde(default)]
    pub parking: Option<bool>,
    #[serde(rename = "minConstructionYear", alias = "min_construction_year", default)]
    pub min_construction_year: Option<i32>,
    /// Asset never returned as its own comparable
    #[serde(default)]
    pub exclude: Option<AssetKey>,
}

/// Geospatial bounding box
#[derive(Debug, Clone, Copy)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

/// Spatial + attribute query sent to a [`crate::core::GeoIndex`]
#[derive(Debug, Clone, PartialEq)]
pub struct ComparableQuery {
    pub center: GeoPoint,
    pub radius_m: f64,
    pub sqm_range: SqmRange,
    pub filters: AttributeFilters,
    /// Top-K bound on the result size
    pub limit: usize,
}

/// A comparable returned by the index, with its great-circle distance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparableMatch {
    pub asset: Asset,
    #[serde(rename = "distanceM")]
    pub distance_m: f64,
}

/// Price/sqm statistics over a set of comparables
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PriceStatistics {
    pub count: usize,
    pub average: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub median: Option<f64>,
    /// Population standard deviation
    pub std: Option<f64>,
    /// Mean after dropping values beyond the outlier bound
    pub normalized_mean: Option<f64>,
    pub outliers_excluded: usize,
}

/// Per-asset valuation parameters supplied by the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValuationParams {
    /// Initial search radius in meters
    #[serde(default = "default_location_tolerance")]
    pub location_tolerance: f64,
    /// Absolute sqm tolerance; the source default applies when absent
    #[serde(default)]
    pub sqm_tolerance: Option<f64>,
    #[serde(default)]
    pub filters: AttributeFilters,
}

impl Default for ValuationParams {
    fn default() -> Self {
        Self {
            location_tolerance: default_location_tolerance(),
            sqm_tolerance: None,
            filters: AttributeFilters::default(),
        }
    }
}

pub(crate) fn default_location_tolerance() -> f64 {
    100.0
}

/// Outcome class of a valuation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValuationStatus {
    /// At least the minimum evidence was found
    Valued,
    /// Some comparables, fewer than the minimum evidence
    SparseEvidence,
    /// No usable comparables after full expansion
    Unvalued,
}

impl ValuationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValuationStatus::Valued => "valued",
            ValuationStatus::SparseEvidence => "sparse_evidence",
            ValuationStatus::Unvalued => "unvalued",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "valued" => Some(ValuationStatus::Valued),
            "sparse_evidence" => Some(ValuationStatus::SparseEvidence),
            "unvalued" => Some(ValuationStatus::Unvalued),
            _ => None,
        }
    }
}

/// Derived valuation record for one potential asset.
///
/// Rebuilt from scratch on every run; carries no timestamps so that two runs
/// over unchanged inputs compare equal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonSummary {
    #[serde(rename = "assetKey")]
    pub asset_key: AssetKey,
    #[serde(rename = "assetsCount")]
    pub assets_count: usize,
    pub average: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub median: Option<f64>,
    pub std: Option<f64>,
    #[serde(rename = "normalizedMean")]
    pub normalized_mean: Option<f64>,
    #[serde(rename = "outliersExcluded")]
    pub outliers_excluded: usize,
    #[serde(rename = "revaluatedPriceMeter")]
    pub revaluated_price_meter: Option<f64>,
    #[serde(rename = "revaluationTotalPrice")]
    pub revaluation_total_price: Option<f64>,
    #[serde(rename = "maxBuyPrice")]
    pub max_buy_price: Option<f64>,
    pub score: Option<f64>,
    #[serde(rename = "searchedRadius")]
    pub searched_radius: f64,
    #[serde(rename = "expansionSteps")]
    pub expansion_steps: u32,
    #[serde(rename = "referenceUrl")]
    pub reference_url: Option<String>,
    #[serde(rename = "assetUrl")]
    pub asset_url: Option<String>,
    pub status: ValuationStatus,
}

impl ComparisonSummary {
    pub fn is_valued(&self) -> bool {
        self.revaluated_price_meter.is_some()
    }
}
