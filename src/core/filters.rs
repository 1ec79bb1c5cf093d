use serde::{Deserialize, Serialize};

use crate::core::batch::BatchConfig;
use crate::models::row::{columns, AssetRow};
use crate::models::{Asset, AttributeFilters};

/// Text markers used by the row skip predicates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowMarkers {
    /// Substrings in a title or description that mark an asset as sold or partial
    pub sold_markers: Vec<String>,
    /// Subcategory substrings that identify a residential unit
    pub residential_markers: Vec<String>,
}

impl Default for RowMarkers {
    fn default() -> Self {
        Self {
            sold_markers: vec!["%".to_string()],
            residential_markers: [
                "Διαμέρισμα",
                "Μεζονέτα",
                "Μονοκατοικία",
                "Apartment",
                "Maisonette",
                "Detached house",
            ]
            .iter()
            .map(|m| m.to_string())
            .collect(),
        }
    }
}

/// Why a row was passed through without valuation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SkipReason {
    MissingColumns { columns: Vec<String> },
    BelowSqmFloor,
    HasComparison,
    SoldMarker,
    NotResidential,
}

/// Must-columns that are absent, null or blank
pub fn missing_columns(row: &AssetRow, must_columns: &[String]) -> Vec<String> {
    must_columns
        .iter()
        .filter(|column| !row.has_value(column))
        .cloned()
        .collect()
}

/// Only trips when the row carries a readable sqm
#[inline]
pub fn is_below_sqm_floor(row: &AssetRow, skip_sqm_lt: f64) -> bool {
    matches!(row.number(columns::SQM), Ok(Some(sqm)) if sqm < skip_sqm_lt)
}

pub fn has_sold_marker(row: &AssetRow, markers: &RowMarkers) -> bool {
    [columns::TITLE, columns::TITLE_GR, columns::DESCRIPTION]
        .iter()
        .filter_map(|column| row.text(column))
        .any(|text| markers.sold_markers.iter().any(|m| text.contains(m.as_str())))
}

/// `None` when the row has no subcategory to judge by
pub fn is_residential(row: &AssetRow, markers: &RowMarkers) -> Option<bool> {
    let subcategory = row.first_text(&columns::SUBCATEGORY_ALIASES)?;
    Some(
        markers
            .residential_markers
            .iter()
            .any(|m| subcategory.contains(m.as_str())),
    )
}

/// First skip predicate the row trips, in evaluation order
pub fn skip_reason(row: &AssetRow, config: &BatchConfig, markers: &RowMarkers) -> Option<SkipReason> {
    let missing = missing_columns(row, &config.must_columns);
    if !missing.is_empty() {
        return Some(SkipReason::MissingColumns { columns: missing });
    }

    if let Some(floor) = config.skip_sqm_lt {
        if is_below_sqm_floor(row, floor) {
            return Some(SkipReason::BelowSqmFloor);
        }
    }

    if config.skip_if_has_comparison && row.has_comparison() {
        return Some(SkipReason::HasComparison);
    }

    if config.skip_if_has_percent_marker && has_sold_marker(row, markers) {
        return Some(SkipReason::SoldMarker);
    }

    if config.skip_if_not_residential && is_residential(row, markers) == Some(false) {
        return Some(SkipReason::NotResidential);
    }

    None
}

/// Check an asset against the attribute filters of a comparable query.
/// Location and sqm are checked by the index itself.
#[inline]
pub fn matches_filters(asset: &Asset, filters: &AttributeFilters) -> bool {
    if asset.role != filters.role {
        return false;
    }

    if !filters.sources.is_empty() && !filters.sources.contains(&asset.source) {
        return false;
    }

    if !filters.portfolios.is_empty() && !filters.portfolios.contains(&asset.portfolio) {
        return false;
    }

    if let Some(parking) = filters.parking {
        if asset.parking != Some(parking) {
            return false;
        }
    }

    if let Some(min_year) = filters.min_construction_year {
        match asset.construction_year {
            Some(year) if year >= min_year => {}
            _ => return false,
        }
    }

    if let Some(exclude) = &filters.exclude {
        if asset.source == exclude.source
            && asset.portfolio == exclude.portfolio
            && asset.source_unique_code == exclude.source_unique_code
        {
            return false;
        }
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AssetRole, GeoPoint};

    fn row() -> AssetRow {
        AssetRow::new()
            .with(columns::SQM, 80)
            .with(columns::COORDS, "37.9838,23.7275")
            .with(columns::TITLE, "Διαμέρισμα 80 τ.μ. Κολωνάκι")
            .with(columns::SUBCATEGORY, "Διαμέρισμα")
    }

    fn config() -> BatchConfig {
        BatchConfig {
            skip_sqm_lt: Some(20.0),
            skip_if_has_comparison: true,
            skip_if_has_percent_marker: true,
            skip_if_not_residential: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_clean_row_is_not_skipped() {
        assert_eq!(skip_reason(&row(), &config(), &RowMarkers::default()), None);
    }

    #[test]
    fn test_missing_must_columns() {
        let config = BatchConfig {
            must_columns: vec!["price".to_string(), "sqm".to_string(), "code".to_string()],
            ..config()
        };
        let row = row().with(columns::CODE, "  ");

        assert_eq!(
            skip_reason(&row, &config, &RowMarkers::default()),
            Some(SkipReason::MissingColumns {
                columns: vec!["price".to_string(), "code".to_string()]
            })
        );
    }

    #[test]
    fn test_sqm_floor() {
        let small = row().with(columns::SQM, 15);
        assert_eq!(
            skip_reason(&small, &config(), &RowMarkers::default()),
            Some(SkipReason::BelowSqmFloor)
        );

        // Exactly at the floor is kept
        let at_floor = row().with(columns::SQM, 20);
        assert_eq!(skip_reason(&at_floor, &config(), &RowMarkers::default()), None);
    }

    #[test]
    fn test_existing_comparison() {
        let done = row().with(columns::COMPARISON_AVERAGE, 1650.0);
        assert_eq!(
            skip_reason(&done, &config(), &RowMarkers::default()),
            Some(SkipReason::HasComparison)
        );

        let null_comparison = row().with(columns::COMPARISON_AVERAGE, serde_json::Value::Null);
        assert_eq!(skip_reason(&null_comparison, &config(), &RowMarkers::default()), None);
    }

    #[test]
    fn test_sold_marker() {
        let partial = row().with(columns::TITLE, "Ποσοστό 50% εξ αδιαιρέτου");
        assert_eq!(
            skip_reason(&partial, &config(), &RowMarkers::default()),
            Some(SkipReason::SoldMarker)
        );

        let disabled = BatchConfig {
            skip_if_has_percent_marker: false,
            ..config()
        };
        assert_eq!(skip_reason(&partial, &disabled, &RowMarkers::default()), None);
    }

    #[test]
    fn test_not_residential() {
        let shop = row().with(columns::SUBCATEGORY, "Κατάστημα");
        assert_eq!(
            skip_reason(&shop, &config(), &RowMarkers::default()),
            Some(SkipReason::NotResidential)
        );

        // No subcategory column, nothing to judge by
        let mut unknown = AssetRow::new().with(columns::SQM, 80);
        unknown.set(columns::COORDS, "37.9,23.7");
        assert_eq!(is_residential(&unknown, &RowMarkers::default()), None);
        assert_eq!(skip_reason(&unknown, &config(), &RowMarkers::default()), None);
    }

    #[test]
    fn test_greek_sheet_headers() {
        let partial = AssetRow::new()
            .with(columns::SQM, 80)
            .with(columns::COORDS, "37.9838,23.7275")
            .with(columns::TITLE_GR, "Ποσοστό 50% εξ αδιαιρέτου")
            .with(columns::SUBCATEGORY_GR, "Διαμέρισμα");
        assert_eq!(
            skip_reason(&partial, &config(), &RowMarkers::default()),
            Some(SkipReason::SoldMarker)
        );

        let shop = AssetRow::new()
            .with(columns::SQM, 80)
            .with(columns::COORDS, "37.9838,23.7275")
            .with(columns::TITLE_GR, "Κατάστημα 80 τ.μ.")
            .with(columns::SUBCATEGORY_GR, "Κατάστημα");
        assert_eq!(is_residential(&shop, &RowMarkers::default()), Some(false));
        assert_eq!(
            skip_reason(&shop, &config(), &RowMarkers::default()),
            Some(SkipReason::NotResidential)
        );
    }

    #[test]
    fn test_predicate_order() {
        // Trips every predicate; the first one wins
        let row = AssetRow::new()
            .with(columns::SQM, 5)
            .with(columns::COMPARISON_AVERAGE, 1000)
            .with(columns::TITLE, "10%")
            .with(columns::SUBCATEGORY, "Γραφείο");

        assert_eq!(
            skip_reason(&row, &config(), &RowMarkers::default()),
            Some(SkipReason::BelowSqmFloor)
        );
    }

    #[test]
    fn test_matches_filters() {
        let asset = Asset::new(AssetRole::Comparable, GeoPoint::new(37.98, 23.72), 80.0, "market", "C1")
            .with_portfolio("Orion");

        assert!(matches_filters(&asset, &AttributeFilters::default()));

        let other_source = AttributeFilters {
            sources: vec!["auction".to_string()],
            ..Default::default()
        };
        assert!(!matches_filters(&asset, &other_source));

        let potentials = AttributeFilters {
            role: AssetRole::Potential,
            ..Default::default()
        };
        assert!(!matches_filters(&asset, &potentials));

        let needs_year = AttributeFilters {
            min_construction_year: Some(2000),
            ..Default::default()
        };
        assert!(!matches_filters(&asset, &needs_year));

        let excluding_self = AttributeFilters {
            exclude: Some(asset.key()),
            ..Default::default()
        };
        assert!(!matches_filters(&asset, &excluding_self));
    }
}
