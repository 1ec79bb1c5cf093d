// Unit tests for Reval Engine

use reval_engine::core::{
    calculate_score,
    distance::{calculate_bounding_box, haversine_distance, is_within_bounding_box},
    filters::{skip_reason, RowMarkers, SkipReason},
    revalue, BatchConfig, ExpansionPolicy, StatisticsAggregator,
};
use reval_engine::models::row::columns;
use reval_engine::models::{Asset, AssetRole, AssetRow, GeoPoint, SqmRange};

#[test]
fn test_haversine_distance_zero() {
    let point = GeoPoint::new(37.9838, 23.7275);
    assert!(haversine_distance(&point, &point) < 0.01);
}

#[test]
fn test_haversine_distance_athens_to_piraeus() {
    // Syntagma to Piraeus port is roughly 8-9 km
    let syntagma = GeoPoint::new(37.9755, 23.7348);
    let piraeus = GeoPoint::new(37.9420, 23.6465);

    let distance = haversine_distance(&syntagma, &piraeus);
    assert!(distance > 7_000.0 && distance < 10_000.0, "got {}", distance);
}

#[test]
fn test_haversine_symmetric() {
    let a = GeoPoint::new(40.6401, 22.9444);
    let b = GeoPoint::new(37.9838, 23.7275);
    assert!((haversine_distance(&a, &b) - haversine_distance(&b, &a)).abs() < 1e-6);
}

#[test]
fn test_bounding_box_contains_center_and_neighbours() {
    let center = GeoPoint::new(37.9838, 23.7275);
    let bbox = calculate_bounding_box(&center, 5_000.0);

    assert!(is_within_bounding_box(&center, &bbox));
    assert!(is_within_bounding_box(&GeoPoint::new(38.0, 23.75), &bbox));
    assert!(!is_within_bounding_box(&GeoPoint::new(38.1, 23.7275), &bbox));
}

#[test]
fn test_sqm_range_inclusive_bounds() {
    let range = SqmRange::around(80.0, 10.0);
    assert!(range.contains(70.0));
    assert!(range.contains(90.0));
    assert!(!range.contains(69.9));
    assert!(!range.contains(90.1));
}

#[test]
fn test_std_of_empty_and_single_sets() {
    let aggregator = StatisticsAggregator::default();

    assert_eq!(aggregator.summarize(&[]).std, None);
    assert_eq!(aggregator.summarize(&[2_100.0]).std, Some(0.0));
}

#[test]
fn test_normalized_mean_bounded_by_min_max() {
    let aggregator = StatisticsAggregator::default();
    let sets: Vec<Vec<f64>> = vec![
        vec![1_500.0, 1_600.0, 1_700.0],
        vec![900.0, 2_000.0, 2_050.0, 2_100.0, 9_000.0],
        vec![1_000.0, 1_000.0],
        (0..50).map(|i| 1_000.0 + (i * i) as f64).collect(),
    ];

    for values in sets {
        let stats = aggregator.summarize(&values);
        let normalized = stats.normalized_mean.unwrap();
        assert!(normalized >= stats.min.unwrap(), "{:?}", values);
        assert!(normalized <= stats.max.unwrap(), "{:?}", values);
    }
}

#[test]
fn test_score_sign_follows_ask_price() {
    assert!(calculate_score(Some(200_000.0), Some(150_000.0)).unwrap() > 0.0);
    assert!(calculate_score(Some(200_000.0), Some(250_000.0)).unwrap() < 0.0);
    assert_eq!(calculate_score(Some(200_000.0), None), None);
}

#[test]
fn test_revalue_with_custom_margin() {
    let revaluation = revalue(Some(2_000.0), 100.0, Some(150_000.0), 0.5);

    assert_eq!(revaluation.revaluation_total_price, Some(200_000.0));
    assert_eq!(revaluation.max_buy_price, Some(100_000.0));
    assert_eq!(revaluation.score, Some(0.25));
}

#[test]
fn test_next_radius_never_exceeds_ceiling() {
    let policy = ExpansionPolicy::default();
    let mut radius = 100.0;

    for step in 1..=policy.max_steps {
        let next = policy.next_radius(radius, step);
        assert!(next > radius);
        assert!(next <= policy.max_radius_m);
        radius = next;
    }
    assert_eq!(radius, policy.max_radius_m);
}

#[test]
fn test_tolerance_validation() {
    let policy = ExpansionPolicy::default();

    assert!(policy.validate_tolerance(100.0).is_ok());
    assert!(policy.validate_tolerance(5_000.0).is_ok());
    assert!(policy.validate_tolerance(5_001.0).is_err());
    assert!(policy.validate_tolerance(0.0).is_err());
    assert!(policy.validate_tolerance(f64::NAN).is_err());
}

#[test]
fn test_skip_predicates_only_apply_when_enabled() {
    let row = AssetRow::new()
        .with(columns::SQM, 12)
        .with(columns::COORDS, "37.98,23.72")
        .with(columns::TITLE, "Πώληση 33% διαμερίσματος")
        .with(columns::SUBCATEGORY, "Οικόπεδο")
        .with(columns::COMPARISON_AVERAGE, 1_800.0);

    assert_eq!(skip_reason(&row, &BatchConfig::default(), &RowMarkers::default()), None);

    let residential_only = BatchConfig {
        skip_if_not_residential: true,
        ..Default::default()
    };
    assert_eq!(
        skip_reason(&row, &residential_only, &RowMarkers::default()),
        Some(SkipReason::NotResidential)
    );
}

#[test]
fn test_custom_markers() {
    let markers = RowMarkers {
        sold_markers: vec!["SOLD".to_string()],
        residential_markers: vec!["Flat".to_string()],
    };
    let config = BatchConfig {
        skip_if_has_percent_marker: true,
        skip_if_not_residential: true,
        ..Default::default()
    };

    let sold = AssetRow::new().with(columns::DESCRIPTION, "SOLD last week");
    assert_eq!(skip_reason(&sold, &config, &markers), Some(SkipReason::SoldMarker));

    let percent = AssetRow::new()
        .with(columns::TITLE, "50% share")
        .with(columns::SUBCATEGORY, "Flat");
    assert_eq!(skip_reason(&percent, &config, &markers), None);
}

#[test]
fn test_asset_key_display() {
    let asset = Asset::new(AssetRole::Potential, GeoPoint::new(37.98, 23.72), 80.0, "auction", "A-17")
        .with_portfolio("Orion");
    assert_eq!(asset.key().to_string(), "auction/Orion/A-17");
}
