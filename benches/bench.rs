// Criterion benchmarks for Reval Engine

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use reval_engine::core::{
    distance::{calculate_bounding_box, haversine_distance},
    EngineSettings, StatisticsAggregator, ValuationEngine,
};
use reval_engine::models::{Asset, AssetRole, GeoPoint, ValuationParams};
use reval_engine::services::InMemoryGeoIndex;
use std::sync::Arc;

const CENTER: GeoPoint = GeoPoint {
    lat: 37.9838,
    lon: 23.7275,
};

fn create_comparable(id: usize) -> Asset {
    let lat_offset = ((id as f64 * 0.0007) % 0.04) - 0.02;
    let lon_offset = ((id as f64 * 0.0011) % 0.04) - 0.02;
    Asset::new(
        AssetRole::Comparable,
        GeoPoint::new(CENTER.lat + lat_offset, CENTER.lon + lon_offset),
        60.0 + (id % 40) as f64,
        "market",
        id.to_string(),
    )
    .with_price(90_000.0 + (id % 50) as f64 * 1_500.0)
}

fn bench_haversine_distance(c: &mut Criterion) {
    let other = GeoPoint::new(37.9755, 23.7348);
    c.bench_function("haversine_distance", |b| {
        b.iter(|| haversine_distance(black_box(&CENTER), black_box(&other)));
    });
}

fn bench_bounding_box(c: &mut Criterion) {
    c.bench_function("bounding_box_calculation", |b| {
        b.iter(|| calculate_bounding_box(black_box(&CENTER), black_box(5_000.0)));
    });
}

fn bench_statistics(c: &mut Criterion) {
    let aggregator = StatisticsAggregator::default();
    let mut group = c.benchmark_group("statistics");

    for count in [10, 100, 1000].iter() {
        let values: Vec<f64> = (0..*count).map(|i| 1_200.0 + (i * 37 % 900) as f64).collect();
        group.bench_with_input(BenchmarkId::new("summarize", count), count, |b, _| {
            b.iter(|| aggregator.summarize(black_box(&values)));
        });
    }

    group.finish();
}

fn bench_valuation(c: &mut Criterion) {
    let mut group = c.benchmark_group("valuation");

    for inventory in [100, 1_000, 10_000].iter() {
        let index = InMemoryGeoIndex::from_assets((0..*inventory).map(create_comparable).collect());
        let engine = ValuationEngine::new(Arc::new(index), EngineSettings::default())
            .expect("default settings are valid");
        let target = Asset::new(AssetRole::Potential, CENTER, 80.0, "auction", "TARGET").with_price(120_000.0);
        let params = ValuationParams::default();

        group.bench_with_input(BenchmarkId::new("value", inventory), inventory, |b, _| {
            b.iter(|| tokio_test::block_on(engine.value(black_box(&target), black_box(&params))));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_haversine_distance,
    bench_bounding_box,
    bench_statistics,
    bench_valuation
);

criterion_main!(benches);
