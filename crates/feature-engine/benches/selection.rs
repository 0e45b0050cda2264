//! Benchmarks for feature selection and transformation.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use feature_engine::{EngineeredFeatureSet, FeatureColumn, FeatureSelector, FeatureTransformer};

// Run with: cargo bench -p feature-engine

/// Deterministic pseudo-random matrix with some correlated columns
fn wide_set(features: usize, observations: usize) -> EngineeredFeatureSet {
    let mut state: u64 = 0x2545_f491_4f6c_dd1d;
    let mut next = move || {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        (state % 10_000) as f64 / 100.0
    };

    let mut set = EngineeredFeatureSet::new();
    for f in 0..features {
        let base: Vec<f64> = (0..observations).map(|_| next()).collect();
        let column = if f % 5 == 4 {
            FeatureColumn::Derived(base)
        } else if f % 5 == 3 {
            FeatureColumn::Temporal(base.iter().enumerate().map(|(i, v)| v + i as f64).collect())
        } else {
            FeatureColumn::Numerical(base)
        };
        set.insert(format!("f{:03}", f), column).unwrap();
    }
    set
}

fn benchmark_selection(c: &mut Criterion) {
    let mut group = c.benchmark_group("select");
    let selector = FeatureSelector::default();

    for features in [20, 50, 100].iter() {
        let set = wide_set(*features, 82);
        group.bench_with_input(BenchmarkId::new("features", features), &set, |b, set| {
            b.iter(|| selector.select(black_box(set)).unwrap());
        });
    }

    group.finish();
}

fn benchmark_transform(c: &mut Criterion) {
    let transformer = FeatureTransformer::default();
    let set = wide_set(50, 82);

    c.bench_function("transform_50x82", |b| {
        b.iter(|| transformer.transform(black_box(&set)).unwrap());
    });
}

criterion_group!(benches, benchmark_selection, benchmark_transform);
criterion_main!(benches);
