//! Criterion benchmarks for taiga-select: grid search, scoring, and voting.

use criterion::{Criterion, criterion_group, criterion_main};
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use taiga_forest::{ClassWeight, Family, Predictions, Targets};
use taiga_select::{EnsembleConfig, Metric, ParamGrid, tiebreaking_vote};

fn make_classification(
    n_samples: usize,
    n_features: usize,
    n_classes: usize,
    seed: u64,
) -> (Vec<Vec<f64>>, Targets) {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut features = Vec::with_capacity(n_samples);
    let mut labels = Vec::with_capacity(n_samples);
    for i in 0..n_samples {
        let class = i % n_classes;
        labels.push(class as i64);
        let row: Vec<f64> = (0..n_features)
            .map(|f| {
                let base = if f < 3 { class as f64 * 3.0 } else { 0.0 };
                base + rng.r#gen::<f64>() * 0.5
            })
            .collect();
        features.push(row);
    }
    (features, Targets::Labels(labels))
}

fn bench_grid_search(c: &mut Criterion) {
    let (features, targets) = make_classification(300, 10, 3, 42);
    let grid = ParamGrid {
        families: vec![Family::RandomForest],
        n_trees: vec![40, 60],
        min_samples_leaf: vec![1, 4],
        class_weights: vec![ClassWeight::Uniform],
        bootstrap: vec![true],
    };
    let config = EnsembleConfig::new("accuracy")
        .unwrap()
        .with_param_grid(grid)
        .with_outer_threads(4);

    c.bench_function("grid_search_4candidates_300x10", |b| {
        b.iter(|| config.fit(&features, &targets).unwrap());
    });
}

fn bench_metric_scoring(c: &mut Criterion) {
    let mut rng = ChaCha8Rng::seed_from_u64(11);
    let truth: Vec<i64> = (0..100_000).map(|_| rng.gen_range(0..8i64)).collect();
    let predicted: Vec<i64> = truth
        .iter()
        .map(|&label| if rng.r#gen::<f64>() < 0.9 { label } else { 0 })
        .collect();
    let truth = Targets::Labels(truth);
    let predicted = Predictions::Labels(predicted);
    let metric = Metric::parse("f1Macro").unwrap();

    c.bench_function("f1_macro_100k_8class", |b| {
        b.iter(|| metric.score(&truth, &predicted).unwrap());
    });
}

fn bench_tiebreaking_vote(c: &mut Criterion) {
    let mut rng = ChaCha8Rng::seed_from_u64(3);
    let members: Vec<Vec<i64>> = (0..5)
        .map(|_| (0..10_000).map(|_| rng.gen_range(0..4i64)).collect())
        .collect();
    let votes: Vec<&[i64]> = members.iter().map(Vec::as_slice).collect();
    let order = [0i64, 1, 2, 3];

    c.bench_function("tiebreaking_vote_5members_10k_rows", |b| {
        b.iter(|| tiebreaking_vote(&votes, &order).unwrap());
    });
}

criterion_group!(
    benches,
    bench_grid_search,
    bench_metric_scoring,
    bench_tiebreaking_vote
);
criterion_main!(benches);
