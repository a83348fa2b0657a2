//! Forest training with parallel tree construction, plus batch prediction
//! and out-of-bag estimation for the fitted ensembles.

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::iter::{IntoParallelIterator, ParallelIterator};
use tracing::{debug, info, instrument};

use crate::class_tree::{ClassificationTree, argmax};
use crate::error::ForestError;
use crate::params::{ClassWeight, ForestParams, TreeParams};
use crate::value_tree::RegressionTree;

/// A fitted classification forest.
///
/// Labels are the caller's original `i64` values; the dense class index used
/// internally is private to the forest.
#[derive(Debug, Clone)]
pub struct ClassificationForest {
    trees: Vec<ClassificationTree>,
    classes: Vec<i64>,
    n_features: usize,
    importances: Vec<f64>,
    oob: Option<Vec<i64>>,
}

/// A fitted regression forest.
#[derive(Debug, Clone)]
pub struct RegressionForest {
    trees: Vec<RegressionTree>,
    n_features: usize,
    importances: Vec<f64>,
    oob: Option<Vec<f64>>,
}

/// Check the feature matrix shape and contents, returning the column count.
pub(crate) fn validate_features(features: &[Vec<f64>]) -> Result<usize, ForestError> {
    if features.is_empty() {
        return Err(ForestError::EmptyDataset);
    }
    let n_features = features[0].len();
    if n_features == 0 {
        return Err(ForestError::ZeroFeatures);
    }
    for (sample_index, row) in features.iter().enumerate() {
        if row.len() != n_features {
            return Err(ForestError::FeatureCountMismatch {
                expected: n_features,
                got: row.len(),
                sample_index,
            });
        }
        for (feature_index, &val) in row.iter().enumerate() {
            if !val.is_finite() {
                return Err(ForestError::NonFiniteValue {
                    sample_index,
                    feature_index,
                });
            }
        }
    }
    Ok(n_features)
}

/// Run `op` inside a dedicated rayon pool of `threads` workers, or on the
/// ambient pool when no count is given.
pub(crate) fn run_in_pool<T, F>(threads: Option<usize>, op: F) -> Result<T, ForestError>
where
    T: Send,
    F: FnOnce() -> T + Send,
{
    match threads {
        Some(threads) => {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(threads)
                .build()
                .map_err(|source| ForestError::ThreadPool { source })?;
            Ok(pool.install(op))
        }
        None => Ok(op()),
    }
}

/// Generate a bootstrap sample of `n_samples` draws and the out-of-bag rows.
fn bootstrap_sample(n_samples: usize, rng: &mut impl Rng) -> (Vec<usize>, Vec<usize>) {
    let mut in_bag = vec![false; n_samples];
    let mut bootstrap_indices = Vec::with_capacity(n_samples);
    for _ in 0..n_samples {
        let idx = rng.gen_range(0..n_samples);
        bootstrap_indices.push(idx);
        in_bag[idx] = true;
    }
    let oob_indices: Vec<usize> = (0..n_samples).filter(|&i| !in_bag[i]).collect();
    (bootstrap_indices, oob_indices)
}

fn to_columns(features: &[Vec<f64>], n_features: usize) -> Vec<Vec<f64>> {
    let mut columns: Vec<Vec<f64>> = (0..n_features)
        .map(|_| Vec::with_capacity(features.len()))
        .collect();
    for row in features {
        for (column, &val) in columns.iter_mut().zip(row) {
            column.push(val);
        }
    }
    columns
}

/// Per-sample weights for the configured class weighting.
///
/// Balanced weighting gives class `c` the weight `n / (k * count_c)`, so
/// every class contributes equal total weight.
fn sample_weights(class_weight: ClassWeight, dense_labels: &[usize], n_classes: usize) -> Vec<f64> {
    match class_weight {
        ClassWeight::Uniform => vec![1.0; dense_labels.len()],
        ClassWeight::Balanced => {
            let mut counts = vec![0usize; n_classes];
            for &label in dense_labels {
                counts[label] += 1;
            }
            let n = dense_labels.len() as f64;
            let k = n_classes as f64;
            let per_class: Vec<f64> = counts.iter().map(|&c| n / (k * c as f64)).collect();
            dense_labels.iter().map(|&label| per_class[label]).collect()
        }
    }
}

fn aggregate_importances<T>(trees: &[T], n_features: usize, accumulate: impl Fn(&T, &mut [f64])) -> Vec<f64> {
    let mut importances = vec![0.0; n_features];
    for tree in trees {
        accumulate(tree, &mut importances);
    }
    let total: f64 = importances.iter().sum();
    if total > 0.0 {
        for v in &mut importances {
            *v /= total;
        }
    }
    importances
}

/// Grow a classification forest.
///
/// Inputs are pre-validated by the caller; this can still fail on OOB
/// coverage or thread-pool construction.
#[instrument(skip_all, fields(n_trees = params.n_trees, n_samples = features.len()))]
pub(crate) fn grow_classification(
    features: &[Vec<f64>],
    labels: &[i64],
    params: &ForestParams,
    tree_params: TreeParams,
    oob: bool,
    threads: Option<usize>,
) -> Result<ClassificationForest, ForestError> {
    let n_samples = features.len();
    let n_features = features[0].len();

    // --- Label index ---
    let mut classes: Vec<i64> = labels.to_vec();
    classes.sort_unstable();
    classes.dedup();
    let n_classes = classes.len();
    let dense_labels: Vec<usize> = labels
        .iter()
        .map(|label| {
            classes
                .binary_search(label)
                .unwrap_or_else(|_| unreachable!("label index covers every training label"))
        })
        .collect();
    let weights = sample_weights(params.class_weight, &dense_labels, n_classes);

    info!(
        n_trees = params.n_trees,
        n_samples,
        n_features,
        n_classes,
        max_features = tree_params.max_features,
        bootstrap = params.bootstrap,
        "growing classification forest"
    );

    let columns = to_columns(features, n_features);

    // Per-tree seeds from the master RNG.
    let mut master_rng = ChaCha8Rng::seed_from_u64(params.seed);
    let tree_seeds: Vec<u64> = (0..params.n_trees).map(|_| master_rng.r#gen()).collect();

    let bootstrap = params.bootstrap;
    let grown: Vec<(ClassificationTree, Vec<usize>)> = run_in_pool(threads, || {
        tree_seeds
            .into_par_iter()
            .map(|seed| {
                let mut rng = ChaCha8Rng::seed_from_u64(seed);
                let (indices, oob_indices) = if bootstrap {
                    bootstrap_sample(n_samples, &mut rng)
                } else {
                    ((0..n_samples).collect(), Vec::new())
                };
                let tree = ClassificationTree::fit(
                    &columns,
                    &dense_labels,
                    &weights,
                    n_classes,
                    &indices,
                    &tree_params,
                    &mut rng,
                );
                (tree, oob_indices)
            })
            .collect()
    })?;

    let mut trees = Vec::with_capacity(params.n_trees);
    let mut oob_sets = Vec::with_capacity(params.n_trees);
    for (tree, oob_indices) in grown {
        trees.push(tree);
        oob_sets.push(oob_indices);
    }
    debug!(n_trees_grown = trees.len(), "tree growth complete");

    let importances = aggregate_importances(&trees, n_features, |tree, out| {
        tree.accumulate_importances(out);
    });

    let oob = if oob {
        Some(classification_oob(&trees, &oob_sets, features, &classes)?)
    } else {
        None
    };

    info!(
        oob_rows = oob.as_ref().map(Vec::len),
        "classification forest complete"
    );

    Ok(ClassificationForest {
        trees,
        classes,
        n_features,
        importances,
        oob,
    })
}

/// Grow a regression forest.
#[instrument(skip_all, fields(n_trees = params.n_trees, n_samples = features.len()))]
pub(crate) fn grow_regression(
    features: &[Vec<f64>],
    targets: &[f64],
    params: &ForestParams,
    tree_params: TreeParams,
    oob: bool,
    threads: Option<usize>,
) -> Result<RegressionForest, ForestError> {
    let n_samples = features.len();
    let n_features = features[0].len();

    info!(
        n_trees = params.n_trees,
        n_samples,
        n_features,
        max_features = tree_params.max_features,
        bootstrap = params.bootstrap,
        "growing regression forest"
    );

    let columns = to_columns(features, n_features);

    let mut master_rng = ChaCha8Rng::seed_from_u64(params.seed);
    let tree_seeds: Vec<u64> = (0..params.n_trees).map(|_| master_rng.r#gen()).collect();

    let bootstrap = params.bootstrap;
    let grown: Vec<(RegressionTree, Vec<usize>)> = run_in_pool(threads, || {
        tree_seeds
            .into_par_iter()
            .map(|seed| {
                let mut rng = ChaCha8Rng::seed_from_u64(seed);
                let (indices, oob_indices) = if bootstrap {
                    bootstrap_sample(n_samples, &mut rng)
                } else {
                    ((0..n_samples).collect(), Vec::new())
                };
                let tree = RegressionTree::fit(&columns, targets, &indices, &tree_params, &mut rng);
                (tree, oob_indices)
            })
            .collect()
    })?;

    let mut trees = Vec::with_capacity(params.n_trees);
    let mut oob_sets = Vec::with_capacity(params.n_trees);
    for (tree, oob_indices) in grown {
        trees.push(tree);
        oob_sets.push(oob_indices);
    }
    debug!(n_trees_grown = trees.len(), "tree growth complete");

    let importances = aggregate_importances(&trees, n_features, |tree, out| {
        tree.accumulate_importances(out);
    });

    let oob = if oob {
        Some(regression_oob(&trees, &oob_sets, features)?)
    } else {
        None
    };

    info!(
        oob_rows = oob.as_ref().map(Vec::len),
        "regression forest complete"
    );

    Ok(RegressionForest {
        trees,
        n_features,
        importances,
        oob,
    })
}

/// Out-of-bag label per training row: each row is scored only by trees that
/// never drew it, summing leaf distributions and taking the argmax class.
fn classification_oob(
    trees: &[ClassificationTree],
    oob_sets: &[Vec<usize>],
    features: &[Vec<f64>],
    classes: &[i64],
) -> Result<Vec<i64>, ForestError> {
    let n_samples = features.len();
    let mut scores = vec![vec![0.0; classes.len()]; n_samples];
    let mut seen = vec![false; n_samples];

    for (tree, oob_rows) in trees.iter().zip(oob_sets) {
        for &row in oob_rows {
            seen[row] = true;
            let dist = tree.distribution(&features[row]);
            for (score, d) in scores[row].iter_mut().zip(dist) {
                *score += d;
            }
        }
    }

    let uncovered = seen.iter().filter(|&&covered| !covered).count();
    if uncovered > 0 {
        return Err(ForestError::OobCoverage {
            uncovered,
            n_samples,
        });
    }

    Ok(scores.iter().map(|row| classes[argmax(row)]).collect())
}

/// Out-of-bag value per training row: mean prediction of covering trees.
fn regression_oob(
    trees: &[RegressionTree],
    oob_sets: &[Vec<usize>],
    features: &[Vec<f64>],
) -> Result<Vec<f64>, ForestError> {
    let n_samples = features.len();
    let mut sums = vec![0.0; n_samples];
    let mut counts = vec![0usize; n_samples];

    for (tree, oob_rows) in trees.iter().zip(oob_sets) {
        for &row in oob_rows {
            sums[row] += tree.predict_row(&features[row]);
            counts[row] += 1;
        }
    }

    let uncovered = counts.iter().filter(|&&c| c == 0).count();
    if uncovered > 0 {
        return Err(ForestError::OobCoverage {
            uncovered,
            n_samples,
        });
    }

    Ok(sums
        .iter()
        .zip(&counts)
        .map(|(&sum, &count)| sum / count as f64)
        .collect())
}

impl ClassificationForest {
    /// Predict a label for each row by argmax over the averaged tree
    /// distributions.
    pub fn predict(&self, features: &[Vec<f64>]) -> Result<Vec<i64>, ForestError> {
        let proba = self.predict_proba(features)?;
        Ok(proba.iter().map(|row| self.classes[argmax(row)]).collect())
    }

    /// Per-row class probabilities, averaged over all trees.
    ///
    /// Columns follow [`Self::classes`] order.
    pub fn predict_proba(&self, features: &[Vec<f64>]) -> Result<Vec<Vec<f64>>, ForestError> {
        features
            .into_par_iter()
            .map(|row| self.proba_row(row))
            .collect()
    }

    fn proba_row(&self, row: &[f64]) -> Result<Vec<f64>, ForestError> {
        if row.len() != self.n_features {
            return Err(ForestError::PredictionFeatureMismatch {
                expected: self.n_features,
                got: row.len(),
            });
        }
        let mut proba = vec![0.0; self.classes.len()];
        for tree in &self.trees {
            for (p, d) in proba.iter_mut().zip(tree.distribution(row)) {
                *p += d;
            }
        }
        let n_trees = self.trees.len() as f64;
        for p in &mut proba {
            *p /= n_trees;
        }
        Ok(proba)
    }

    /// Distinct training labels in ascending order.
    #[must_use]
    pub fn classes(&self) -> &[i64] {
        &self.classes
    }

    /// Out-of-bag label per training row.
    pub fn oob_predictions(&self) -> Result<&[i64], ForestError> {
        self.oob.as_deref().ok_or(ForestError::OobNotEnabled)
    }

    /// Impurity-decrease feature importances, normalized to sum to one.
    #[must_use]
    pub fn feature_importances(&self) -> &[f64] {
        &self.importances
    }

    /// Number of trees in the ensemble.
    #[must_use]
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Number of feature columns the forest was trained on.
    #[must_use]
    pub fn n_features(&self) -> usize {
        self.n_features
    }
}

impl RegressionForest {
    /// Predict a value for each row as the mean over all trees.
    pub fn predict(&self, features: &[Vec<f64>]) -> Result<Vec<f64>, ForestError> {
        features
            .into_par_iter()
            .map(|row| self.predict_row(row))
            .collect()
    }

    fn predict_row(&self, row: &[f64]) -> Result<f64, ForestError> {
        if row.len() != self.n_features {
            return Err(ForestError::PredictionFeatureMismatch {
                expected: self.n_features,
                got: row.len(),
            });
        }
        let sum: f64 = self.trees.iter().map(|tree| tree.predict_row(row)).sum();
        Ok(sum / self.trees.len() as f64)
    }

    /// Out-of-bag value per training row.
    pub fn oob_predictions(&self) -> Result<&[f64], ForestError> {
        self.oob.as_deref().ok_or(ForestError::OobNotEnabled)
    }

    /// Impurity-decrease feature importances, normalized to sum to one.
    #[must_use]
    pub fn feature_importances(&self) -> &[f64] {
        &self.importances
    }

    /// Number of trees in the ensemble.
    #[must_use]
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Number of feature columns the forest was trained on.
    #[must_use]
    pub fn n_features(&self) -> usize {
        self.n_features
    }
}
