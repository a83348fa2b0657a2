//! Regression trees grown on variance reduction. Leaves predict the mean
//! target of their training rows.

use rand::Rng;
use rand_chacha::ChaCha8Rng;

use crate::class_tree::{accumulate_node_importances, candidate_features, partition, tree_depth};
use crate::node::{FeatureIndex, Node, NodeIndex};
use crate::params::{SplitStrategy, TreeParams};

const VARIANCE_EPS: f64 = 1e-12;

/// A single regression tree.
#[derive(Debug, Clone)]
pub struct RegressionTree {
    nodes: Vec<Node<f64>>,
    n_features: usize,
}

impl RegressionTree {
    /// Grow a tree on the rows named by `indices`.
    ///
    /// `columns` is column-major: `columns[feature_idx][sample_idx]`. Rows
    /// listed twice in `indices` count twice.
    pub(crate) fn fit(
        columns: &[Vec<f64>],
        targets: &[f64],
        indices: &[usize],
        params: &TreeParams,
        rng: &mut ChaCha8Rng,
    ) -> Self {
        let mut nodes = Vec::new();
        build_node(&mut nodes, columns, targets, indices, 0, params, rng);
        Self {
            nodes,
            n_features: columns.len(),
        }
    }

    /// Predict the target value for one row-major sample.
    #[must_use]
    pub fn predict_row(&self, row: &[f64]) -> f64 {
        let mut current = NodeIndex::new(0);
        loop {
            match &self.nodes[current.index()] {
                Node::Leaf(value) => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                    ..
                } => {
                    current = if row[feature.index()] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }

    /// Add this tree's normalized impurity-decrease importances into `out`.
    pub(crate) fn accumulate_importances(&self, out: &mut [f64]) {
        accumulate_node_importances(&self.nodes, out);
    }

    /// Return the number of nodes in the arena.
    #[must_use]
    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Return the maximum leaf depth (a single-leaf tree has depth 0).
    #[must_use]
    pub fn depth(&self) -> usize {
        tree_depth(&self.nodes)
    }

    /// Return the number of feature columns this tree was grown on.
    #[must_use]
    pub fn n_features(&self) -> usize {
        self.n_features
    }
}

fn build_node(
    nodes: &mut Vec<Node<f64>>,
    columns: &[Vec<f64>],
    targets: &[f64],
    indices: &[usize],
    depth: usize,
    params: &TreeParams,
    rng: &mut ChaCha8Rng,
) -> NodeIndex {
    let n_samples = indices.len();
    let (parent_n, parent_sum, parent_sum_sq) = target_moments(targets, indices);

    let mut must_stop = n_samples < params.min_samples_split
        || n_samples < 2 * params.min_samples_leaf
        || variance(parent_n, parent_sum, parent_sum_sq) < VARIANCE_EPS;
    if let Some(limit) = params.max_depth
        && depth >= limit
    {
        must_stop = true;
    }

    if must_stop {
        let index = NodeIndex::new(nodes.len());
        nodes.push(Node::Leaf(mean(parent_n, parent_sum)));
        return index;
    }

    let split = match params.strategy {
        SplitStrategy::Exact => best_exact_split(columns, targets, indices, params, rng),
        SplitStrategy::RandomThreshold => best_random_split(columns, targets, indices, params, rng),
    };
    let Some((feature, threshold, impurity_decrease)) = split else {
        let index = NodeIndex::new(nodes.len());
        nodes.push(Node::Leaf(mean(parent_n, parent_sum)));
        return index;
    };

    let (left_indices, right_indices) = partition(columns, indices, feature, threshold);

    // Placeholder leaf so children land after the parent in the arena.
    let index = NodeIndex::new(nodes.len());
    nodes.push(Node::Leaf(mean(parent_n, parent_sum)));

    let left = build_node(nodes, columns, targets, &left_indices, depth + 1, params, rng);
    let right = build_node(nodes, columns, targets, &right_indices, depth + 1, params, rng);

    nodes[index.index()] = Node::Split {
        feature,
        threshold,
        left,
        right,
        impurity_decrease,
    };
    index
}

/// Exhaustive scan: sort each candidate feature, sweep every distinct
/// boundary with incremental target moments.
fn best_exact_split(
    columns: &[Vec<f64>],
    targets: &[f64],
    indices: &[usize],
    params: &TreeParams,
    rng: &mut ChaCha8Rng,
) -> Option<(FeatureIndex, f64, f64)> {
    let n_samples = indices.len();
    let (parent_n, parent_sum, parent_sum_sq) = target_moments(targets, indices);
    let parent_variance = variance(parent_n, parent_sum, parent_sum_sq);

    let mut best_decrease = f64::NEG_INFINITY;
    let mut best = None;

    for &feat_idx in &candidate_features(columns.len(), params.max_features, rng) {
        let feat_col = &columns[feat_idx];

        let mut sorted: Vec<(f64, usize)> = indices.iter().map(|&si| (feat_col[si], si)).collect();
        sorted.sort_unstable_by(|a, b| a.0.total_cmp(&b.0));

        let mut left_n = 0.0;
        let mut left_sum = 0.0;
        let mut left_sum_sq = 0.0;

        for i in 0..(n_samples - 1) {
            let (val_i, si) = sorted[i];
            let y_i = targets[si];
            left_n += 1.0;
            left_sum += y_i;
            left_sum_sq += y_i * y_i;

            let val_next = sorted[i + 1].0;
            if val_i == val_next {
                continue;
            }

            let n_left = i + 1;
            let n_right = n_samples - n_left;
            if n_left < params.min_samples_leaf || n_right < params.min_samples_leaf {
                continue;
            }

            let right_n = parent_n - left_n;
            let right_sum = parent_sum - left_sum;
            let right_sum_sq = parent_sum_sq - left_sum_sq;

            let decrease = parent_n * parent_variance
                - left_n * variance(left_n, left_sum, left_sum_sq)
                - right_n * variance(right_n, right_sum, right_sum_sq);

            if decrease > best_decrease {
                best_decrease = decrease;
                let threshold = (val_i + val_next) / 2.0;
                best = Some((FeatureIndex::new(feat_idx), threshold, decrease));
            }
        }
    }

    best
}

/// Randomized scan: one uniform threshold per candidate feature, best
/// candidate by variance decrease.
fn best_random_split(
    columns: &[Vec<f64>],
    targets: &[f64],
    indices: &[usize],
    params: &TreeParams,
    rng: &mut ChaCha8Rng,
) -> Option<(FeatureIndex, f64, f64)> {
    let n_samples = indices.len();
    let (parent_n, parent_sum, parent_sum_sq) = target_moments(targets, indices);
    let parent_variance = variance(parent_n, parent_sum, parent_sum_sq);

    let mut best_decrease = f64::NEG_INFINITY;
    let mut best = None;

    for &feat_idx in &candidate_features(columns.len(), params.max_features, rng) {
        let feat_col = &columns[feat_idx];

        let mut lo = f64::INFINITY;
        let mut hi = f64::NEG_INFINITY;
        for &si in indices {
            lo = lo.min(feat_col[si]);
            hi = hi.max(feat_col[si]);
        }
        if lo == hi {
            continue;
        }
        let threshold = rng.gen_range(lo..hi);

        let mut left_n = 0.0;
        let mut left_sum = 0.0;
        let mut left_sum_sq = 0.0;
        let mut n_left = 0;
        for &si in indices {
            if feat_col[si] <= threshold {
                let y_i = targets[si];
                left_n += 1.0;
                left_sum += y_i;
                left_sum_sq += y_i * y_i;
                n_left += 1;
            }
        }
        let n_right = n_samples - n_left;
        if n_left < params.min_samples_leaf || n_right < params.min_samples_leaf {
            continue;
        }

        let right_n = parent_n - left_n;
        let right_sum = parent_sum - left_sum;
        let right_sum_sq = parent_sum_sq - left_sum_sq;

        let decrease = parent_n * parent_variance
            - left_n * variance(left_n, left_sum, left_sum_sq)
            - right_n * variance(right_n, right_sum, right_sum_sq);

        if decrease > best_decrease {
            best_decrease = decrease;
            best = Some((FeatureIndex::new(feat_idx), threshold, decrease));
        }
    }

    best
}

fn target_moments(targets: &[f64], indices: &[usize]) -> (f64, f64, f64) {
    let mut sum = 0.0;
    let mut sum_sq = 0.0;
    for &si in indices {
        let y = targets[si];
        sum += y;
        sum_sq += y * y;
    }
    (indices.len() as f64, sum, sum_sq)
}

/// Population variance from first and second moments, clamped at zero.
fn variance(n: f64, sum: f64, sum_sq: f64) -> f64 {
    if n <= 0.0 {
        return 0.0;
    }
    let mean = sum / n;
    (sum_sq / n - mean * mean).max(0.0)
}

fn mean(n: f64, sum: f64) -> f64 {
    if n <= 0.0 { 0.0 } else { sum / n }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::{RegressionTree, variance};
    use crate::params::{SplitStrategy, TreeParams};

    fn exact_params() -> TreeParams {
        TreeParams {
            strategy: SplitStrategy::Exact,
            max_features: 2,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
        }
    }

    /// Step function on the first feature; the second is constant noise.
    fn step_columns() -> (Vec<Vec<f64>>, Vec<f64>) {
        let columns = vec![
            vec![0.0, 1.0, 2.0, 10.0, 11.0, 12.0],
            vec![3.0, 3.0, 3.0, 3.0, 3.0, 3.0],
        ];
        let targets = vec![1.0, 1.0, 1.0, 5.0, 5.0, 5.0];
        (columns, targets)
    }

    // --- variance ---

    #[test]
    fn variance_of_range() {
        let values = [1.0, 2.0, 3.0, 4.0];
        let sum: f64 = values.iter().sum();
        let sum_sq: f64 = values.iter().map(|v| v * v).sum();
        assert!((variance(4.0, sum, sum_sq) - 1.25).abs() < 1e-10);
    }

    #[test]
    fn variance_of_constant_is_zero() {
        assert!(variance(3.0, 9.0, 27.0).abs() < 1e-10);
    }

    // --- tree growth ---

    #[test]
    fn step_function_splits_at_boundary() {
        let (columns, targets) = step_columns();
        let indices: Vec<usize> = (0..targets.len()).collect();
        let mut rng = ChaCha8Rng::seed_from_u64(1);

        let tree = RegressionTree::fit(&columns, &targets, &indices, &exact_params(), &mut rng);

        assert!((tree.predict_row(&[0.5, 3.0]) - 1.0).abs() < 1e-10);
        assert!((tree.predict_row(&[11.5, 3.0]) - 5.0).abs() < 1e-10);
    }

    #[test]
    fn constant_targets_stay_leaf() {
        let columns = vec![vec![0.0, 1.0, 2.0]];
        let targets = vec![4.0, 4.0, 4.0];
        let indices = vec![0, 1, 2];
        let mut rng = ChaCha8Rng::seed_from_u64(2);

        let tree = RegressionTree::fit(&columns, &targets, &indices, &exact_params(), &mut rng);

        assert_eq!(tree.n_nodes(), 1);
        assert!((tree.predict_row(&[9.0]) - 4.0).abs() < 1e-10);
    }

    #[test]
    fn min_samples_leaf_blocks_split() {
        let columns = vec![vec![0.0, 1.0, 2.0, 3.0]];
        let targets = vec![0.0, 0.0, 8.0, 8.0];
        let indices = vec![0, 1, 2, 3];
        let params = TreeParams {
            min_samples_leaf: 3,
            max_features: 1,
            ..exact_params()
        };
        let mut rng = ChaCha8Rng::seed_from_u64(3);

        let tree = RegressionTree::fit(&columns, &targets, &indices, &params, &mut rng);

        assert_eq!(tree.n_nodes(), 1);
        assert!((tree.predict_row(&[1.5]) - 4.0).abs() < 1e-10);
    }

    #[test]
    fn max_depth_limits_growth() {
        let (columns, targets) = step_columns();
        let indices: Vec<usize> = (0..targets.len()).collect();
        let params = TreeParams {
            max_depth: Some(1),
            ..exact_params()
        };
        let mut rng = ChaCha8Rng::seed_from_u64(4);

        let tree = RegressionTree::fit(&columns, &targets, &indices, &params, &mut rng);

        assert!(tree.depth() <= 1);
    }

    #[test]
    fn random_threshold_strategy_separates_step() {
        let (columns, targets) = step_columns();
        let indices: Vec<usize> = (0..targets.len()).collect();
        let params = TreeParams {
            strategy: SplitStrategy::RandomThreshold,
            ..exact_params()
        };
        let mut rng = ChaCha8Rng::seed_from_u64(5);

        let tree = RegressionTree::fit(&columns, &targets, &indices, &params, &mut rng);

        assert!(tree.predict_row(&[0.5, 3.0]) < 3.0);
        assert!(tree.predict_row(&[11.5, 3.0]) > 3.0);
    }

    #[test]
    fn duplicated_indices_weight_the_mean() {
        let columns = vec![vec![0.0, 0.0]];
        let targets = vec![1.0, 4.0];
        // Row 0 drawn twice, as in a bootstrap sample.
        let indices = vec![0, 0, 1];
        let params = TreeParams {
            max_features: 1,
            ..exact_params()
        };
        let mut rng = ChaCha8Rng::seed_from_u64(6);

        let tree = RegressionTree::fit(&columns, &targets, &indices, &params, &mut rng);

        assert!((tree.predict_row(&[0.0]) - 2.0).abs() < 1e-10);
    }

    #[test]
    fn importances_concentrate_on_informative_feature() {
        let (columns, targets) = step_columns();
        let indices: Vec<usize> = (0..targets.len()).collect();
        let mut rng = ChaCha8Rng::seed_from_u64(7);

        let tree = RegressionTree::fit(&columns, &targets, &indices, &exact_params(), &mut rng);

        let mut importances = vec![0.0; 2];
        tree.accumulate_importances(&mut importances);
        assert!(importances[0] > 0.9);
        assert!(importances[1] < 0.1);
    }
}
