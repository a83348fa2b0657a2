//! Classification trees over dense class indices, grown on class-weighted
//! Gini impurity.

use rand::Rng;
use rand_chacha::ChaCha8Rng;

use crate::node::{FeatureIndex, Node, NodeIndex};
use crate::params::{SplitStrategy, TreeParams};

const PURITY_EPS: f64 = 1e-12;

/// Leaf payload of a classification tree.
#[derive(Debug, Clone)]
pub struct ClassLeaf {
    /// Predicted class index (argmax of the distribution, first max wins).
    pub class: usize,
    /// Weight-normalized class distribution.
    pub distribution: Vec<f64>,
}

/// A single classification tree.
///
/// Labels are dense class indices in `0..n_classes`; the owning forest maps
/// caller labels to and from this range.
#[derive(Debug, Clone)]
pub struct ClassificationTree {
    nodes: Vec<Node<ClassLeaf>>,
    n_features: usize,
}

impl ClassificationTree {
    /// Grow a tree on the rows named by `indices`.
    ///
    /// `columns` is column-major: `columns[feature_idx][sample_idx]`.
    /// `labels[sample_idx]` are dense class indices, `weights[sample_idx]`
    /// per-sample weights. Rows listed twice in `indices` count twice.
    pub(crate) fn fit(
        columns: &[Vec<f64>],
        labels: &[usize],
        weights: &[f64],
        n_classes: usize,
        indices: &[usize],
        params: &TreeParams,
        rng: &mut ChaCha8Rng,
    ) -> Self {
        let mut nodes = Vec::new();
        build_node(
            &mut nodes, columns, labels, weights, n_classes, indices, 0, params, rng,
        );
        Self {
            nodes,
            n_features: columns.len(),
        }
    }

    /// Predict the class index for one row-major sample.
    #[must_use]
    pub fn predict_row(&self, row: &[f64]) -> usize {
        self.leaf_for(row).class
    }

    /// Return the leaf class distribution for one row-major sample.
    #[must_use]
    pub fn distribution(&self, row: &[f64]) -> &[f64] {
        &self.leaf_for(row).distribution
    }

    fn leaf_for(&self, row: &[f64]) -> &ClassLeaf {
        let mut current = NodeIndex::new(0);
        loop {
            match &self.nodes[current.index()] {
                Node::Leaf(leaf) => return leaf,
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

#[allow(clippy::too_many_arguments)]
fn build_node(
    nodes: &mut Vec<Node<ClassLeaf>>,
    columns: &[Vec<f64>],
    labels: &[usize],
    weights: &[f64],
    n_classes: usize,
    indices: &[usize],
    depth: usize,
    params: &TreeParams,
    rng: &mut ChaCha8Rng,
) -> NodeIndex {
    let n_samples = indices.len();
    let counts = weighted_counts(labels, weights, indices, n_classes);

    let mut must_stop = n_samples < params.min_samples_split
        || n_samples < 2 * params.min_samples_leaf
        || gini(&counts) < PURITY_EPS;
    if let Some(limit) = params.max_depth
        && depth >= limit
    {
        must_stop = true;
    }

    if must_stop {
        let index = NodeIndex::new(nodes.len());
        nodes.push(Node::Leaf(make_leaf(&counts)));
        return index;
    }

    let split = match params.strategy {
        SplitStrategy::Exact => {
            best_exact_split(columns, labels, weights, n_classes, indices, params, rng)
        }
        SplitStrategy::RandomThreshold => {
            best_random_split(columns, labels, weights, n_classes, indices, params, rng)
        }
    };
    let Some((feature, threshold, impurity_decrease)) = split else {
        let index = NodeIndex::new(nodes.len());
        nodes.push(Node::Leaf(make_leaf(&counts)));
        return index;
    };

    let (left_indices, right_indices) = partition(columns, indices, feature, threshold);

    // Placeholder leaf so children land after the parent in the arena.
    let index = NodeIndex::new(nodes.len());
    nodes.push(Node::Leaf(make_leaf(&counts)));

    let left = build_node(
        nodes, columns, labels, weights, n_classes, &left_indices, depth + 1, params, rng,
    );
    let right = build_node(
        nodes, columns, labels, weights, n_classes, &right_indices, depth + 1, params, rng,
    );

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
/// boundary with incremental weighted class counts.
fn best_exact_split(
    columns: &[Vec<f64>],
    labels: &[usize],
    weights: &[f64],
    n_classes: usize,
    indices: &[usize],
    params: &TreeParams,
    rng: &mut ChaCha8Rng,
) -> Option<(FeatureIndex, f64, f64)> {
    let n_samples = indices.len();
    let parent_counts = weighted_counts(labels, weights, indices, n_classes);
    let parent_weight: f64 = parent_counts.iter().sum();
    let parent_impurity = gini(&parent_counts);

    let mut best_decrease = f64::NEG_INFINITY;
    let mut best = None;

    for &feat_idx in &candidate_features(columns.len(), params.max_features, rng) {
        let feat_col = &columns[feat_idx];

        let mut sorted: Vec<(f64, usize)> = indices.iter().map(|&si| (feat_col[si], si)).collect();
        sorted.sort_unstable_by(|a, b| a.0.total_cmp(&b.0));

        let mut left_counts = vec![0.0; n_classes];
        let mut left_weight = 0.0;

        for i in 0..(n_samples - 1) {
            let (val_i, si) = sorted[i];
            left_counts[labels[si]] += weights[si];
            left_weight += weights[si];

            let val_next = sorted[i + 1].0;
            if val_i == val_next {
                continue;
            }

            let n_left = i + 1;
            let n_right = n_samples - n_left;
            if n_left < params.min_samples_leaf || n_right < params.min_samples_leaf {
                continue;
            }

            let right_counts: Vec<f64> = parent_counts
                .iter()
                .zip(&left_counts)
                .map(|(p, l)| p - l)
                .collect();
            let right_weight = parent_weight - left_weight;

            let decrease = parent_weight * parent_impurity
                - left_weight * gini(&left_counts)
                - right_weight * gini(&right_counts);

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
/// candidate by weighted impurity decrease.
fn best_random_split(
    columns: &[Vec<f64>],
    labels: &[usize],
    weights: &[f64],
    n_classes: usize,
    indices: &[usize],
    params: &TreeParams,
    rng: &mut ChaCha8Rng,
) -> Option<(FeatureIndex, f64, f64)> {
    let n_samples = indices.len();
    let parent_counts = weighted_counts(labels, weights, indices, n_classes);
    let parent_weight: f64 = parent_counts.iter().sum();
    let parent_impurity = gini(&parent_counts);

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

        let mut left_counts = vec![0.0; n_classes];
        let mut left_weight = 0.0;
        let mut n_left = 0;
        for &si in indices {
            if feat_col[si] <= threshold {
                left_counts[labels[si]] += weights[si];
                left_weight += weights[si];
                n_left += 1;
            }
        }
        let n_right = n_samples - n_left;
        if n_left < params.min_samples_leaf || n_right < params.min_samples_leaf {
            continue;
        }

        let right_counts: Vec<f64> = parent_counts
            .iter()
            .zip(&left_counts)
            .map(|(p, l)| p - l)
            .collect();
        let right_weight = parent_weight - left_weight;

        let decrease = parent_weight * parent_impurity
            - left_weight * gini(&left_counts)
            - right_weight * gini(&right_counts);

        if decrease > best_decrease {
            best_decrease = decrease;
            best = Some((FeatureIndex::new(feat_idx), threshold, decrease));
        }
    }

    best
}

/// Partial Fisher-Yates: shuffle only the first `max_features` positions.
pub(crate) fn candidate_features(
    n_features: usize,
    max_features: usize,
    rng: &mut ChaCha8Rng,
) -> Vec<usize> {
    let take = max_features.min(n_features);
    let mut order: Vec<usize> = (0..n_features).collect();
    for i in 0..take {
        let j = rng.gen_range(i..n_features);
        order.swap(i, j);
    }
    order.truncate(take);
    order
}

pub(crate) fn partition(
    columns: &[Vec<f64>],
    indices: &[usize],
    feature: FeatureIndex,
    threshold: f64,
) -> (Vec<usize>, Vec<usize>) {
    let feat_col = &columns[feature.index()];
    let mut left = Vec::with_capacity(indices.len() / 2);
    let mut right = Vec::with_capacity(indices.len() / 2);
    for &si in indices {
        if feat_col[si] <= threshold {
            left.push(si);
        } else {
            right.push(si);
        }
    }
    (left, right)
}

pub(crate) fn tree_depth<L>(nodes: &[Node<L>]) -> usize {
    let mut max_depth = 0;
    let mut stack = vec![(NodeIndex::new(0), 0usize)];
    while let Some((index, depth)) = stack.pop() {
        match &nodes[index.index()] {
            Node::Leaf(_) => max_depth = max_depth.max(depth),
            Node::Split { left, right, .. } => {
                stack.push((*left, depth + 1));
                stack.push((*right, depth + 1));
            }
        }
    }
    max_depth
}

pub(crate) fn accumulate_node_importances<L>(nodes: &[Node<L>], out: &mut [f64]) {
    let mut local = vec![0.0; out.len()];
    for node in nodes {
        if let Node::Split {
            feature,
            impurity_decrease,
            ..
        } = node
        {
            local[feature.index()] += impurity_decrease;
        }
    }
    let total: f64 = local.iter().sum();
    if total > 0.0 {
        for (o, l) in out.iter_mut().zip(&local) {
            *o += l / total;
        }
    }
}

/// First index holding the maximum value; earlier index wins ties.
pub(crate) fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, &v) in values.iter().enumerate() {
        if v > values[best] {
            best = i;
        }
    }
    best
}

fn weighted_counts(
    labels: &[usize],
    weights: &[f64],
    indices: &[usize],
    n_classes: usize,
) -> Vec<f64> {
    let mut counts = vec![0.0; n_classes];
    for &si in indices {
        counts[labels[si]] += weights[si];
    }
    counts
}

/// Gini impurity from weighted class counts: 1 - Σ(p_i²).
fn gini(counts: &[f64]) -> f64 {
    let total: f64 = counts.iter().sum();
    if total <= 0.0 {
        return 0.0;
    }
    let sum_sq: f64 = counts
        .iter()
        .map(|&c| {
            let p = c / total;
            p * p
        })
        .sum();
    1.0 - sum_sq
}

fn make_leaf(counts: &[f64]) -> ClassLeaf {
    let total: f64 = counts.iter().sum();
    let distribution: Vec<f64> = if total > 0.0 {
        counts.iter().map(|&c| c / total).collect()
    } else {
        vec![0.0; counts.len()]
    };
    ClassLeaf {
        class: argmax(counts),
        distribution,
    }
}
