//! Model hyperparameters and the mode/family vocabulary.

use std::fmt;
use std::str::FromStr;

use crate::error::ForestError;

/// Task mode, derived from the target metric family upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Predict one class label per row.
    Classification,
    /// Predict one real value per row.
    Regression,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Classification => write!(f, "classification"),
            Mode::Regression => write!(f, "regression"),
        }
    }
}

/// Forest family, selecting how split thresholds are chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Family {
    /// Bagged trees with exhaustive threshold search per candidate feature.
    RandomForest,
    /// Trees with one uniform random threshold per candidate feature.
    ExtraTrees,
}

impl Family {
    pub(crate) fn strategy(self) -> SplitStrategy {
        match self {
            Family::RandomForest => SplitStrategy::Exact,
            Family::ExtraTrees => SplitStrategy::RandomThreshold,
        }
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Family::RandomForest => write!(f, "random_forest"),
            Family::ExtraTrees => write!(f, "extra_trees"),
        }
    }
}

impl FromStr for Family {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "random_forest" => Ok(Family::RandomForest),
            "extra_trees" => Ok(Family::ExtraTrees),
            other => Err(format!(
                "unknown family {other:?}, expected \"random_forest\" or \"extra_trees\""
            )),
        }
    }
}

/// Per-sample weighting policy for classification training.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassWeight {
    /// Every sample weighs 1.0.
    Uniform,
    /// Each sample weighs `n_samples / (n_classes * count(class))`,
    /// computed over the full training targets before any bootstrap draw.
    Balanced,
}

impl fmt::Display for ClassWeight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClassWeight::Uniform => write!(f, "uniform"),
            ClassWeight::Balanced => write!(f, "balanced"),
        }
    }
}

impl FromStr for ClassWeight {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "uniform" => Ok(ClassWeight::Uniform),
            "balanced" => Ok(ClassWeight::Balanced),
            other => Err(format!(
                "unknown class weight {other:?}, expected \"uniform\" or \"balanced\""
            )),
        }
    }
}

/// Strategy for determining the number of features considered at each split.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MaxFeatures {
    /// Square root of total features.
    Sqrt,
    /// Log base 2 of total features.
    Log2,
    /// A fixed count.
    Fixed(usize),
    /// All features (no subsampling).
    All,
}

impl MaxFeatures {
    /// Resolve the strategy against a concrete feature count.
    ///
    /// # Errors
    ///
    /// Returns [`ForestError::InvalidMaxFeatures`] if the resolved count is
    /// zero or exceeds `n_features`.
    pub fn resolve(self, n_features: usize) -> Result<usize, ForestError> {
        let max_features = match self {
            MaxFeatures::Sqrt => (n_features as f64).sqrt().floor() as usize,
            MaxFeatures::Log2 => (n_features as f64).log2().floor() as usize,
            MaxFeatures::Fixed(count) => count,
            MaxFeatures::All => n_features,
        };
        if max_features == 0 || max_features > n_features {
            return Err(ForestError::InvalidMaxFeatures {
                max_features,
                n_features,
            });
        }
        Ok(max_features)
    }
}

/// One searchable hyperparameter point.
///
/// Construct via [`ForestParams::new`], then chain `with_*` methods.
///
/// # Defaults
///
/// | Parameter          | Default   |
/// |--------------------|-----------|
/// | `n_trees`          | 100       |
/// | `min_samples_leaf` | 1         |
/// | `class_weight`     | `Uniform` |
/// | `bootstrap`        | `true`    |
/// | `seed`             | 42        |
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ForestParams {
    pub(crate) family: Family,
    pub(crate) n_trees: usize,
    pub(crate) min_samples_leaf: usize,
    pub(crate) class_weight: ClassWeight,
    pub(crate) bootstrap: bool,
    pub(crate) seed: u64,
}

impl ForestParams {
    /// Create a parameter set for the given family with default values.
    #[must_use]
    pub fn new(family: Family) -> Self {
        Self {
            family,
            n_trees: 100,
            min_samples_leaf: 1,
            class_weight: ClassWeight::Uniform,
            bootstrap: true,
            seed: 42,
        }
    }

    // --- Setters ---

    /// Set the number of trees.
    #[must_use]
    pub fn with_n_trees(mut self, n_trees: usize) -> Self {
        self.n_trees = n_trees;
        self
    }

    /// Set the minimum number of samples required in each leaf.
    #[must_use]
    pub fn with_min_samples_leaf(mut self, min_samples_leaf: usize) -> Self {
        self.min_samples_leaf = min_samples_leaf;
        self
    }

    /// Set the class weighting policy.
    #[must_use]
    pub fn with_class_weight(mut self, class_weight: ClassWeight) -> Self {
        self.class_weight = class_weight;
        self
    }

    /// Enable or disable bootstrap sampling.
    #[must_use]
    pub fn with_bootstrap(mut self, bootstrap: bool) -> Self {
        self.bootstrap = bootstrap;
        self
    }

    /// Set the random seed for reproducibility.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    // --- Getters ---

    /// Return the forest family.
    #[must_use]
    pub fn family(&self) -> Family {
        self.family
    }

    /// Return the number of trees.
    #[must_use]
    pub fn n_trees(&self) -> usize {
        self.n_trees
    }

    /// Return the minimum samples required in each leaf.
    #[must_use]
    pub fn min_samples_leaf(&self) -> usize {
        self.min_samples_leaf
    }

    /// Return the class weighting policy.
    #[must_use]
    pub fn class_weight(&self) -> ClassWeight {
        self.class_weight
    }

    /// Return whether bootstrap sampling is enabled.
    #[must_use]
    pub fn bootstrap(&self) -> bool {
        self.bootstrap
    }

    /// Return the random seed.
    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }
}

/// How split thresholds are searched within a tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SplitStrategy {
    /// Sort each candidate feature and sweep every distinct threshold.
    Exact,
    /// Draw one uniform random threshold per candidate feature.
    RandomThreshold,
}

/// Resolved per-tree growth limits shared by both tree kinds.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TreeParams {
    pub(crate) strategy: SplitStrategy,
    pub(crate) max_features: usize,
    pub(crate) max_depth: Option<usize>,
    pub(crate) min_samples_split: usize,
    pub(crate) min_samples_leaf: usize,
}

#[cfg(test)]
mod tests {
    use super::{ClassWeight, Family, ForestParams, MaxFeatures, Mode, SplitStrategy};

    // --- MaxFeatures ---

    #[test]
    fn sqrt_resolution() {
        assert_eq!(MaxFeatures::Sqrt.resolve(16).unwrap(), 4);
        assert_eq!(MaxFeatures::Sqrt.resolve(10).unwrap(), 3);
        assert_eq!(MaxFeatures::Sqrt.resolve(1).unwrap(), 1);
    }

    #[test]
    fn log2_resolution() {
        assert_eq!(MaxFeatures::Log2.resolve(16).unwrap(), 4);
        assert_eq!(MaxFeatures::Log2.resolve(10).unwrap(), 3);
    }

    #[test]
    fn log2_of_one_feature_is_invalid() {
        assert!(MaxFeatures::Log2.resolve(1).is_err());
    }

    #[test]
    fn fixed_resolution_bounds() {
        assert_eq!(MaxFeatures::Fixed(3).resolve(5).unwrap(), 3);
        assert!(MaxFeatures::Fixed(0).resolve(5).is_err());
        assert!(MaxFeatures::Fixed(6).resolve(5).is_err());
    }

    #[test]
    fn all_resolution() {
        assert_eq!(MaxFeatures::All.resolve(7).unwrap(), 7);
    }

    // --- Family ---

    #[test]
    fn family_strategy_mapping() {
        assert_eq!(Family::RandomForest.strategy(), SplitStrategy::Exact);
        assert_eq!(Family::ExtraTrees.strategy(), SplitStrategy::RandomThreshold);
    }

    #[test]
    fn family_parse_roundtrip() {
        for family in [Family::RandomForest, Family::ExtraTrees] {
            let parsed: Family = family.to_string().parse().unwrap();
            assert_eq!(parsed, family);
        }
    }

    #[test]
    fn family_parse_rejects_unknown() {
        assert!("gradient_boosting".parse::<Family>().is_err());
    }

    #[test]
    fn class_weight_parse_roundtrip() {
        for weight in [ClassWeight::Uniform, ClassWeight::Balanced] {
            let parsed: ClassWeight = weight.to_string().parse().unwrap();
            assert_eq!(parsed, weight);
        }
    }

    #[test]
    fn mode_display() {
        assert_eq!(Mode::Classification.to_string(), "classification");
        assert_eq!(Mode::Regression.to_string(), "regression");
    }

    // --- ForestParams ---

    #[test]
    fn params_defaults() {
        let params = ForestParams::new(Family::RandomForest);
        assert_eq!(params.n_trees(), 100);
        assert_eq!(params.min_samples_leaf(), 1);
        assert_eq!(params.class_weight(), ClassWeight::Uniform);
        assert!(params.bootstrap());
        assert_eq!(params.seed(), 42);
    }

    #[test]
    fn params_builder_chain() {
        let params = ForestParams::new(Family::ExtraTrees)
            .with_n_trees(32)
            .with_min_samples_leaf(4)
            .with_class_weight(ClassWeight::Balanced)
            .with_bootstrap(false)
            .with_seed(7);
        assert_eq!(params.family(), Family::ExtraTrees);
        assert_eq!(params.n_trees(), 32);
        assert_eq!(params.min_samples_leaf(), 4);
        assert_eq!(params.class_weight(), ClassWeight::Balanced);
        assert!(!params.bootstrap());
        assert_eq!(params.seed(), 7);
    }

    #[test]
    fn params_serialize_snake_case() {
        let params = ForestParams::new(Family::RandomForest);
        let json = serde_json::to_string(&params).unwrap();
        assert!(json.contains("\"random_forest\""));
        assert!(json.contains("\"uniform\""));
    }
}
