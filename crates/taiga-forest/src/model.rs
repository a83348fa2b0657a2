//! Model configuration and the fitted-forest facade over both modes.

use crate::error::ForestError;
use crate::forest::{self, ClassificationForest, RegressionForest};
use crate::params::{ClassWeight, ForestParams, MaxFeatures, Mode, TreeParams};
use crate::targets::{Predictions, Targets};

/// Whether to track out-of-bag rows during fitting and compute OOB
/// predictions for the training set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OobMode {
    /// Compute an OOB prediction for every training row.
    Enabled,
    /// Skip OOB bookkeeping entirely.
    Disabled,
}

/// Configuration for fitting a forest in either mode.
///
/// Core sampling and sizing knobs come from [`ForestParams`]; this layer adds
/// the tree-shape and execution settings.
///
/// | Setting | Default |
/// |---------|---------|
/// | `max_features` | `Sqrt` (classification), `All` (regression) |
/// | `max_depth` | unlimited |
/// | `min_samples_split` | `2` |
/// | `oob_mode` | `Disabled` |
/// | `threads` | ambient rayon pool |
#[derive(Debug, Clone)]
pub struct ForestConfig {
    mode: Mode,
    params: ForestParams,
    max_features: Option<MaxFeatures>,
    max_depth: Option<usize>,
    min_samples_split: usize,
    oob_mode: OobMode,
    threads: Option<usize>,
}

impl ForestConfig {
    /// Create a configuration, validating the parameter set against the mode.
    ///
    /// # Errors
    ///
    /// | Variant | When |
    /// |---------|------|
    /// | [`ForestError::InvalidTreeCount`] | `n_trees` is zero |
    /// | [`ForestError::InvalidMinSamplesLeaf`] | `min_samples_leaf` is zero |
    /// | [`ForestError::ClassWeightRequiresClassification`] | balanced weighting in regression mode |
    pub fn new(mode: Mode, params: ForestParams) -> Result<Self, ForestError> {
        if params.n_trees == 0 {
            return Err(ForestError::InvalidTreeCount { n_trees: 0 });
        }
        if params.min_samples_leaf == 0 {
            return Err(ForestError::InvalidMinSamplesLeaf {
                min_samples_leaf: 0,
            });
        }
        if mode == Mode::Regression && params.class_weight == ClassWeight::Balanced {
            return Err(ForestError::ClassWeightRequiresClassification);
        }
        Ok(Self {
            mode,
            params,
            max_features: None,
            max_depth: None,
            min_samples_split: 2,
            oob_mode: OobMode::Disabled,
            threads: None,
        })
    }

    /// Override the per-split feature subsampling rule.
    #[must_use]
    pub fn with_max_features(mut self, max_features: MaxFeatures) -> Self {
        self.max_features = Some(max_features);
        self
    }

    /// Limit tree depth; `None` grows until the stopping rules fire.
    #[must_use]
    pub fn with_max_depth(mut self, max_depth: Option<usize>) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Set the minimum node size eligible for splitting.
    #[must_use]
    pub fn with_min_samples_split(mut self, min_samples_split: usize) -> Self {
        self.min_samples_split = min_samples_split;
        self
    }

    /// Enable or disable out-of-bag prediction.
    #[must_use]
    pub fn with_oob_mode(mut self, oob_mode: OobMode) -> Self {
        self.oob_mode = oob_mode;
        self
    }

    /// Pin tree growing to a dedicated pool of `threads` workers; `None`
    /// uses the ambient rayon pool.
    #[must_use]
    pub fn with_threads(mut self, threads: Option<usize>) -> Self {
        self.threads = threads;
        self
    }

    /// The mode this configuration fits.
    #[must_use]
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// The core forest parameters.
    #[must_use]
    pub fn params(&self) -> &ForestParams {
        &self.params
    }

    /// The configured OOB mode.
    #[must_use]
    pub fn oob_mode(&self) -> OobMode {
        self.oob_mode
    }

    /// The configured thread count, if pinned.
    #[must_use]
    pub fn threads(&self) -> Option<usize> {
        self.threads
    }

    /// Fit a forest on row-major `features` and matching `targets`.
    ///
    /// # Errors
    ///
    /// | Variant | When |
    /// |---------|------|
    /// | [`ForestError::EmptyDataset`] | `features` has no rows |
    /// | [`ForestError::ZeroFeatures`] | rows have no columns |
    /// | [`ForestError::FeatureCountMismatch`] | a row has a different width |
    /// | [`ForestError::NonFiniteValue`] | a feature value is NaN or infinite |
    /// | [`ForestError::NonFiniteTarget`] | a regression target is NaN or infinite |
    /// | [`ForestError::TargetLengthMismatch`] | target count differs from row count |
    /// | [`ForestError::TargetKindMismatch`] | labels passed to regression or values to classification |
    /// | [`ForestError::InvalidMinSamplesSplit`] | `min_samples_split` below 2 |
    /// | [`ForestError::InvalidMaxDepth`] | `max_depth` of zero |
    /// | [`ForestError::InvalidMaxFeatures`] | the rule resolves outside `[1, n_features]` |
    /// | [`ForestError::InvalidThreadCount`] | a pinned thread count of zero |
    /// | [`ForestError::OobRequiresBootstrap`] | OOB enabled with bootstrap off |
    /// | [`ForestError::OobCoverage`] | some rows were in-bag for every tree |
    /// | [`ForestError::ThreadPool`] | the dedicated pool could not be built |
    pub fn fit(&self, features: &[Vec<f64>], targets: &Targets) -> Result<FittedForest, ForestError> {
        let n_features = forest::validate_features(features)?;
        if targets.len() != features.len() {
            return Err(ForestError::TargetLengthMismatch {
                n_samples: features.len(),
                n_targets: targets.len(),
            });
        }
        if self.min_samples_split < 2 {
            return Err(ForestError::InvalidMinSamplesSplit {
                min_samples_split: self.min_samples_split,
            });
        }
        if self.max_depth == Some(0) {
            return Err(ForestError::InvalidMaxDepth { max_depth: 0 });
        }
        if self.threads == Some(0) {
            return Err(ForestError::InvalidThreadCount { threads: 0 });
        }
        if self.oob_mode == OobMode::Enabled && !self.params.bootstrap {
            return Err(ForestError::OobRequiresBootstrap);
        }

        let max_features = self.max_features.unwrap_or(match self.mode {
            Mode::Classification => MaxFeatures::Sqrt,
            Mode::Regression => MaxFeatures::All,
        });
        let tree_params = TreeParams {
            strategy: self.params.family.strategy(),
            max_features: max_features.resolve(n_features)?,
            max_depth: self.max_depth,
            min_samples_split: self.min_samples_split,
            min_samples_leaf: self.params.min_samples_leaf,
        };
        let oob = self.oob_mode == OobMode::Enabled;

        match (self.mode, targets) {
            (Mode::Classification, Targets::Labels(labels)) => {
                let fitted = forest::grow_classification(
                    features,
                    labels,
                    &self.params,
                    tree_params,
                    oob,
                    self.threads,
                )?;
                Ok(FittedForest::Classification(fitted))
            }
            (Mode::Regression, Targets::Values(values)) => {
                for (sample_index, value) in values.iter().enumerate() {
                    if !value.is_finite() {
                        return Err(ForestError::NonFiniteTarget { sample_index });
                    }
                }
                let fitted = forest::grow_regression(
                    features,
                    values,
                    &self.params,
                    tree_params,
                    oob,
                    self.threads,
                )?;
                Ok(FittedForest::Regression(fitted))
            }
            (mode, targets) => Err(ForestError::TargetKindMismatch {
                mode,
                expected: match mode {
                    Mode::Classification => "labels",
                    Mode::Regression => "values",
                },
                found: targets.kind(),
            }),
        }
    }
}

/// A fitted forest in either mode.
#[derive(Debug, Clone)]
pub enum FittedForest {
    /// A forest predicting `i64` labels.
    Classification(ClassificationForest),
    /// A forest predicting `f64` values.
    Regression(RegressionForest),
}

impl FittedForest {
    /// The mode this forest was fitted in.
    #[must_use]
    pub fn mode(&self) -> Mode {
        match self {
            Self::Classification(_) => Mode::Classification,
            Self::Regression(_) => Mode::Regression,
        }
    }

    /// Predict targets for row-major `features`.
    pub fn predict(&self, features: &[Vec<f64>]) -> Result<Predictions, ForestError> {
        match self {
            Self::Classification(forest) => Ok(Predictions::Labels(forest.predict(features)?)),
            Self::Regression(forest) => Ok(Predictions::Values(forest.predict(features)?)),
        }
    }

    /// Per-row class probabilities in [`ClassificationForest::classes`] order.
    pub fn predict_proba(&self, features: &[Vec<f64>]) -> Result<Vec<Vec<f64>>, ForestError> {
        match self {
            Self::Classification(forest) => forest.predict_proba(features),
            Self::Regression(_) => Err(ForestError::ProbaRequiresClassification),
        }
    }

    /// Out-of-bag predictions for the training rows.
    pub fn oob_predictions(&self) -> Result<Predictions, ForestError> {
        match self {
            Self::Classification(forest) => Ok(Predictions::Labels(
                forest.oob_predictions()?.to_vec(),
            )),
            Self::Regression(forest) => {
                Ok(Predictions::Values(forest.oob_predictions()?.to_vec()))
            }
        }
    }

    /// Impurity-decrease feature importances, normalized to sum to one.
    #[must_use]
    pub fn feature_importances(&self) -> &[f64] {
        match self {
            Self::Classification(forest) => forest.feature_importances(),
            Self::Regression(forest) => forest.feature_importances(),
        }
    }

    /// Distinct training labels for classification forests.
    #[must_use]
    pub fn classes(&self) -> Option<&[i64]> {
        match self {
            Self::Classification(forest) => Some(forest.classes()),
            Self::Regression(_) => None,
        }
    }

    /// Number of trees in the ensemble.
    #[must_use]
    pub fn n_trees(&self) -> usize {
        match self {
            Self::Classification(forest) => forest.n_trees(),
            Self::Regression(forest) => forest.n_trees(),
        }
    }

    /// Number of feature columns the forest was trained on.
    #[must_use]
    pub fn n_features(&self) -> usize {
        match self {
            Self::Classification(forest) => forest.n_features(),
            Self::Regression(forest) => forest.n_features(),
        }
    }
}
