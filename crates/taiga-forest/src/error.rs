use crate::params::Mode;

/// Errors from forest construction, training, and prediction.
#[derive(Debug, thiserror::Error)]
pub enum ForestError {
    /// Returned when n_trees is zero.
    #[error("n_trees must be at least 1, got {n_trees}")]
    InvalidTreeCount {
        /// The invalid n_trees value provided.
        n_trees: usize,
    },

    /// Returned when min_samples_leaf is zero.
    #[error("min_samples_leaf must be at least 1, got {min_samples_leaf}")]
    InvalidMinSamplesLeaf {
        /// The invalid min_samples_leaf value provided.
        min_samples_leaf: usize,
    },

    /// Returned when min_samples_split is less than 2.
    #[error("min_samples_split must be at least 2, got {min_samples_split}")]
    InvalidMinSamplesSplit {
        /// The invalid min_samples_split value provided.
        min_samples_split: usize,
    },

    /// Returned when max_depth is zero.
    #[error("max_depth must be at least 1, got {max_depth}")]
    InvalidMaxDepth {
        /// The invalid max_depth value provided.
        max_depth: usize,
    },

    /// Returned when max_features resolves to 0 or exceeds n_features.
    #[error("max_features resolved to {max_features}, but must be in [1, {n_features}]")]
    InvalidMaxFeatures {
        /// The resolved max_features value.
        max_features: usize,
        /// The number of features in the dataset.
        n_features: usize,
    },

    /// Returned when the tree-building thread count is zero.
    #[error("threads must be at least 1, got {threads}")]
    InvalidThreadCount {
        /// The invalid thread count provided.
        threads: usize,
    },

    /// Returned when balanced class weighting is requested in regression mode.
    #[error("balanced class weighting is only defined for classification")]
    ClassWeightRequiresClassification,

    /// Returned when OOB estimation is enabled without bootstrap sampling.
    #[error("OOB estimation requires bootstrap sampling")]
    OobRequiresBootstrap,

    /// Returned when OOB predictions are requested from a model fitted without them.
    #[error("model was fitted without OOB estimation")]
    OobNotEnabled,

    /// Returned when some training rows were never out-of-bag for any tree.
    #[error("{uncovered} of {n_samples} training rows have no OOB tree")]
    OobCoverage {
        /// Number of training rows with no OOB tree.
        uncovered: usize,
        /// Total number of training rows.
        n_samples: usize,
    },

    /// Returned when class probabilities are requested from a regression model.
    #[error("class probabilities are only defined for classification")]
    ProbaRequiresClassification,

    /// Returned when the training dataset has zero samples.
    #[error("training dataset has zero samples")]
    EmptyDataset,

    /// Returned when the training dataset has zero feature columns.
    #[error("training dataset has zero feature columns")]
    ZeroFeatures,

    /// Returned when a sample has a different number of features than expected.
    #[error("sample {sample_index} has {got} features, expected {expected}")]
    FeatureCountMismatch {
        /// The expected number of features.
        expected: usize,
        /// The actual number of features in the sample.
        got: usize,
        /// The zero-based index of the offending sample.
        sample_index: usize,
    },

    /// Returned when a sample has a different number of features at prediction time.
    #[error("prediction input has {got} features, expected {expected}")]
    PredictionFeatureMismatch {
        /// The expected number of features.
        expected: usize,
        /// The actual number of features in the prediction input.
        got: usize,
    },

    /// Returned when a training value is NaN or infinite.
    #[error("non-finite value at sample {sample_index}, feature {feature_index}")]
    NonFiniteValue {
        /// The zero-based index of the offending sample.
        sample_index: usize,
        /// The zero-based index of the offending feature column.
        feature_index: usize,
    },

    /// Returned when a regression target is NaN or infinite.
    #[error("non-finite target at sample {sample_index}")]
    NonFiniteTarget {
        /// The zero-based index of the offending sample.
        sample_index: usize,
    },

    /// Returned when the target vector length differs from the sample count.
    #[error("got {n_targets} targets for {n_samples} samples")]
    TargetLengthMismatch {
        /// The number of samples in the feature matrix.
        n_samples: usize,
        /// The number of targets provided.
        n_targets: usize,
    },

    /// Returned when the targets variant does not match the model mode.
    #[error("{mode} fit expects {expected} targets, got {found}")]
    TargetKindMismatch {
        /// The mode the model was configured with.
        mode: Mode,
        /// The targets variant that mode requires.
        expected: &'static str,
        /// The targets variant that was provided.
        found: &'static str,
    },

    /// Returned when the dedicated tree-building thread pool cannot be created.
    #[error("failed to build tree-building thread pool")]
    ThreadPool {
        /// The underlying rayon error.
        source: rayon::ThreadPoolBuildError,
    },
}
