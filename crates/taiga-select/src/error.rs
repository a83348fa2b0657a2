use taiga_forest::{ForestError, Mode};

/// Errors from scoring, grid search, and ensemble selection.
#[derive(Debug, thiserror::Error)]
pub enum SelectError {
    /// Returned when a metric name is not in the registry.
    #[error("unknown metric {name:?}")]
    UnknownMetric {
        /// The unrecognized metric name.
        name: String,
    },

    /// Returned when a metric is scored on empty inputs.
    #[error("cannot score a metric on empty inputs")]
    EmptyScore,

    /// Returned when truth and prediction lengths differ.
    #[error("got {predicted} predictions for {truth} truth values")]
    ScoreLength {
        /// The number of truth values.
        truth: usize,
        /// The number of predictions.
        predicted: usize,
    },

    /// Returned when a metric is scored on the wrong target kind.
    #[error("metric {metric} expects {expected} inputs")]
    MetricInputKind {
        /// The canonical metric name.
        metric: &'static str,
        /// The mode whose target kind the metric requires.
        expected: Mode,
    },

    /// Returned when a grid has an empty axis and so no points.
    #[error("parameter grid has no points")]
    EmptyGrid,

    /// Returned when num_fits is zero.
    #[error("num_fits must be at least 1, got {num_fits}")]
    InvalidNumFits {
        /// The invalid num_fits value provided.
        num_fits: usize,
    },

    /// Returned when a parallelism degree is zero.
    #[error("parallelism degree must be at least 1, got {degree}")]
    InvalidParallelism {
        /// The invalid degree provided.
        degree: usize,
    },

    /// Returned when a subsample row bound is zero.
    #[error("subsample bound must be at least 1, got {bound}")]
    InvalidSubsampleBound {
        /// The invalid bound provided.
        bound: usize,
    },

    /// Returned when a vote is taken over zero members.
    #[error("cannot vote over zero members")]
    EmptyVote,

    /// Returned when member prediction lengths differ.
    #[error("member predicted {got} rows, expected {expected}")]
    VoteShape {
        /// The row count of the first member.
        expected: usize,
        /// The row count of the offending member.
        got: usize,
    },

    /// Returned when a member predicts a label missing from the vote order.
    #[error("predicted label {label} is not in the training label order")]
    VoteLabelUnknown {
        /// The label with no position in the vote order.
        label: i64,
    },

    /// Returned when search details are requested but no search was run.
    #[error("no grid search has been run for this ensemble")]
    DetailsUnavailable,

    /// Returned when the search thread pool cannot be created.
    #[error("failed to build search thread pool")]
    ThreadPool {
        /// The underlying rayon error.
        source: rayon::ThreadPoolBuildError,
    },

    /// A forest-level failure during candidate fitting or prediction.
    #[error(transparent)]
    Forest(#[from] ForestError),
}
