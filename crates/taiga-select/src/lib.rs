//! Model selection over forest ensembles.
//!
//! This crate drives [`taiga_forest`] through a metric-keyed grid search:
//! candidates are scored on out-of-bag predictions over a subsampled slice
//! of the data, the winner is refitted under a larger row bound, and the
//! procedure can repeat to build an ensemble whose members vote (with ties
//! broken toward earlier training labels) or average.
//!
//! [`EnsembleConfig`] is the entry point. Give it a metric name and data;
//! it derives the task mode from the metric and searches the stock grid
//! for that mode unless a custom [`FitStrategy`] is supplied.

pub mod ensemble;
pub mod error;
pub mod grid;
pub mod metrics;
mod parallel;
pub mod sampler;
pub mod vote;

pub use ensemble::{EnsembleConfig, FitStrategy, FittedEnsemble, SearchDetails};
pub use error::SelectError;
pub use grid::{GridResult, ParamGrid, SearchReport};
pub use metrics::{Fitness, Metric};
pub use sampler::maybe_subset;
pub use vote::{first_seen_labels, mean_vote, tiebreaking_vote};
