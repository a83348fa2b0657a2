//! Forest models over dense numeric features: train, predict, estimate
//! out-of-bag.
//!
//! Provides bagged classification and regression forests with CART trees,
//! exact and random-threshold split search, class weighting, parallel
//! training via rayon, and out-of-bag prediction for model selection.

mod class_tree;
mod error;
mod forest;
mod model;
mod node;
mod params;
mod targets;
mod value_tree;

pub use class_tree::{ClassLeaf, ClassificationTree};
pub use error::ForestError;
pub use forest::{ClassificationForest, RegressionForest};
pub use model::{FittedForest, ForestConfig, OobMode};
pub use node::{FeatureIndex, Node, NodeIndex};
pub use params::{ClassWeight, Family, ForestParams, MaxFeatures, Mode};
pub use targets::{Predictions, Targets};
pub use value_tree::RegressionTree;
