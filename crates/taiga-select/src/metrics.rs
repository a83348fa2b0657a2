//! The scoring-metric registry and the fitness wrapper used to rank
//! candidates.
//!
//! Every metric scores so that higher is better: error metrics are negated
//! at scoring time.

use std::fmt;
use std::str::FromStr;

use taiga_forest::{Mode, Predictions, Targets};

use crate::error::SelectError;

/// A comparable fitness value where higher is always better.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
#[serde(transparent)]
pub struct Fitness(f64);

impl Fitness {
    /// Wrap a raw score.
    #[must_use]
    pub fn new(value: f64) -> Self {
        Self(value)
    }

    /// The raw score.
    #[must_use]
    pub fn value(self) -> f64 {
        self.0
    }

    /// Total order over fitness values, NaN-safe.
    #[must_use]
    pub fn total_cmp(self, other: Self) -> std::cmp::Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl fmt::Display for Fitness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6}", self.0)
    }
}

/// A scoring metric, keyed by its registry name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    /// Fraction of exactly matching labels.
    Accuracy,
    /// Mean per-label F1 over the union of truth and predicted labels.
    F1Macro,
    /// F1 over pooled per-row counts.
    F1Micro,
    /// Negated mean squared error.
    MeanSquaredError,
    /// Negated root mean squared error.
    RootMeanSquaredError,
    /// Negated mean absolute error.
    MeanAbsoluteError,
    /// Coefficient of determination.
    RSquared,
}

impl Metric {
    /// Every registered metric, in registry order.
    pub const ALL: [Metric; 7] = [
        Metric::Accuracy,
        Metric::F1Macro,
        Metric::F1Micro,
        Metric::MeanSquaredError,
        Metric::RootMeanSquaredError,
        Metric::MeanAbsoluteError,
        Metric::RSquared,
    ];

    /// Look up a metric by its registry name.
    pub fn parse(name: &str) -> Result<Self, SelectError> {
        match name {
            "accuracy" => Ok(Self::Accuracy),
            "f1Macro" => Ok(Self::F1Macro),
            "f1Micro" => Ok(Self::F1Micro),
            "meanSquaredError" => Ok(Self::MeanSquaredError),
            "rootMeanSquaredError" => Ok(Self::RootMeanSquaredError),
            "meanAbsoluteError" => Ok(Self::MeanAbsoluteError),
            "rSquared" => Ok(Self::RSquared),
            _ => Err(SelectError::UnknownMetric {
                name: name.to_string(),
            }),
        }
    }

    /// The canonical registry name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Accuracy => "accuracy",
            Self::F1Macro => "f1Macro",
            Self::F1Micro => "f1Micro",
            Self::MeanSquaredError => "meanSquaredError",
            Self::RootMeanSquaredError => "rootMeanSquaredError",
            Self::MeanAbsoluteError => "meanAbsoluteError",
            Self::RSquared => "rSquared",
        }
    }

    /// The mode whose targets this metric scores.
    #[must_use]
    pub fn mode(self) -> Mode {
        match self {
            Self::Accuracy | Self::F1Macro | Self::F1Micro => Mode::Classification,
            Self::MeanSquaredError
            | Self::RootMeanSquaredError
            | Self::MeanAbsoluteError
            | Self::RSquared => Mode::Regression,
        }
    }

    /// Score predictions against truth.
    ///
    /// # Errors
    ///
    /// | Variant | When |
    /// |---------|------|
    /// | [`SelectError::ScoreLength`] | lengths differ |
    /// | [`SelectError::EmptyScore`] | inputs are empty |
    /// | [`SelectError::MetricInputKind`] | target kind does not match the metric |
    pub fn score(self, truth: &Targets, predicted: &Predictions) -> Result<Fitness, SelectError> {
        if truth.len() != predicted.len() {
            return Err(SelectError::ScoreLength {
                truth: truth.len(),
                predicted: predicted.len(),
            });
        }
        if truth.is_empty() {
            return Err(SelectError::EmptyScore);
        }

        let value = match self {
            Self::Accuracy => {
                let (truth, predicted) = self.label_inputs(truth, predicted)?;
                accuracy(truth, predicted)
            }
            Self::F1Macro => {
                let (truth, predicted) = self.label_inputs(truth, predicted)?;
                f1_macro(truth, predicted)
            }
            Self::F1Micro => {
                let (truth, predicted) = self.label_inputs(truth, predicted)?;
                f1_micro(truth, predicted)
            }
            Self::MeanSquaredError => {
                let (truth, predicted) = self.value_inputs(truth, predicted)?;
                -mean_squared_error(truth, predicted)
            }
            Self::RootMeanSquaredError => {
                let (truth, predicted) = self.value_inputs(truth, predicted)?;
                -mean_squared_error(truth, predicted).sqrt()
            }
            Self::MeanAbsoluteError => {
                let (truth, predicted) = self.value_inputs(truth, predicted)?;
                -mean_absolute_error(truth, predicted)
            }
            Self::RSquared => {
                let (truth, predicted) = self.value_inputs(truth, predicted)?;
                r_squared(truth, predicted)
            }
        };
        Ok(Fitness::new(value))
    }

    fn label_inputs<'a>(
        self,
        truth: &'a Targets,
        predicted: &'a Predictions,
    ) -> Result<(&'a [i64], &'a [i64]), SelectError> {
        match (truth.as_labels(), predicted.as_labels()) {
            (Some(truth), Some(predicted)) => Ok((truth, predicted)),
            _ => Err(SelectError::MetricInputKind {
                metric: self.name(),
                expected: Mode::Classification,
            }),
        }
    }

    fn value_inputs<'a>(
        self,
        truth: &'a Targets,
        predicted: &'a Predictions,
    ) -> Result<(&'a [f64], &'a [f64]), SelectError> {
        match (truth.as_values(), predicted.as_values()) {
            (Some(truth), Some(predicted)) => Ok((truth, predicted)),
            _ => Err(SelectError::MetricInputKind {
                metric: self.name(),
                expected: Mode::Regression,
            }),
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Metric {
    type Err = SelectError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn accuracy(truth: &[i64], predicted: &[i64]) -> f64 {
    let correct = truth.iter().zip(predicted).filter(|(t, p)| t == p).count();
    correct as f64 / truth.len() as f64
}

/// Macro F1 over the union of truth and predicted labels. Degenerate
/// precision, recall, and F1 terms score zero rather than propagating NaN.
fn f1_macro(truth: &[i64], predicted: &[i64]) -> f64 {
    let labels = union_labels(truth, predicted);
    let total: f64 = labels
        .iter()
        .map(|&label| f1_for_label(truth, predicted, label))
        .sum();
    total / labels.len() as f64
}

/// F1 over pooled counts. Every misclassified row is one false positive and
/// one false negative, so micro precision and recall coincide.
fn f1_micro(truth: &[i64], predicted: &[i64]) -> f64 {
    let tp = truth.iter().zip(predicted).filter(|(t, p)| t == p).count() as f64;
    let errors = truth.len() as f64 - tp;
    let precision = tp / (tp + errors);
    let recall = tp / (tp + errors);
    if precision + recall > 0.0 {
        2.0 * precision * recall / (precision + recall)
    } else {
        0.0
    }
}

fn f1_for_label(truth: &[i64], predicted: &[i64], label: i64) -> f64 {
    let mut tp = 0.0;
    let mut fp = 0.0;
    let mut missed = 0.0;
    for (&t, &p) in truth.iter().zip(predicted) {
        if p == label && t == label {
            tp += 1.0;
        } else if p == label {
            fp += 1.0;
        } else if t == label {
            missed += 1.0;
        }
    }
    let precision = if tp + fp > 0.0 { tp / (tp + fp) } else { 0.0 };
    let recall = if tp + missed > 0.0 { tp / (tp + missed) } else { 0.0 };
    if precision + recall > 0.0 {
        2.0 * precision * recall / (precision + recall)
    } else {
        0.0
    }
}

fn union_labels(truth: &[i64], predicted: &[i64]) -> Vec<i64> {
    let mut labels: Vec<i64> = truth.iter().chain(predicted).copied().collect();
    labels.sort_unstable();
    labels.dedup();
    labels
}

fn mean_squared_error(truth: &[f64], predicted: &[f64]) -> f64 {
    let total: f64 = truth
        .iter()
        .zip(predicted)
        .map(|(t, p)| (t - p) * (t - p))
        .sum();
    total / truth.len() as f64
}

fn mean_absolute_error(truth: &[f64], predicted: &[f64]) -> f64 {
    let total: f64 = truth.iter().zip(predicted).map(|(t, p)| (t - p).abs()).sum();
    total / truth.len() as f64
}

/// Coefficient of determination. A constant truth vector scores 1.0 when
/// matched exactly and 0.0 otherwise.
fn r_squared(truth: &[f64], predicted: &[f64]) -> f64 {
    let mean = truth.iter().sum::<f64>() / truth.len() as f64;
    let ss_res: f64 = truth
        .iter()
        .zip(predicted)
        .map(|(t, p)| (t - p) * (t - p))
        .sum();
    let ss_tot: f64 = truth.iter().map(|t| (t - mean) * (t - mean)).sum();
    if ss_tot == 0.0 {
        if ss_res == 0.0 { 1.0 } else { 0.0 }
    } else {
        1.0 - ss_res / ss_tot
    }
}
