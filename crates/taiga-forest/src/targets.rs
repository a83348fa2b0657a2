//! Row-aligned training targets and model outputs.

/// Training targets, one entry per feature-matrix row.
///
/// Classification labels are arbitrary `i64` values; they do not need to be
/// contiguous or non-negative. The flat vector order is the row order.
#[derive(Debug, Clone, PartialEq)]
pub enum Targets {
    /// Class labels for classification training.
    Labels(Vec<i64>),
    /// Real values for regression training.
    Values(Vec<f64>),
}

impl Targets {
    /// Return the number of targets.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Targets::Labels(labels) => labels.len(),
            Targets::Values(values) => values.len(),
        }
    }

    /// Return `true` if there are no targets.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Short name of the variant, used in error messages.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Targets::Labels(_) => "labels",
            Targets::Values(_) => "values",
        }
    }

    /// Return the labels if this is a classification target vector.
    #[must_use]
    pub fn as_labels(&self) -> Option<&[i64]> {
        match self {
            Targets::Labels(labels) => Some(labels),
            Targets::Values(_) => None,
        }
    }

    /// Return the values if this is a regression target vector.
    #[must_use]
    pub fn as_values(&self) -> Option<&[f64]> {
        match self {
            Targets::Labels(_) => None,
            Targets::Values(values) => Some(values),
        }
    }
}

/// Model outputs, one entry per input row.
///
/// Mirrors [`Targets`] so fitted outputs can be scored against recorded
/// training targets without conversion.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(untagged)]
pub enum Predictions {
    /// Predicted class labels.
    Labels(Vec<i64>),
    /// Predicted real values.
    Values(Vec<f64>),
}

impl Predictions {
    /// Return the number of predictions.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Predictions::Labels(labels) => labels.len(),
            Predictions::Values(values) => values.len(),
        }
    }

    /// Return `true` if there are no predictions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Short name of the variant, used in error messages.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Predictions::Labels(_) => "labels",
            Predictions::Values(_) => "values",
        }
    }

    /// Return the predicted labels, if classification output.
    #[must_use]
    pub fn as_labels(&self) -> Option<&[i64]> {
        match self {
            Predictions::Labels(labels) => Some(labels),
            Predictions::Values(_) => None,
        }
    }

    /// Return the predicted values, if regression output.
    #[must_use]
    pub fn as_values(&self) -> Option<&[f64]> {
        match self {
            Predictions::Labels(_) => None,
            Predictions::Values(values) => Some(values),
        }
    }
}
