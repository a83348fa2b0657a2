//! Combining member predictions: majority vote with first-seen
//! tie-breaking for labels, averaging for values.

use std::collections::HashMap;

use crate::error::SelectError;

/// Distinct labels in order of first appearance.
#[must_use]
pub fn first_seen_labels(labels: &[i64]) -> Vec<i64> {
    let mut order = Vec::new();
    for &label in labels {
        if !order.contains(&label) {
            order.push(label);
        }
    }
    order
}

/// Majority vote per row across members.
///
/// Ties go to the label appearing earliest in `label_order`, which callers
/// derive from training-target first appearance via [`first_seen_labels`].
pub fn tiebreaking_vote(
    member_votes: &[&[i64]],
    label_order: &[i64],
) -> Result<Vec<i64>, SelectError> {
    let Some(first) = member_votes.first() else {
        return Err(SelectError::EmptyVote);
    };
    let n_rows = first.len();
    for votes in member_votes {
        if votes.len() != n_rows {
            return Err(SelectError::VoteShape {
                expected: n_rows,
                got: votes.len(),
            });
        }
    }

    let positions: HashMap<i64, usize> = label_order
        .iter()
        .enumerate()
        .map(|(position, &label)| (label, position))
        .collect();

    let mut voted = Vec::with_capacity(n_rows);
    let mut counts = vec![0usize; label_order.len()];
    for row in 0..n_rows {
        counts.fill(0);
        for votes in member_votes {
            let label = votes[row];
            let position = *positions
                .get(&label)
                .ok_or(SelectError::VoteLabelUnknown { label })?;
            counts[position] += 1;
        }
        let mut best = 0;
        for (candidate, &count) in counts.iter().enumerate() {
            if count > counts[best] {
                best = candidate;
            }
        }
        voted.push(label_order[best]);
    }
    Ok(voted)
}

/// Mean per row across members.
pub fn mean_vote(member_values: &[&[f64]]) -> Result<Vec<f64>, SelectError> {
    let Some(first) = member_values.first() else {
        return Err(SelectError::EmptyVote);
    };
    let n_rows = first.len();
    for values in member_values {
        if values.len() != n_rows {
            return Err(SelectError::VoteShape {
                expected: n_rows,
                got: values.len(),
            });
        }
    }

    let n_members = member_values.len() as f64;
    Ok((0..n_rows)
        .map(|row| {
            member_values.iter().map(|values| values[row]).sum::<f64>() / n_members
        })
        .collect())
}
