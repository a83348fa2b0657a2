//! Row subsampling for bounded fitting.

use std::borrow::Cow;

use rand::SeedableRng;
use rand::seq::index;
use rand_chacha::ChaCha8Rng;
use tracing::debug;

use taiga_forest::Targets;

/// Take a uniform subsample of at most `bound` rows without replacement,
/// preserving original row order. Inputs at or under the bound pass through
/// untouched.
///
/// `features` and `targets` must already be the same length.
pub fn maybe_subset<'a>(
    features: &'a [Vec<f64>],
    targets: &'a Targets,
    bound: usize,
    seed: u64,
) -> (Cow<'a, [Vec<f64>]>, Cow<'a, Targets>) {
    let n_samples = features.len();
    if n_samples <= bound {
        return (Cow::Borrowed(features), Cow::Borrowed(targets));
    }

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut picked = index::sample(&mut rng, n_samples, bound).into_vec();
    picked.sort_unstable();
    debug!(n_samples, bound, "subsampling rows");

    let sub_features: Vec<Vec<f64>> = picked.iter().map(|&i| features[i].clone()).collect();
    let sub_targets = match targets {
        Targets::Labels(labels) => Targets::Labels(picked.iter().map(|&i| labels[i]).collect()),
        Targets::Values(values) => Targets::Values(picked.iter().map(|&i| values[i]).collect()),
    };
    (Cow::Owned(sub_features), Cow::Owned(sub_targets))
}
