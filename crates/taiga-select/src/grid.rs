//! Hyperparameter grids and the search loop that scores every candidate on
//! out-of-bag predictions.

use taiga_forest::{
    ClassWeight, Family, FittedForest, ForestConfig, ForestParams, Mode, OobMode, Targets,
};
use tracing::{debug, info, instrument};

use crate::error::SelectError;
use crate::metrics::{Fitness, Metric};
use crate::parallel::parallel_map;
use crate::sampler::maybe_subset;

/// A hyperparameter search space, enumerated as a full cross-product.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ParamGrid {
    /// Forest families to try.
    pub families: Vec<Family>,
    /// Ensemble sizes to try.
    pub n_trees: Vec<usize>,
    /// Leaf-size floors to try.
    pub min_samples_leaf: Vec<usize>,
    /// Class weightings to try.
    pub class_weights: Vec<ClassWeight>,
    /// Bootstrap settings to try.
    pub bootstrap: Vec<bool>,
}

impl ParamGrid {
    /// The stock search space for a mode.
    ///
    /// Classification searches bagged random forests over tree counts,
    /// leaf sizes, and class weightings; regression also searches the
    /// extra-trees family and skips weighting.
    #[must_use]
    pub fn default_for(mode: Mode) -> Self {
        match mode {
            Mode::Classification => Self {
                families: vec![Family::RandomForest],
                n_trees: vec![32, 64, 128, 256, 512, 1024, 2048],
                min_samples_leaf: vec![1, 2, 4, 8, 16, 32],
                class_weights: vec![ClassWeight::Uniform, ClassWeight::Balanced],
                bootstrap: vec![true],
            },
            Mode::Regression => Self {
                families: vec![Family::ExtraTrees, Family::RandomForest],
                n_trees: vec![32, 64, 128, 256, 512, 1024, 2048],
                min_samples_leaf: vec![2, 4, 8, 16, 32, 64],
                class_weights: vec![ClassWeight::Uniform],
                bootstrap: vec![true],
            },
        }
    }

    /// Enumerate every grid point, stamping the same `seed` on each so
    /// candidates differ only in the searched parameters.
    ///
    /// Axes nest in declaration order with the last varying fastest.
    #[must_use]
    pub fn points(&self, seed: u64) -> Vec<ForestParams> {
        let mut points = Vec::with_capacity(self.len());
        for &family in &self.families {
            for &n_trees in &self.n_trees {
                for &min_samples_leaf in &self.min_samples_leaf {
                    for &class_weight in &self.class_weights {
                        for &bootstrap in &self.bootstrap {
                            points.push(
                                ForestParams::new(family)
                                    .with_n_trees(n_trees)
                                    .with_min_samples_leaf(min_samples_leaf)
                                    .with_class_weight(class_weight)
                                    .with_bootstrap(bootstrap)
                                    .with_seed(seed),
                            );
                        }
                    }
                }
            }
        }
        points
    }

    /// Number of points in the cross-product.
    #[must_use]
    pub fn len(&self) -> usize {
        self.families.len()
            * self.n_trees.len()
            * self.min_samples_leaf.len()
            * self.class_weights.len()
            * self.bootstrap.len()
    }

    /// Whether any axis is empty, leaving no points.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One scored grid candidate.
#[derive(Debug, Clone, serde::Serialize)]
pub struct GridResult {
    /// The candidate parameters.
    pub params: ForestParams,
    /// The candidate's out-of-bag fitness.
    pub fitness: Fitness,
}

/// Summary of one completed search iteration.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SearchReport {
    /// The winning candidate and its fitness.
    pub best: GridResult,
    /// How many candidates were scored.
    pub n_candidates: usize,
    /// Rows used while scoring candidates.
    pub search_rows: usize,
    /// Rows used for the winner's refit.
    pub refit_rows: usize,
}

/// Index of the winning candidate.
///
/// Stable-sorts an index vector ascending by fitness and takes the last
/// entry, so equal fitnesses resolve to the latest-enumerated candidate.
fn select_best(scored: &[GridResult]) -> Option<usize> {
    let mut order: Vec<usize> = (0..scored.len()).collect();
    order.sort_by(|&a, &b| scored[a].fitness.total_cmp(scored[b].fitness));
    order.last().copied()
}

/// One fully-configured grid search.
pub(crate) struct GridSearch {
    pub(crate) mode: Mode,
    pub(crate) metric: Metric,
    pub(crate) grid: ParamGrid,
    pub(crate) seed: u64,
    pub(crate) search_bound: usize,
    pub(crate) refit_bound: usize,
    pub(crate) inner_threads: usize,
    pub(crate) outer_threads: usize,
}

impl GridSearch {
    /// Score every candidate on a search-bound subsample, pick the winner,
    /// and refit it on a refit-bound subsample.
    ///
    /// Candidates fit with OOB enabled at the inner parallelism degree and
    /// are scored on their own out-of-bag predictions; the refit runs at
    /// the outer degree with OOB off. `salt` shifts the subsample draws
    /// between iterations without touching model seeds.
    #[instrument(skip_all, fields(metric = self.metric.name(), n_candidates = self.grid.len()))]
    pub(crate) fn run(
        &self,
        features: &[Vec<f64>],
        targets: &Targets,
        salt: u64,
    ) -> Result<(FittedForest, SearchReport), SelectError> {
        if self.grid.is_empty() {
            return Err(SelectError::EmptyGrid);
        }
        let subsample_seed = self.seed.wrapping_add(salt);

        let (search_features, search_targets) =
            maybe_subset(features, targets, self.search_bound, subsample_seed);
        let search_features: &[Vec<f64>] = &search_features;
        let search_targets: &Targets = &search_targets;
        let search_rows = search_features.len();

        let candidates = self.grid.points(self.seed);
        let n_candidates = candidates.len();
        info!(n_candidates, search_rows, "scoring grid candidates");

        let mut scored = parallel_map(candidates, self.outer_threads, |params| {
            let model = ForestConfig::new(self.mode, params.clone())?
                .with_oob_mode(OobMode::Enabled)
                .with_threads(Some(self.inner_threads))
                .fit(search_features, search_targets)?;
            let oob = model.oob_predictions()?;
            let fitness = self.metric.score(search_targets, &oob)?;
            debug!(
                %fitness,
                family = %params.family(),
                n_trees = params.n_trees(),
                min_samples_leaf = params.min_samples_leaf(),
                "grid point scored"
            );
            Ok(GridResult { params, fitness })
        })?;

        let best_index = select_best(&scored).ok_or(SelectError::EmptyGrid)?;
        let best = scored.swap_remove(best_index);
        info!(
            fitness = %best.fitness,
            family = %best.params.family(),
            n_trees = best.params.n_trees(),
            "winner selected"
        );

        let (refit_features, refit_targets) =
            maybe_subset(features, targets, self.refit_bound, subsample_seed);
        let model = ForestConfig::new(self.mode, best.params.clone())?
            .with_threads(Some(self.outer_threads))
            .fit(&refit_features, &refit_targets)?;
        info!(refit_rows = refit_features.len(), "winner refitted");

        let report = SearchReport {
            best,
            n_candidates,
            search_rows,
            refit_rows: refit_features.len(),
        };
        Ok((model, report))
    }
}
