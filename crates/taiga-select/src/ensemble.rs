//! The selection engine: repeated grid searches or fixed fits over
//! subsampled data, combined by vote or average at prediction time.

use taiga_forest::{
    FittedForest, ForestConfig, ForestError, ForestParams, Mode, Predictions, Targets,
};
use tracing::{info, instrument};

use crate::error::SelectError;
use crate::grid::{GridSearch, ParamGrid, SearchReport};
use crate::metrics::{Fitness, Metric};
use crate::sampler::maybe_subset;
use crate::vote::{first_seen_labels, mean_vote, tiebreaking_vote};

/// How each ensemble member is produced.
#[derive(Debug, Clone)]
pub enum FitStrategy {
    /// Search this grid and keep the refitted winner.
    GridSearch(ParamGrid),
    /// Fit these parameters directly, skipping the search.
    FixedParams(ForestParams),
}

/// Configuration for fitting a [`FittedEnsemble`].
///
/// The mode is derived from the metric, and the default strategy searches
/// the stock grid for that mode.
///
/// | Setting | Default |
/// |---------|---------|
/// | `strategy` | grid search over [`ParamGrid::default_for`] |
/// | `num_fits` | `1` |
/// | `search_bound` | `100_000` rows |
/// | `refit_bound` | `1_500_000` rows |
/// | `inner_threads` | `1` |
/// | `outer_threads` | `64` |
/// | `seed` | `42` |
#[derive(Debug, Clone)]
pub struct EnsembleConfig {
    metric: Metric,
    mode: Mode,
    strategy: FitStrategy,
    num_fits: usize,
    search_bound: usize,
    refit_bound: usize,
    inner_threads: usize,
    outer_threads: usize,
    seed: u64,
}

impl EnsembleConfig {
    /// Create a configuration for the named metric.
    ///
    /// # Errors
    ///
    /// Returns [`SelectError::UnknownMetric`] for names missing from the
    /// registry.
    pub fn new(metric_name: &str) -> Result<Self, SelectError> {
        let metric = Metric::parse(metric_name)?;
        let mode = metric.mode();
        Ok(Self {
            metric,
            mode,
            strategy: FitStrategy::GridSearch(ParamGrid::default_for(mode)),
            num_fits: 1,
            search_bound: 100_000,
            refit_bound: 1_500_000,
            inner_threads: 1,
            outer_threads: 64,
            seed: 42,
        })
    }

    /// Search this grid instead of the stock grid.
    #[must_use]
    pub fn with_param_grid(mut self, grid: ParamGrid) -> Self {
        self.strategy = FitStrategy::GridSearch(grid);
        self
    }

    /// Fit these parameters directly, skipping the search.
    #[must_use]
    pub fn with_fixed_params(mut self, params: ForestParams) -> Self {
        self.strategy = FitStrategy::FixedParams(params);
        self
    }

    /// Set how many members to fit.
    #[must_use]
    pub fn with_num_fits(mut self, num_fits: usize) -> Self {
        self.num_fits = num_fits;
        self
    }

    /// Cap the rows used for candidate scoring and fixed fits.
    #[must_use]
    pub fn with_search_bound(mut self, search_bound: usize) -> Self {
        self.search_bound = search_bound;
        self
    }

    /// Cap the rows used for the winner's refit.
    #[must_use]
    pub fn with_refit_bound(mut self, refit_bound: usize) -> Self {
        self.refit_bound = refit_bound;
        self
    }

    /// Set the tree-level parallelism used while scoring candidates.
    #[must_use]
    pub fn with_inner_threads(mut self, inner_threads: usize) -> Self {
        self.inner_threads = inner_threads;
        self
    }

    /// Set the candidate-level parallelism, also used for refits and
    /// fixed fits.
    #[must_use]
    pub fn with_outer_threads(mut self, outer_threads: usize) -> Self {
        self.outer_threads = outer_threads;
        self
    }

    /// Set the seed stamped on every model and subsample draw.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// The configured metric.
    #[must_use]
    pub fn metric(&self) -> Metric {
        self.metric
    }

    /// The mode derived from the metric.
    #[must_use]
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// The configured seed.
    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Fit the ensemble on row-major `features` and matching `targets`.
    ///
    /// Each iteration draws its own subsample (the seed is salted by the
    /// iteration index) but stamps the same model seed, so members differ
    /// through data, not through model randomness.
    ///
    /// # Errors
    ///
    /// | Variant | When |
    /// |---------|------|
    /// | [`SelectError::InvalidNumFits`] | `num_fits` is zero |
    /// | [`SelectError::InvalidParallelism`] | a parallelism degree is zero |
    /// | [`SelectError::InvalidSubsampleBound`] | a row bound is zero |
    /// | [`SelectError::EmptyGrid`] | the search grid has no points |
    /// | [`SelectError::Forest`] | data validation or a member fit fails |
    #[instrument(skip_all, fields(metric = self.metric.name(), num_fits = self.num_fits, n_samples = features.len()))]
    pub fn fit(
        &self,
        features: &[Vec<f64>],
        targets: &Targets,
    ) -> Result<FittedEnsemble, SelectError> {
        if self.num_fits == 0 {
            return Err(SelectError::InvalidNumFits { num_fits: 0 });
        }
        if self.inner_threads == 0 || self.outer_threads == 0 {
            return Err(SelectError::InvalidParallelism { degree: 0 });
        }
        if self.search_bound == 0 {
            return Err(SelectError::InvalidSubsampleBound { bound: 0 });
        }
        if self.refit_bound == 0 {
            return Err(SelectError::InvalidSubsampleBound { bound: 0 });
        }
        if features.is_empty() {
            return Err(ForestError::EmptyDataset.into());
        }
        if targets.len() != features.len() {
            return Err(ForestError::TargetLengthMismatch {
                n_samples: features.len(),
                n_targets: targets.len(),
            }
            .into());
        }
        let expected_kind = match self.mode {
            Mode::Classification => "labels",
            Mode::Regression => "values",
        };
        if targets.kind() != expected_kind {
            return Err(ForestError::TargetKindMismatch {
                mode: self.mode,
                expected: expected_kind,
                found: targets.kind(),
            }
            .into());
        }

        let label_order = targets.as_labels().map(first_seen_labels);
        let mut members = Vec::with_capacity(self.num_fits);
        let mut report = None;

        match &self.strategy {
            FitStrategy::GridSearch(grid) => {
                if grid.is_empty() {
                    return Err(SelectError::EmptyGrid);
                }
                let search = GridSearch {
                    mode: self.mode,
                    metric: self.metric,
                    grid: grid.clone(),
                    seed: self.seed,
                    search_bound: self.search_bound,
                    refit_bound: self.refit_bound,
                    inner_threads: self.inner_threads,
                    outer_threads: self.outer_threads,
                };
                for iteration in 0..self.num_fits as u64 {
                    let (member, iteration_report) = search.run(features, targets, iteration)?;
                    members.push(member);
                    report = Some(iteration_report);
                }
            }
            FitStrategy::FixedParams(params) => {
                for iteration in 0..self.num_fits as u64 {
                    let subsample_seed = self.seed.wrapping_add(iteration);
                    let (sub_features, sub_targets) =
                        maybe_subset(features, targets, self.search_bound, subsample_seed);
                    let member = ForestConfig::new(self.mode, params.clone().with_seed(self.seed))?
                        .with_threads(Some(self.outer_threads))
                        .fit(&sub_features, &sub_targets)?;
                    members.push(member);
                }
            }
        }

        info!(members = members.len(), "ensemble fitted");
        Ok(FittedEnsemble {
            mode: self.mode,
            members,
            label_order,
            report,
        })
    }
}

/// Search details for the most recent iteration.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SearchDetails {
    /// Out-of-bag fitness of the winning candidate.
    pub best_fitness: Fitness,
    /// Parameters of the winning candidate.
    pub best_params: ForestParams,
    /// Number of ensemble members fitted.
    pub num_fits: usize,
}

/// A fitted ensemble of forests sharing one mode.
#[derive(Debug, Clone)]
pub struct FittedEnsemble {
    mode: Mode,
    members: Vec<FittedForest>,
    label_order: Option<Vec<i64>>,
    report: Option<SearchReport>,
}

impl FittedEnsemble {
    /// The mode every member shares.
    #[must_use]
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// The fitted members, in fit order.
    #[must_use]
    pub fn members(&self) -> &[FittedForest] {
        &self.members
    }

    /// Training labels in first-appearance order, for classification.
    #[must_use]
    pub fn label_order(&self) -> Option<&[i64]> {
        self.label_order.as_deref()
    }

    /// The last iteration's search report, when a search was run.
    #[must_use]
    pub fn search_report(&self) -> Option<&SearchReport> {
        self.report.as_ref()
    }

    /// Search details for the most recent iteration.
    ///
    /// # Errors
    ///
    /// Returns [`SelectError::DetailsUnavailable`] when the ensemble was
    /// fitted with fixed parameters and no search ran.
    pub fn details(&self) -> Result<SearchDetails, SelectError> {
        let report = self.report.as_ref().ok_or(SelectError::DetailsUnavailable)?;
        Ok(SearchDetails {
            best_fitness: report.best.fitness,
            best_params: report.best.params.clone(),
            num_fits: self.members.len(),
        })
    }

    /// Predict targets for row-major `features`.
    ///
    /// Classification members vote with ties broken toward the label seen
    /// earliest in training; regression members average.
    pub fn predict(&self, features: &[Vec<f64>]) -> Result<Predictions, SelectError> {
        match self.mode {
            Mode::Classification => {
                let mut all = Vec::with_capacity(self.members.len());
                for member in &self.members {
                    let Predictions::Labels(labels) = member.predict(features)? else {
                        unreachable!("classification ensembles hold classification members");
                    };
                    all.push(labels);
                }
                let votes: Vec<&[i64]> = all.iter().map(Vec::as_slice).collect();
                let Some(order) = self.label_order.as_deref() else {
                    unreachable!("classification ensembles store a label order");
                };
                Ok(Predictions::Labels(tiebreaking_vote(&votes, order)?))
            }
            Mode::Regression => {
                let mut all = Vec::with_capacity(self.members.len());
                for member in &self.members {
                    let Predictions::Values(values) = member.predict(features)? else {
                        unreachable!("regression ensembles hold regression members");
                    };
                    all.push(values);
                }
                let values: Vec<&[f64]> = all.iter().map(Vec::as_slice).collect();
                Ok(Predictions::Values(mean_vote(&values)?))
            }
        }
    }

    /// Class probabilities from the first member only.
    ///
    /// This is not an ensemble average: the remaining members are ignored,
    /// so the result approximates the ensemble's confidence rather than
    /// reproducing its vote.
    ///
    /// # Errors
    ///
    /// Returns [`taiga_forest::ForestError::ProbaRequiresClassification`]
    /// (wrapped) for regression ensembles.
    pub fn predict_proba(&self, features: &[Vec<f64>]) -> Result<Vec<Vec<f64>>, SelectError> {
        Ok(self.members[0].predict_proba(features)?)
    }

    /// Feature importances of the first member only, same caveat as
    /// [`FittedEnsemble::predict_proba`].
    #[must_use]
    pub fn feature_importances(&self) -> &[f64] {
        self.members[0].feature_importances()
    }
}

#[cfg(test)]
mod tests {
    use taiga_forest::{ClassWeight, Family, ForestParams, Mode, Predictions, Targets};

    use super::EnsembleConfig;
    use crate::error::SelectError;
    use crate::grid::ParamGrid;

    fn blob_data() -> (Vec<Vec<f64>>, Targets) {
        let mut features = Vec::new();
        let mut labels = Vec::new();
        for i in 0..30 {
            features.push(vec![i as f64 * 0.1, 0.5]);
            labels.push(0);
        }
        for i in 0..30 {
            features.push(vec![10.0 + i as f64 * 0.1, 0.5]);
            labels.push(1);
        }
        for i in 0..30 {
            features.push(vec![20.0 + i as f64 * 0.1, 0.5]);
            labels.push(2);
        }
        (features, Targets::Labels(labels))
    }

    fn line_data() -> (Vec<Vec<f64>>, Targets) {
        let mut features = Vec::new();
        let mut values = Vec::new();
        for i in 0..80 {
            let x = i as f64 * 0.25;
            features.push(vec![x, 1.0]);
            values.push(3.0 * x);
        }
        (features, Targets::Values(values))
    }

    fn tiny_grid() -> ParamGrid {
        ParamGrid {
            families: vec![Family::RandomForest],
            n_trees: vec![40, 60],
            min_samples_leaf: vec![1],
            class_weights: vec![ClassWeight::Uniform],
            bootstrap: vec![true],
        }
    }

    fn accuracy(predicted: &Predictions, truth: &Targets) -> f64 {
        let predicted = predicted.as_labels().expect("label predictions");
        let truth = truth.as_labels().expect("label targets");
        let correct = predicted.iter().zip(truth).filter(|(p, t)| p == t).count();
        correct as f64 / truth.len() as f64
    }

    // --- configuration ---

    #[test]
    fn unknown_metric_rejected_at_construction() {
        assert!(matches!(
            EnsembleConfig::new("logLoss"),
            Err(SelectError::UnknownMetric { .. })
        ));
    }

    #[test]
    fn mode_follows_metric() {
        assert_eq!(
            EnsembleConfig::new("f1Macro").unwrap().mode(),
            Mode::Classification
        );
        assert_eq!(
            EnsembleConfig::new("meanSquaredError").unwrap().mode(),
            Mode::Regression
        );
    }

    #[test]
    fn zero_num_fits_rejected() {
        let (features, targets) = blob_data();
        let err = EnsembleConfig::new("accuracy")
            .unwrap()
            .with_num_fits(0)
            .fit(&features, &targets)
            .unwrap_err();
        assert!(matches!(err, SelectError::InvalidNumFits { num_fits: 0 }));
    }

    #[test]
    fn zero_parallelism_rejected() {
        let (features, targets) = blob_data();
        let err = EnsembleConfig::new("accuracy")
            .unwrap()
            .with_inner_threads(0)
            .fit(&features, &targets)
            .unwrap_err();
        assert!(matches!(err, SelectError::InvalidParallelism { degree: 0 }));
    }

    #[test]
    fn zero_subsample_bound_rejected() {
        let (features, targets) = blob_data();
        let err = EnsembleConfig::new("accuracy")
            .unwrap()
            .with_search_bound(0)
            .fit(&features, &targets)
            .unwrap_err();
        assert!(matches!(err, SelectError::InvalidSubsampleBound { bound: 0 }));
    }

    #[test]
    fn empty_grid_rejected() {
        let (features, targets) = blob_data();
        let mut grid = tiny_grid();
        grid.families.clear();
        let err = EnsembleConfig::new("accuracy")
            .unwrap()
            .with_param_grid(grid)
            .fit(&features, &targets)
            .unwrap_err();
        assert!(matches!(err, SelectError::EmptyGrid));
    }

    #[test]
    fn wrong_target_kind_rejected() {
        let (features, _) = blob_data();
        let values = Targets::Values(vec![0.0; features.len()]);
        let err = EnsembleConfig::new("accuracy")
            .unwrap()
            .fit(&features, &values)
            .unwrap_err();
        assert!(matches!(
            err,
            SelectError::Forest(taiga_forest::ForestError::TargetKindMismatch { .. })
        ));
    }

    // --- fixed-parameter fitting ---

    #[test]
    fn fixed_strategy_fits_members_without_details() {
        let (features, targets) = blob_data();
        let params = ForestParams::new(Family::RandomForest).with_n_trees(15);
        let ensemble = EnsembleConfig::new("accuracy")
            .unwrap()
            .with_fixed_params(params)
            .with_num_fits(3)
            .with_outer_threads(2)
            .fit(&features, &targets)
            .unwrap();

        assert_eq!(ensemble.members().len(), 3);
        assert!(matches!(
            ensemble.details(),
            Err(SelectError::DetailsUnavailable)
        ));

        let predictions = ensemble.predict(&features).unwrap();
        assert!(accuracy(&predictions, &targets) > 0.9);
    }

    #[test]
    fn fixed_strategy_stamps_config_seed() {
        let (features, targets) = blob_data();
        let params = ForestParams::new(Family::RandomForest)
            .with_n_trees(15)
            .with_seed(1234);
        // The config seed, not the params seed, controls the fit.
        let first = EnsembleConfig::new("accuracy")
            .unwrap()
            .with_fixed_params(params.clone())
            .with_seed(7)
            .with_outer_threads(2)
            .fit(&features, &targets)
            .unwrap();
        let second = EnsembleConfig::new("accuracy")
            .unwrap()
            .with_fixed_params(params.with_seed(5678))
            .with_seed(7)
            .with_outer_threads(2)
            .fit(&features, &targets)
            .unwrap();

        let preds1 = first.predict(&features).unwrap();
        let preds2 = second.predict(&features).unwrap();
        assert_eq!(preds1, preds2);
    }

    // --- grid-search fitting ---

    #[test]
    fn grid_strategy_reports_details() {
        let (features, targets) = blob_data();
        let ensemble = EnsembleConfig::new("accuracy")
            .unwrap()
            .with_param_grid(tiny_grid())
            .with_outer_threads(2)
            .fit(&features, &targets)
            .unwrap();

        let details = ensemble.details().unwrap();
        assert_eq!(details.num_fits, 1);
        assert!(details.best_fitness.value() > 0.8);
        assert_eq!(details.best_params.seed(), 42);

        let report = ensemble.search_report().unwrap();
        assert_eq!(report.n_candidates, 2);
        assert_eq!(report.search_rows, 90);
        assert_eq!(report.refit_rows, 90);
    }

    #[test]
    fn details_serialize_to_flat_json() {
        let (features, targets) = blob_data();
        let ensemble = EnsembleConfig::new("accuracy")
            .unwrap()
            .with_param_grid(tiny_grid())
            .with_outer_threads(2)
            .fit(&features, &targets)
            .unwrap();

        let value = serde_json::to_value(ensemble.details().unwrap()).unwrap();
        assert!(value["best_fitness"].is_number());
        assert_eq!(value["best_params"]["seed"], 42);
        assert_eq!(value["num_fits"], 1);
    }

    #[test]
    fn grid_strategy_predicts_well() {
        let (features, targets) = blob_data();
        let ensemble = EnsembleConfig::new("accuracy")
            .unwrap()
            .with_param_grid(tiny_grid())
            .with_outer_threads(2)
            .fit(&features, &targets)
            .unwrap();

        let predictions = ensemble.predict(&features).unwrap();
        assert!(accuracy(&predictions, &targets) > 0.9);
    }

    #[test]
    fn regression_ensemble_averages_members() {
        let (features, targets) = line_data();
        let params = ForestParams::new(Family::ExtraTrees).with_n_trees(20);
        let ensemble = EnsembleConfig::new("meanSquaredError")
            .unwrap()
            .with_fixed_params(params)
            .with_num_fits(3)
            .with_outer_threads(2)
            .fit(&features, &targets)
            .unwrap();

        let Predictions::Values(predicted) = ensemble.predict(&features).unwrap() else {
            panic!("expected values");
        };
        let truth = targets.as_values().unwrap();
        let mse: f64 = predicted
            .iter()
            .zip(truth)
            .map(|(p, t)| (p - t) * (p - t))
            .sum::<f64>()
            / truth.len() as f64;
        assert!(mse < 4.0, "mse = {mse}");
    }

    #[test]
    fn proba_comes_from_the_first_member() {
        let (features, targets) = blob_data();
        let params = ForestParams::new(Family::RandomForest).with_n_trees(15);
        let ensemble = EnsembleConfig::new("accuracy")
            .unwrap()
            .with_fixed_params(params)
            .with_num_fits(2)
            .with_outer_threads(2)
            .fit(&features, &targets)
            .unwrap();

        let proba = ensemble.predict_proba(&features).unwrap();
        assert_eq!(proba.len(), features.len());
        for row in &proba {
            assert_eq!(row.len(), 3);
            let sum: f64 = row.iter().sum();
            assert!((sum - 1.0).abs() < 1e-9);
        }
        assert_eq!(
            proba,
            ensemble.members()[0].predict_proba(&features).unwrap()
        );
    }

    #[test]
    fn predict_matches_member_vote() {
        let (features, targets) = blob_data();
        let params = ForestParams::new(Family::RandomForest).with_n_trees(15);
        let ensemble = EnsembleConfig::new("accuracy")
            .unwrap()
            .with_fixed_params(params)
            .with_num_fits(3)
            .with_outer_threads(2)
            .fit(&features, &targets)
            .unwrap();

        let member_votes: Vec<Vec<i64>> = ensemble
            .members()
            .iter()
            .map(|member| {
                member
                    .predict(&features)
                    .unwrap()
                    .as_labels()
                    .unwrap()
                    .to_vec()
            })
            .collect();
        let votes: Vec<&[i64]> = member_votes.iter().map(Vec::as_slice).collect();
        let resolved =
            crate::vote::tiebreaking_vote(&votes, ensemble.label_order().unwrap()).unwrap();

        let predicted = ensemble.predict(&features).unwrap();
        assert_eq!(predicted.as_labels().unwrap(), resolved.as_slice());
    }

    #[test]
    fn proba_rejected_for_regression() {
        let (features, targets) = line_data();
        let params = ForestParams::new(Family::ExtraTrees).with_n_trees(10);
        let ensemble = EnsembleConfig::new("rSquared")
            .unwrap()
            .with_fixed_params(params)
            .fit(&features, &targets)
            .unwrap();
        assert!(ensemble.predict_proba(&features).is_err());
    }

    #[test]
    fn label_order_follows_first_appearance() {
        let features = vec![vec![0.0], vec![1.0], vec![2.0], vec![3.0]];
        let targets = Targets::Labels(vec![5, 1, 5, 3]);
        let params = ForestParams::new(Family::RandomForest).with_n_trees(10);
        let ensemble = EnsembleConfig::new("accuracy")
            .unwrap()
            .with_fixed_params(params)
            .with_outer_threads(1)
            .fit(&features, &targets)
            .unwrap();

        assert_eq!(ensemble.label_order(), Some(&[5, 1, 3][..]));
    }

    #[test]
    fn deterministic_across_runs() {
        let (features, targets) = blob_data();
        let run = || {
            EnsembleConfig::new("f1Macro")
                .unwrap()
                .with_param_grid(tiny_grid())
                .with_num_fits(2)
                .with_outer_threads(2)
                .fit(&features, &targets)
                .unwrap()
        };

        let first = run().predict(&features).unwrap();
        let second = run().predict(&features).unwrap();
        assert_eq!(first, second);
    }
}
