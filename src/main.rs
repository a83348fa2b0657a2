use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing::info;

use taiga_forest::{ClassWeight, Family, ForestParams, Mode, Predictions};
use taiga_select::{EnsembleConfig, Fitness, FittedEnsemble, Metric, ParamGrid};

mod dataset;

use dataset::TableReader;

#[derive(Parser)]
#[command(name = "taiga")]
#[command(about = "Ensemble model selection and prediction over bagged forests")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// RNG seed stamped on every model and subsample draw
    #[arg(long, default_value_t = 42, global = true)]
    seed: u64,

    /// Enable verbose (debug-level) logging
    #[arg(long, global = true)]
    verbose: bool,

    /// Suppress all output except errors
    #[arg(long, global = true)]
    quiet: bool,
}

/// Input table and scoring metric, shared by both commands.
#[derive(Args, Debug, Clone)]
struct DataArgs {
    /// Path to the training CSV file
    #[arg(long)]
    data: PathBuf,

    /// Name of the target column
    #[arg(long)]
    target: String,

    /// Scoring metric; its family decides classification vs regression
    #[arg(long)]
    metric: Metric,

    /// Optional holdout CSV, scored and predicted after fitting
    #[arg(long)]
    holdout: Option<PathBuf>,
}

/// Engine tuning shared by both commands.
#[derive(Args, Debug, Clone)]
struct EngineArgs {
    /// Number of ensemble members to fit
    #[arg(long, default_value_t = 1)]
    num_fits: usize,

    /// Row cap for candidate scoring and fixed fits
    #[arg(long, default_value_t = 100_000)]
    search_bound: usize,

    /// Row cap for the winner's refit
    #[arg(long, default_value_t = 1_500_000)]
    refit_bound: usize,

    /// Threads per forest while scoring candidates
    #[arg(long, default_value_t = 1)]
    inner_jobs: usize,

    /// Concurrent candidate evaluations (also refit parallelism)
    #[arg(long, default_value_t = 64)]
    outer_jobs: usize,
}

#[derive(Subcommand)]
enum Command {
    /// Search the hyperparameter grid and refit the winner
    Search {
        #[command(flatten)]
        data: DataArgs,

        #[command(flatten)]
        engine: EngineArgs,

        /// Override the tree-count axis of the grid (comma separated)
        #[arg(long, value_delimiter = ',')]
        n_trees: Option<Vec<usize>>,

        /// Override the leaf-minimum axis of the grid (comma separated)
        #[arg(long, value_delimiter = ',')]
        min_leaf: Option<Vec<usize>>,
    },

    /// Fit fixed hyperparameters, skipping the search
    Fit {
        #[command(flatten)]
        data: DataArgs,

        #[command(flatten)]
        engine: EngineArgs,

        /// Forest family: "random-forest" or "extra-trees"
        #[arg(long, default_value = "random-forest")]
        family: String,

        /// Number of trees per member
        #[arg(long, default_value_t = 100)]
        n_trees: usize,

        /// Minimum number of samples per leaf
        #[arg(long, default_value_t = 1)]
        min_leaf: usize,

        /// Class weighting: "uniform" or "balanced"
        #[arg(long, default_value = "uniform")]
        class_weight: String,

        /// Disable bootstrap resampling
        #[arg(long)]
        no_bootstrap: bool,
    },
}

// --- JSON stdout output structs ---

#[derive(Serialize)]
struct SearchOutput {
    metric: String,
    mode: Mode,
    n_samples: usize,
    n_features: usize,
    num_fits: usize,
    best_fitness: Fitness,
    best_params: ForestParams,
    n_candidates: usize,
    search_rows: usize,
    refit_rows: usize,
    holdout: Option<HoldoutOutput>,
}

#[derive(Serialize)]
struct FitOutput {
    metric: String,
    mode: Mode,
    n_samples: usize,
    n_features: usize,
    num_fits: usize,
    params: ForestParams,
    holdout: Option<HoldoutOutput>,
}

#[derive(Serialize)]
struct HoldoutOutput {
    n_rows: usize,
    fitness: Fitness,
    predictions: Predictions,
}

fn parse_family(s: &str) -> Result<Family> {
    match s {
        "random-forest" => Ok(Family::RandomForest),
        "extra-trees" => Ok(Family::ExtraTrees),
        other => anyhow::bail!("unknown family: {other} (expected random-forest or extra-trees)"),
    }
}

fn parse_class_weight(s: &str) -> Result<ClassWeight> {
    match s {
        "uniform" => Ok(ClassWeight::Uniform),
        "balanced" => Ok(ClassWeight::Balanced),
        other => anyhow::bail!("unknown class weight: {other} (expected uniform or balanced)"),
    }
}

fn build_config(metric: Metric, engine: &EngineArgs, seed: u64) -> Result<EnsembleConfig> {
    let config = EnsembleConfig::new(metric.name())?
        .with_num_fits(engine.num_fits)
        .with_search_bound(engine.search_bound)
        .with_refit_bound(engine.refit_bound)
        .with_inner_threads(engine.inner_jobs)
        .with_outer_threads(engine.outer_jobs)
        .with_seed(seed);
    Ok(config)
}

fn score_holdout(
    ensemble: &FittedEnsemble,
    metric: Metric,
    path: &std::path::Path,
    target: &str,
) -> Result<HoldoutOutput> {
    let table = TableReader::new(path, target, metric.mode())
        .read()
        .context("failed to read holdout CSV")?;
    let predictions = ensemble
        .predict(&table.features)
        .context("holdout prediction failed")?;
    let fitness = metric
        .score(&table.targets, &predictions)
        .context("holdout scoring failed")?;
    info!(n_rows = table.features.len(), %fitness, "holdout scored");
    Ok(HoldoutOutput {
        n_rows: table.features.len(),
        fitness,
        predictions,
    })
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match (cli.verbose, cli.quiet) {
        (true, _) => "debug",
        (_, true) => "error",
        _ => "info",
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Search {
            data,
            engine,
            n_trees,
            min_leaf,
        } => {
            let metric = data.metric;
            let mode = metric.mode();

            // 1. Read training table
            let table = TableReader::new(&data.data, &data.target, mode)
                .read()
                .context("failed to read training CSV")?;

            // 2. Build the grid, applying any axis overrides
            let mut grid = ParamGrid::default_for(mode);
            if let Some(n_trees) = n_trees {
                grid.n_trees = n_trees;
            }
            if let Some(min_leaf) = min_leaf {
                grid.min_samples_leaf = min_leaf;
            }
            info!(n_candidates = grid.len(), "grid prepared");

            // 3. Search and refit
            let config = build_config(metric, &engine, cli.seed)?
                .with_param_grid(grid);
            let ensemble = config
                .fit(&table.features, &table.targets)
                .context("grid search failed")?;

            let details = ensemble.details().context("search details unavailable")?;
            let report = ensemble
                .search_report()
                .context("search report unavailable")?;

            // 4. Score holdout if requested
            let holdout = match &data.holdout {
                Some(path) => Some(score_holdout(&ensemble, metric, path, &data.target)?),
                None => None,
            };

            // 5. Print summary
            let output = SearchOutput {
                metric: metric.name().to_string(),
                mode,
                n_samples: table.features.len(),
                n_features: table.feature_names.len(),
                num_fits: details.num_fits,
                best_fitness: details.best_fitness,
                best_params: details.best_params,
                n_candidates: report.n_candidates,
                search_rows: report.search_rows,
                refit_rows: report.refit_rows,
                holdout,
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }

        Command::Fit {
            data,
            engine,
            family,
            n_trees,
            min_leaf,
            class_weight,
            no_bootstrap,
        } => {
            let metric = data.metric;
            let mode = metric.mode();

            // 1. Read training table
            let table = TableReader::new(&data.data, &data.target, mode)
                .read()
                .context("failed to read training CSV")?;

            // 2. Assemble the fixed parameter point
            let params = ForestParams::new(parse_family(&family)?)
                .with_n_trees(n_trees)
                .with_min_samples_leaf(min_leaf)
                .with_class_weight(parse_class_weight(&class_weight)?)
                .with_bootstrap(!no_bootstrap);

            // 3. Fit the ensemble
            let config = build_config(metric, &engine, cli.seed)?
                .with_fixed_params(params.clone());
            let ensemble = config
                .fit(&table.features, &table.targets)
                .context("fixed-parameter fit failed")?;

            // 4. Score holdout if requested
            let holdout = match &data.holdout {
                Some(path) => Some(score_holdout(&ensemble, metric, path, &data.target)?),
                None => None,
            };

            // 5. Print summary
            let output = FitOutput {
                metric: metric.name().to_string(),
                mode,
                n_samples: table.features.len(),
                n_features: table.feature_names.len(),
                num_fits: ensemble.members().len(),
                params: params.with_seed(cli.seed),
                holdout,
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}
