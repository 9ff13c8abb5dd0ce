//! ForestShield CLI Module
//!
//! Command-line interface for training, prediction, serving and dataset
//! inspection.

use clap::{Parser, Subcommand};
use colored::*;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::data::{self, class_counts, LabelSource};
use crate::feature_engineering::{FeatureSet, ThresholdScope};
use crate::inference::{PredictionRequest, PredictionResponse, RiskClassifier};
use crate::optimizer::SearchStrategy;
use crate::training::{TrainingConfig, TrainingPipeline};

// ─── Styling helpers ───────────────────────────────────────────────────────────

fn dim(s: &str) -> ColoredString   { s.truecolor(100, 100, 100) }
fn accent(s: &str) -> ColoredString { s.truecolor(120, 170, 255) }
fn muted(s: &str) -> ColoredString  { s.truecolor(140, 140, 140) }
fn ok(s: &str) -> ColoredString     { s.truecolor(100, 210, 120) }

fn step_run(msg: &str) {
    print!("  {} {}... ", accent("›"), msg);
}

fn step_done(detail: &str) {
    println!("{} {}", ok("done"), dim(detail));
}

fn section(title: &str) {
    println!();
    println!("  {}", title.white().bold());
    println!("  {}", dim(&"─".repeat(56)));
}

fn row(key: &str, val: impl std::fmt::Display) {
    println!("  {:<20} {}", muted(key), val.to_string().white());
}

fn fmt_opt(v: Option<f64>) -> String {
    v.map_or_else(|| "n/a".to_string(), |v| format!("{:.4}", v))
}

// ─── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "forestshield")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Wildfire risk classifier: training pipeline and prediction server")]
#[command(long_about = None)]
pub struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Train a classifier and persist its artifacts
    Train {
        /// Historical dataset (CSV)
        #[arg(short, long)]
        data: PathBuf,

        /// JSON training config; flags below override it
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Feature set (core, extended, extended_with_indicators)
        #[arg(short, long)]
        feature_set: Option<FeatureSet>,

        /// Output directory for the artifacts
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Decision threshold used for the test metrics
        #[arg(short, long)]
        threshold: Option<f64>,

        /// Number of cross-validation folds
        #[arg(long)]
        cv_folds: Option<usize>,

        /// Randomized search iterations
        #[arg(long, conflicts_with = "grid")]
        n_iter: Option<usize>,

        /// Exhaustive grid search instead of randomized search
        #[arg(long)]
        grid: bool,

        /// Fit quantile thresholds on the full dataset (leaks test rows)
        #[arg(long)]
        full_dataset_thresholds: bool,
    },

    /// Classify one record with a persisted model
    Predict {
        /// Directory holding the artifacts
        #[arg(short, long, default_value = "./outputs_forestshield")]
        model_dir: PathBuf,

        /// JSON object of feature values, or a path to a file containing one
        #[arg(short, long)]
        input: String,

        /// Decision threshold
        #[arg(short, long, default_value = "0.5")]
        threshold: f64,
    },

    /// Serve predictions over HTTP
    Serve {
        /// Directory holding the artifacts (defaults to MODEL_DIR)
        #[arg(short, long)]
        model_dir: Option<PathBuf>,

        /// Host to bind to (defaults to API_HOST)
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (defaults to API_PORT)
        #[arg(short, long)]
        port: Option<u16>,

        /// Decision threshold (defaults to DECISION_THRESHOLD)
        #[arg(short, long)]
        threshold: Option<f64>,
    },

    /// Show dataset information
    Info {
        /// Historical dataset (CSV)
        #[arg(short, long)]
        data: PathBuf,
    },
}

/// Initialise the tracing subscriber
pub fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "forestshield=info".into());
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

// ─── Commands ──────────────────────────────────────────────────────────────────

#[allow(clippy::too_many_arguments)]
pub fn cmd_train(
    data_path: &Path,
    config_path: Option<&Path>,
    feature_set: Option<FeatureSet>,
    output: Option<&Path>,
    threshold: Option<f64>,
    cv_folds: Option<usize>,
    n_iter: Option<usize>,
    grid: bool,
    full_dataset_thresholds: bool,
) -> anyhow::Result<()> {
    section("Train");

    let mut config = match config_path {
        Some(path) => TrainingConfig::from_json_file(path)?,
        None => TrainingConfig::default(),
    };
    if let Some(fs) = feature_set {
        config = config.with_feature_set(fs);
    }
    if let Some(dir) = output {
        config = config.with_output_dir(dir);
    }
    if let Some(t) = threshold {
        config = config.with_decision_threshold(t);
    }
    if let Some(folds) = cv_folds {
        config = config.with_cv_folds(folds);
    }
    if grid {
        config = config.with_search(SearchStrategy::Grid);
    } else if let Some(n) = n_iter {
        config = config.with_search(SearchStrategy::Randomized { n_iter: n });
    }
    if full_dataset_thresholds {
        config = config.with_threshold_scope(ThresholdScope::FullDataset);
    }
    config.validate()?;

    step_run("Loading data");
    let start = Instant::now();
    let dataset = data::load(data_path)?;
    step_done(&format!("{} rows in {:?}", dataset.n_rows(), start.elapsed()));

    step_run("Training");
    let start = Instant::now();
    let run = TrainingPipeline::new(config.clone()).run(&dataset)?;
    step_done(&format!("{:.1}s", start.elapsed().as_secs_f64()));

    let m = &run.metrics;
    println!();
    row("Features", m.features.join(", "));
    row("Train / test", format!("{} ({} balanced) / {}", m.n_train, m.n_train_balanced, m.n_test));
    row("CV score", format!("{:.4} ± {:.4}", m.cv_score, m.cv_std));
    row("Accuracy", fmt_opt(m.accuracy()));
    row("F1", fmt_opt(m.f1_score()));
    row("AUC", fmt_opt(m.auc_roc()));
    row(
        "Best params",
        format!(
            "n_estimators={} max_depth={:?} min_split={} min_leaf={} max_features={} class_weight={}",
            m.best_params.n_estimators,
            m.best_params.max_depth,
            m.best_params.min_samples_split,
            m.best_params.min_samples_leaf,
            m.best_params.max_features,
            m.best_params.class_weight
        ),
    );
    if let Some(err) = &m.evaluation_error {
        println!("  {} {}", "evaluation failed:".yellow(), err);
    }
    if !m.report.is_empty() {
        println!();
        for line in m.report.lines() {
            println!("  {}", line);
        }
    }
    println!();
    println!("  {} artifacts in {}", ok("✓"), config.output_dir.display());
    println!();
    Ok(())
}

pub fn cmd_predict(model_dir: &Path, input: &str, threshold: f64) -> anyhow::Result<()> {
    let text = if Path::new(input).is_file() {
        std::fs::read_to_string(input)?
    } else {
        input.to_string()
    };
    let request: PredictionRequest = serde_json::from_str(&text)?;

    let classifier = RiskClassifier::from_dir(model_dir, threshold)?;
    let response: PredictionResponse = classifier.predict(&request)?;
    println!("{}", serde_json::to_string(&response)?);
    Ok(())
}

pub fn cmd_info(data_path: &Path) -> anyhow::Result<()> {
    section("Data Info");

    let dataset = data::load(data_path)?;
    let values = dataset.values();

    row("File", data_path.display());
    row("Rows", dataset.n_rows());
    row("Label source", dataset.labels().column_name());
    if let LabelSource::Occurred(flags) = dataset.labels() {
        let counts: BTreeMap<i64, usize> = class_counts(flags);
        row(
            "Classes",
            format!(
                "0: {}  1: {}",
                counts.get(&0).copied().unwrap_or(0),
                counts.get(&1).copied().unwrap_or(0)
            ),
        );
    }
    println!();

    println!("  {:<20} {:>8} {:>12} {:>12}", muted("Column"), muted("Missing"), muted("Min"), muted("Max"));
    println!("  {}", dim(&"─".repeat(56)));
    for (j, column) in dataset.columns().iter().enumerate() {
        let col = values.column(j);
        let missing = col.iter().filter(|v| v.is_nan()).count();
        let observed = col.iter().copied().filter(|v| !v.is_nan());
        let (min, max) = observed.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });
        println!("  {:<20} {:>8} {:>12.3} {:>12.3}", column.name(), missing, min, max);
    }

    println!();
    Ok(())
}

pub async fn cmd_serve(
    model_dir: Option<PathBuf>,
    host: Option<String>,
    port: Option<u16>,
    threshold: Option<f64>,
) -> anyhow::Result<()> {
    use crate::server::{run_server, ServerConfig};

    let mut config = ServerConfig::from_env();
    if let Some(dir) = model_dir {
        config = config.with_model_dir(dir);
    }
    if let Some(h) = host {
        config = config.with_host(h);
    }
    if let Some(p) = port {
        config = config.with_port(p);
    }
    if let Some(t) = threshold {
        config = config.with_decision_threshold(t);
    }

    section("ForestShield server");
    row("Predict", format!("POST http://{}:{}/predecir", config.host, config.port));
    row("Health", format!("GET  http://{}:{}/health", config.host, config.port));
    row("Model dir", config.model_dir.display());
    println!("  {}", dim("ctrl+c to stop"));
    println!();

    run_server(config).await
}
