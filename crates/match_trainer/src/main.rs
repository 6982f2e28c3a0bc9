//! OrganMatch forest trainer CLI
//!
//! Trains a compatibility model from donor and recipient JSON snapshots.

use anyhow::{Context, Result};
use clap::Parser;
use organmatch_core::{Donor, HyperParams, ModelStore, Recipient};
use organmatch_trainer::train_model;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "organmatch-train")]
#[command(author = "OrganMatch Contributors")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Deterministic random-forest trainer for donor/recipient compatibility", long_about = None)]
struct Args {
    /// Donor snapshot (JSON array)
    #[arg(short, long)]
    donors: PathBuf,

    /// Recipient snapshot (JSON array)
    #[arg(short, long)]
    recipients: PathBuf,

    /// Model bundle output path
    #[arg(short, long, default_value = "models/random_forest.json")]
    model: PathBuf,

    /// Hyperparameter config path
    #[arg(short, long, default_value = "models/model_config.json")]
    config: PathBuf,

    /// Number of trees
    #[arg(long)]
    trees: Option<usize>,

    /// Maximum tree depth
    #[arg(long, conflicts_with = "unbounded_depth")]
    max_depth: Option<usize>,

    /// Grow trees without a depth limit
    #[arg(long)]
    unbounded_depth: bool,

    /// Minimum samples to split a node
    #[arg(long)]
    min_samples_split: Option<usize>,

    /// Minimum samples per leaf
    #[arg(long)]
    min_samples_leaf: Option<usize>,

    /// Write the training report as JSON
    #[arg(long)]
    report: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    /// Persisted params with any command-line flags laid over them.
    /// `None` when no flag was given.
    fn params_override(&self, store: &ModelStore) -> Option<HyperParams> {
        let any_flag = self.trees.is_some()
            || self.max_depth.is_some()
            || self.unbounded_depth
            || self.min_samples_split.is_some()
            || self.min_samples_leaf.is_some();
        if !any_flag {
            return None;
        }

        let mut params = store.load_params();
        if let Some(trees) = self.trees {
            params.n_estimators = trees;
        }
        if self.unbounded_depth {
            params.max_depth = None;
        } else if let Some(depth) = self.max_depth {
            params.max_depth = Some(depth);
        }
        if let Some(split) = self.min_samples_split {
            params.min_samples_split = split;
        }
        if let Some(leaf) = self.min_samples_leaf {
            params.min_samples_leaf = leaf;
        }
        Some(params)
    }
}

fn read_snapshot<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Failed to parse {}", path.display()))
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Setup logging
    let log_level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    info!("OrganMatch Forest Trainer v{}", env!("CARGO_PKG_VERSION"));

    let donors: Vec<Donor> = read_snapshot(&args.donors)?;
    let recipients: Vec<Recipient> = read_snapshot(&args.recipients)?;
    info!("Loaded {} donors and {} recipients", donors.len(), recipients.len());

    let store = ModelStore::new(&args.model, &args.config);
    let override_params = args.params_override(&store);
    if let Some(params) = &override_params {
        info!("Training configuration:");
        info!("  Trees: {}", params.n_estimators);
        match params.max_depth {
            Some(depth) => info!("  Max depth: {}", depth),
            None => info!("  Max depth: unbounded"),
        }
        info!("  Min samples to split: {}", params.min_samples_split);
        info!("  Min samples per leaf: {}", params.min_samples_leaf);
    }

    let Some(outcome) = train_model(&donors, &recipients, &store, override_params)
        .context("Training failed")?
    else {
        warn!("No organ-matching pairs; nothing was trained");
        return Ok(());
    };

    let report = &outcome.report;
    info!("Training complete!");
    info!("  Samples: {} ({} train / {} test)", report.n_samples, report.n_train, report.n_test);
    info!("  Positive rate: {:.3}", report.positive_rate);
    if let Some(eval) = &report.evaluation {
        info!("  Accuracy: {:.3}", eval.report.accuracy);
        info!("  Confusion matrix: {:?}", eval.confusion_matrix.0);
        if let Some(auc) = eval.roc_auc {
            info!("  ROC-AUC: {:.3}", auc);
        }
    }
    for (column, importance) in outcome.bundle.ranked_importances().iter().take(5) {
        info!("  {:<24} {:.4}", column, importance);
    }
    info!("  Model: {} ({})", store.model_path().display(), report.model_hash);

    if let Some(path) = &args.report {
        let json = serde_json::to_string_pretty(report).context("Failed to serialize report")?;
        std::fs::write(path, json).context("Failed to write report file")?;
        info!("  Report: {}", path.display());
    }

    Ok(())
}
