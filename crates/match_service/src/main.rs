//! OrganMatch command line interface
//!
//! Loads donor and recipient snapshots into the matching service and runs
//! one operation, printing JSON to stdout.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use organmatch_core::{Donor, HyperParams, Recipient};
use organmatch_service::{MatchingService, ServiceConfig};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "organmatch")]
#[command(about = "Donor/recipient compatibility scoring", long_about = None)]
#[command(version)]
struct Cli {
    /// TOML service configuration
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct Snapshot {
    /// Donor snapshot (JSON array)
    #[arg(short, long)]
    donors: PathBuf,

    /// Recipient snapshot (JSON array)
    #[arg(short, long)]
    recipients: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Score every organ-matching pair
    Score(Snapshot),
    /// Best donors for one recipient
    Best {
        #[command(flatten)]
        snapshot: Snapshot,
        /// Recipient id
        #[arg(long)]
        recipient: i64,
        /// Number of matches to return
        #[arg(long, default_value = "5")]
        top: usize,
    },
    /// Train the model now
    Train(Snapshot),
    /// Save hyperparameters and retrain if data exists
    Settings {
        #[command(flatten)]
        snapshot: Snapshot,
        #[arg(long, default_value = "100")]
        n_estimators: usize,
        /// Omit for unbounded depth
        #[arg(long)]
        max_depth: Option<usize>,
        #[arg(long, default_value = "5")]
        min_samples_split: usize,
        #[arg(long, default_value = "2")]
        min_samples_leaf: usize,
    },
    /// Report metrics for the stored model
    Evaluate(Snapshot),
    /// Recorded matches and their monthly summary
    History,
}

fn read_snapshot<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Failed to parse {}", path.display()))
}

fn load(service: &MatchingService, snapshot: &Snapshot) -> Result<()> {
    let donors: Vec<Donor> = read_snapshot(&snapshot.donors)?;
    let recipients: Vec<Recipient> = read_snapshot(&snapshot.recipients)?;
    service.import_records(donors, recipients);
    // One-shot commands do their own training; no background retrain
    service.orchestrator().cancel_pending_timer();
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let cli = Cli::parse();
    let config = ServiceConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    info!("OrganMatch v{}", env!("CARGO_PKG_VERSION"));

    let service = MatchingService::new(config).context("Failed to start matching service")?;

    match cli.command {
        Commands::Score(snapshot) => {
            load(&service, &snapshot)?;
            print_json(&service.matches()?)?;
        }
        Commands::Best {
            snapshot,
            recipient,
            top,
        } => {
            load(&service, &snapshot)?;
            print_json(&service.best_matches(recipient, top)?)?;
        }
        Commands::Train(snapshot) => {
            load(&service, &snapshot)?;
            match service.train(None)? {
                Some(summary) => print_json(&summary)?,
                None => info!("No organ-matching pairs; nothing trained"),
            }
        }
        Commands::Settings {
            snapshot,
            n_estimators,
            max_depth,
            min_samples_split,
            min_samples_leaf,
        } => {
            load(&service, &snapshot)?;
            let params = HyperParams {
                n_estimators,
                max_depth,
                min_samples_split,
                min_samples_leaf,
            };
            if let Some(summary) = service.apply_settings(params)? {
                print_json(&summary)?;
            }
        }
        Commands::Evaluate(snapshot) => {
            load(&service, &snapshot)?;
            print_json(&service.evaluate()?)?;
        }
        Commands::History => {
            print_json(&service.match_history()?)?;
            print_json(&service.monthly_summary()?)?;
        }
    }

    Ok(())
}

/// `RUST_LOG` if set, otherwise `info`
fn init_logging() {
    let env = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(env)),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
