//! OrganMatch core: deterministic donor/recipient compatibility features
//!
//! Modules:
//! - `records`: donor and recipient snapshots
//! - `features`: raw clinical metrics (HLA, blood, freshness, distance, ...)
//! - `factors`: the ten bounded factor multipliers
//! - `pairs`: organ-matched pair enumeration, feature vectors and labels
//! - `matrix`: dense feature matrix with median imputation
//! - `forest`: random-forest classifier inference
//! - `params`: range-bounded hyperparameters and their config file
//! - `store`: atomic model bundle persistence
//! - `serde_canon`: canonical JSON hashing for bundles

pub mod errors;
pub mod factors;
pub mod features;
pub mod forest;
pub mod matrix;
pub mod pairs;
pub mod params;
pub mod records;
pub mod serde_canon;
pub mod store;

pub use errors::{CoreError, Result};
pub use factors::FactorSet;
pub use forest::{Forest, Node, Tree};
pub use matrix::FeatureMatrix;
pub use pairs::{build_labelled_pairs, build_pairs, FeatureVector, PairMetrics, FEATURE_COLUMNS};
pub use params::HyperParams;
pub use records::{Donor, RecordId, Recipient};
pub use store::{ModelBundle, ModelStore};

/// Crate version string
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Seed shared by the train/test split and forest bootstrap
pub const RANDOM_STATE: u64 = 42;

/// Fraction of samples held out for evaluation
pub const TEST_FRACTION: f64 = 0.2;

/// Minimum pair count for a held-out evaluation split
pub const MIN_SAMPLES_FOR_SPLIT: usize = 5;
