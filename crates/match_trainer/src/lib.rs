//! OrganMatch Trainer - deterministic random-forest training
//!
//! Grows bootstrap-aggregated Gini trees over organ-matching pairs and
//! persists the resulting model bundle. The same snapshot and seed always
//! produce the same forest.

pub mod cart;
pub mod dataset;
pub mod deterministic;
pub mod errors;
pub mod metrics;
pub mod pipeline;
pub mod trainer;

pub use cart::{CartBuilder, GrownTree, TreeConfig};
pub use dataset::Dataset;
pub use deterministic::{derive_seed, LcgRng};
pub use errors::TrainerError;
pub use metrics::{roc_auc, roc_curve, ClassMetrics, ClassificationReport, ConfusionMatrix, RocPoint};
pub use pipeline::{
    evaluate, prepare_data, split_for_evaluation, train_model, Evaluation, PreparedData,
    TrainOutcome, TrainingReport,
};
pub use trainer::{ForestConfig, ForestTrainer};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
