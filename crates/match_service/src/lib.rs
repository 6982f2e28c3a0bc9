//! OrganMatch service: compatibility scoring and background retraining
//!
//! - `predictor`: ML probabilities from the stored forest
//! - `scorer`: factor-adjusted final scores and match history writes
//! - `history`: append-only match records (memory or sled)
//! - `evaluation`: metrics for the stored model on current data
//! - `retrain`: debounced, single-flight retrain orchestration
//! - `service`: the facade tying records, model and history together

pub mod config;
pub mod errors;
pub mod evaluation;
pub mod history;
pub mod predictor;
pub mod records;
pub mod retrain;
pub mod scorer;
pub mod service;

pub use config::{ImputationSource, ServiceConfig};
pub use errors::{Result, ServiceError};
pub use evaluation::{evaluate_model, FeatureImportance, ModelMetrics, ModelStatus};
pub use history::{
    monthly_summary, MatchHistoryStore, MatchRecord, MemoryHistoryStore, MonthlySummary,
    SledHistoryStore,
};
pub use predictor::{Prediction, Predictor};
pub use records::{MemoryRecords, RecordSource};
pub use retrain::{RetrainJob, RetrainOrchestrator, RetrainStatus, SnapshotRetrainJob, StatusSlot};
pub use scorer::{final_score, CompatibilityScore, CompatibilityScorer, FactorBreakdown};
pub use service::{MatchingService, TrainingSummary};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Round half away from zero to 2 decimals
pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
