//! Matching service facade
//!
//! Owns the live records, model store, match history and retrain
//! orchestrator. Every data mutation notifies the orchestrator; scoring and
//! training read a consistent snapshot of the records.

use organmatch_core::{Donor, HyperParams, ModelStore, RecordId, Recipient};
use organmatch_trainer::{train_model, TrainOutcome};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::ServiceConfig;
use crate::errors::Result;
use crate::evaluation::{evaluate_model, ModelStatus};
use crate::history::{
    monthly_summary, MatchHistoryStore, MatchRecord, MemoryHistoryStore, MonthlySummary,
    SledHistoryStore,
};
use crate::predictor::{Prediction, Predictor};
use crate::records::{MemoryRecords, RecordSource};
use crate::retrain::{RetrainOrchestrator, RetrainStatus, SnapshotRetrainJob};
use crate::scorer::{CompatibilityScore, CompatibilityScorer};

/// What a training request reports back
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingSummary {
    pub n_samples: usize,
    pub n_train: usize,
    pub n_test: usize,
    pub positive_rate: f64,
    /// Held-out accuracy, when a test split existed
    pub accuracy: Option<f64>,
    pub roc_auc: Option<f64>,
    pub params: HyperParams,
    pub model_hash: String,
    /// Five most important features
    pub top_features: Vec<(String, f64)>,
}

impl From<TrainOutcome> for TrainingSummary {
    fn from(outcome: TrainOutcome) -> Self {
        let report = outcome.report;
        let evaluation = report.evaluation.as_ref();
        Self {
            n_samples: report.n_samples,
            n_train: report.n_train,
            n_test: report.n_test,
            positive_rate: report.positive_rate,
            accuracy: evaluation.map(|e| e.report.accuracy),
            roc_auc: evaluation.and_then(|e| e.roc_auc),
            params: report.params,
            model_hash: report.model_hash,
            top_features: outcome.bundle.ranked_importances().into_iter().take(5).collect(),
        }
    }
}

pub struct MatchingService {
    config: ServiceConfig,
    records: Arc<MemoryRecords>,
    store: ModelStore,
    history: Arc<dyn MatchHistoryStore>,
    predictor: Predictor,
    scorer: CompatibilityScorer,
    orchestrator: RetrainOrchestrator,
}

impl MatchingService {
    /// Build from configuration. Must be called inside a tokio runtime.
    pub fn new(config: ServiceConfig) -> Result<Self> {
        let history: Arc<dyn MatchHistoryStore> = match &config.history_db_path {
            Some(path) => {
                info!("Match history stored at {}", path.display());
                Arc::new(SledHistoryStore::new(path)?)
            }
            None => Arc::new(MemoryHistoryStore::new()),
        };
        Self::with_history(config, history)
    }

    pub fn with_history(config: ServiceConfig, history: Arc<dyn MatchHistoryStore>) -> Result<Self> {
        config.validate()?;
        let store = ModelStore::new(&config.model_path, &config.model_config_path);
        let records = Arc::new(MemoryRecords::new());

        let job = SnapshotRetrainJob::new(records.clone(), store.clone());
        let orchestrator =
            RetrainOrchestrator::new(Arc::new(job), config.debounce(), config.status_ttl())?;

        Ok(Self {
            predictor: Predictor::new(store.clone(), config.imputation),
            scorer: CompatibilityScorer::new(history.clone(), config.history_threshold),
            config,
            records,
            store,
            history,
            orchestrator,
        })
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn records(&self) -> &MemoryRecords {
        &self.records
    }

    pub fn model_store(&self) -> &ModelStore {
        &self.store
    }

    pub fn orchestrator(&self) -> &RetrainOrchestrator {
        &self.orchestrator
    }

    pub fn add_donor(&self, donor: Donor) {
        self.records.upsert_donor(donor);
        self.orchestrator.notify_mutation();
    }

    pub fn add_recipient(&self, recipient: Recipient) {
        self.records.upsert_recipient(recipient);
        self.orchestrator.notify_mutation();
    }

    pub fn update_donor_location(&self, id: RecordId, latitude: f64, longitude: f64) -> Result<()> {
        self.records.update_donor_location(id, latitude, longitude)?;
        self.orchestrator.notify_mutation();
        Ok(())
    }

    pub fn update_recipient_location(
        &self,
        id: RecordId,
        latitude: f64,
        longitude: f64,
    ) -> Result<()> {
        self.records
            .update_recipient_location(id, latitude, longitude)?;
        self.orchestrator.notify_mutation();
        Ok(())
    }

    /// Bulk load; notifies the orchestrator once.
    pub fn import_records(&self, donors: Vec<Donor>, recipients: Vec<Recipient>) {
        let (n_donors, n_recipients) = (donors.len(), recipients.len());
        for donor in donors {
            self.records.upsert_donor(donor);
        }
        for recipient in recipients {
            self.records.upsert_recipient(recipient);
        }
        info!("Imported {} donors and {} recipients", n_donors, n_recipients);
        self.orchestrator.notify_mutation();
    }

    /// Ranked compatibility scores for every organ-matching pair.
    ///
    /// Empty until a model exists. High scores are recorded in history.
    pub fn matches(&self) -> Result<Vec<CompatibilityScore>> {
        let (donors, recipients) = self.records.snapshot();
        let predictions = self.predictor.predict(&donors, &recipients)?;
        Ok(self.scorer.score(&predictions, self.records.as_ref()))
    }

    /// Top `top_n` ML predictions for one recipient.
    pub fn best_matches(&self, recipient_id: RecordId, top_n: usize) -> Result<Vec<Prediction>> {
        let (donors, recipients) = self.records.snapshot();
        self.predictor
            .best_matches(&donors, &recipients, recipient_id, top_n)
    }

    /// Train now on the current records. CPU-bound; blocks the caller.
    ///
    /// `Ok(None)` when the records yield no pairs.
    pub fn train(&self, override_params: Option<HyperParams>) -> Result<Option<TrainingSummary>> {
        let (donors, recipients) = self.records.snapshot();
        let outcome = train_model(&donors, &recipients, &self.store, override_params)?;
        Ok(outcome.map(TrainingSummary::from))
    }

    /// Validate and persist hyperparameters, then retrain if records exist.
    pub fn apply_settings(&self, params: HyperParams) -> Result<Option<TrainingSummary>> {
        params.validate()?;
        self.store.save_params(&params)?;
        info!("Saved hyperparameters to {}", self.store.config_path().display());

        if self.records.donor_count() == 0 || self.records.recipient_count() == 0 {
            warn!("Settings saved; retrain skipped until donors and recipients exist");
            return Ok(None);
        }
        self.train(Some(params))
    }

    pub fn evaluate(&self) -> Result<ModelStatus> {
        let (donors, recipients) = self.records.snapshot();
        evaluate_model(&self.store, &donors, &recipients)
    }

    /// Last background retrain result, read once.
    pub fn take_retrain_status(&self) -> Option<RetrainStatus> {
        self.orchestrator.take_recent_status()
    }

    pub fn match_history(&self) -> Result<Vec<MatchRecord>> {
        self.history.all()
    }

    pub fn monthly_summary(&self) -> Result<Vec<MonthlySummary>> {
        Ok(monthly_summary(&self.history.all()?))
    }
}
