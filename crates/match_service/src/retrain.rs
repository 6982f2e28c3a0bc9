//! Debounced, single-flight background retraining
//!
//! Data mutations call [`RetrainOrchestrator::notify_mutation`], which never
//! blocks. A burst of mutations arms one debounce timer; when it fires the
//! job runs on the blocking pool unless a run already holds the admission
//! lock. Mutations that arrive while a run is in flight set a pending flag,
//! and the timer is re-armed once the run completes, so a burst during a
//! run produces exactly one follow-up run.
//!
//! States: idle, armed (timer waiting), running, plus the pending flag.

use chrono::{DateTime, Utc};
use organmatch_core::ModelStore;
use organmatch_trainer::train_model;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, error, info};

use crate::errors::{Result, ServiceError};
use crate::records::RecordSource;

/// Work performed by one retrain run. Runs on the blocking pool.
pub trait RetrainJob: Send + Sync + 'static {
    /// Success message, or the reason the run failed
    fn run(&self) -> anyhow::Result<String>;
}

/// Retrains from the current records with the persisted hyperparameters
pub struct SnapshotRetrainJob {
    records: Arc<dyn RecordSource>,
    store: ModelStore,
}

impl SnapshotRetrainJob {
    pub fn new(records: Arc<dyn RecordSource>, store: ModelStore) -> Self {
        Self { records, store }
    }
}

impl RetrainJob for SnapshotRetrainJob {
    fn run(&self) -> anyhow::Result<String> {
        let (donors, recipients) = self.records.snapshot();
        if donors.is_empty() || recipients.is_empty() {
            anyhow::bail!(
                "need both donors and recipients to retrain ({} donors, {} recipients)",
                donors.len(),
                recipients.len()
            );
        }

        match train_model(&donors, &recipients, &self.store, None)? {
            Some(outcome) => Ok(format!(
                "Model retrained on {} pairs ({} donors, {} recipients)",
                outcome.report.n_samples,
                donors.len(),
                recipients.len()
            )),
            None => anyhow::bail!("no donor/recipient pairs share an organ type"),
        }
    }
}

/// Outcome of the most recent run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrainStatus {
    pub success: bool,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl RetrainStatus {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Last published status, readable once and only while fresh
#[derive(Debug)]
pub struct StatusSlot {
    ttl: Duration,
    slot: Mutex<Option<(RetrainStatus, Instant)>>,
}

impl StatusSlot {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            slot: Mutex::new(None),
        }
    }

    pub fn publish(&self, status: RetrainStatus) {
        *self.slot.lock() = Some((status, Instant::now()));
    }

    /// Take the status if one was published within the TTL. Always clears.
    pub fn take_recent(&self) -> Option<RetrainStatus> {
        let (status, published) = self.slot.lock().take()?;
        (published.elapsed() <= self.ttl).then_some(status)
    }
}

/// Shared retrain state
///
/// `pending` also serializes the in-progress hand-off: it is held while a
/// run is admitted or released, so a mutation is either seen as pending by
/// the finishing run or arms a fresh timer itself.
struct RetrainContext {
    admission: Arc<AsyncMutex<()>>,
    pending: Mutex<bool>,
    in_progress: AtomicBool,
    timer: Mutex<Option<JoinHandle<()>>>,
    status: StatusSlot,
    completed_runs: AtomicU64,
}

struct Inner {
    ctx: RetrainContext,
    job: Arc<dyn RetrainJob>,
    debounce: Duration,
    runtime: Handle,
}

/// Coalescing retrain scheduler
#[derive(Clone)]
pub struct RetrainOrchestrator {
    inner: Arc<Inner>,
}

impl RetrainOrchestrator {
    /// Must be called from within a tokio runtime; tasks are spawned on it.
    pub fn new(job: Arc<dyn RetrainJob>, debounce: Duration, status_ttl: Duration) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|e| {
            ServiceError::Internal(format!("retrain orchestrator needs a tokio runtime: {e}"))
        })?;
        Ok(Self::with_runtime(job, debounce, status_ttl, runtime))
    }

    pub fn with_runtime(
        job: Arc<dyn RetrainJob>,
        debounce: Duration,
        status_ttl: Duration,
        runtime: Handle,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                ctx: RetrainContext {
                    admission: Arc::new(AsyncMutex::new(())),
                    pending: Mutex::new(false),
                    in_progress: AtomicBool::new(false),
                    timer: Mutex::new(None),
                    status: StatusSlot::new(status_ttl),
                    completed_runs: AtomicU64::new(0),
                },
                job,
                debounce,
                runtime,
            }),
        }
    }

    /// Record that the underlying data changed. Returns immediately.
    pub fn notify_mutation(&self) {
        let ctx = &self.inner.ctx;
        {
            let mut pending = ctx.pending.lock();
            if ctx.in_progress.load(Ordering::SeqCst) {
                *pending = true;
                debug!("Retrain in progress; marked pending");
                return;
            }
        }
        Inner::arm(&self.inner);
    }

    pub fn is_running(&self) -> bool {
        self.inner.ctx.in_progress.load(Ordering::SeqCst)
    }

    pub fn is_pending(&self) -> bool {
        *self.inner.ctx.pending.lock()
    }

    /// Number of runs that have finished, successfully or not
    pub fn completed_runs(&self) -> u64 {
        self.inner.ctx.completed_runs.load(Ordering::SeqCst)
    }

    /// Read and clear the last run's status, if still fresh.
    pub fn take_recent_status(&self) -> Option<RetrainStatus> {
        self.inner.ctx.status.take_recent()
    }

    /// Cancel an armed timer. A run already in flight finishes normally.
    pub fn cancel_pending_timer(&self) {
        if let Some(handle) = self.inner.ctx.timer.lock().take() {
            handle.abort();
        }
    }
}

impl Inner {
    /// Replace any armed timer with a fresh one.
    fn arm(this: &Arc<Self>) {
        let mut timer = this.ctx.timer.lock();
        if let Some(previous) = timer.take() {
            previous.abort();
        }

        let inner = Arc::clone(this);
        *timer = Some(this.runtime.spawn(async move {
            tokio::time::sleep(inner.debounce).await;
            Inner::fire(&inner);
        }));
        debug!("Retrain armed ({:?} debounce)", this.debounce);
    }

    /// Timer expiry: start a run if the admission lock is free, otherwise
    /// leave it pending. Never waits on the lock.
    fn fire(this: &Arc<Self>) {
        let ctx = &this.ctx;
        let mut pending = ctx.pending.lock();
        match Arc::clone(&ctx.admission).try_lock_owned() {
            Ok(guard) => {
                ctx.in_progress.store(true, Ordering::SeqCst);
                *pending = false;
                drop(pending);

                let inner = Arc::clone(this);
                this.runtime.spawn(async move {
                    inner.run(guard).await;
                });
            }
            Err(_) => {
                *pending = true;
                debug!("Retrain already running; deferring");
            }
        }
    }

    async fn run(self: Arc<Self>, guard: OwnedMutexGuard<()>) {
        info!("Starting background retrain");
        let job = Arc::clone(&self.job);
        let status = match tokio::task::spawn_blocking(move || job.run()).await {
            Ok(Ok(message)) => {
                info!("Background retrain finished: {}", message);
                RetrainStatus::success(message)
            }
            Ok(Err(e)) => {
                error!("Background retrain failed: {:#}", e);
                RetrainStatus::failure(format!("{e:#}"))
            }
            Err(join_err) => {
                let message = join_error_message(join_err);
                error!("Background retrain aborted: {}", message);
                RetrainStatus::failure(message)
            }
        };

        self.ctx.status.publish(status);

        let rerun = {
            let mut pending = self.ctx.pending.lock();
            self.ctx.in_progress.store(false, Ordering::SeqCst);
            drop(guard);
            std::mem::take(&mut *pending)
        };
        self.ctx.completed_runs.fetch_add(1, Ordering::SeqCst);
        if rerun {
            debug!("Mutations arrived during retrain; re-arming");
            Inner::arm(&self);
        }
    }
}

fn join_error_message(err: JoinError) -> String {
    if err.is_cancelled() {
        return "retrain task was cancelled".to_string();
    }
    match err.try_into_panic() {
        Ok(payload) => format!("retrain panicked: {}", panic_payload(payload.as_ref())),
        Err(err) => err.to_string(),
    }
}

fn panic_payload(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        *s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::MemoryRecords;
    use organmatch_core::{Donor, Recipient};

    #[test]
    fn test_status_slot_read_once() {
        let slot = StatusSlot::new(Duration::from_secs(30));
        assert!(slot.take_recent().is_none());

        slot.publish(RetrainStatus::success("done"));
        let status = slot.take_recent().unwrap();
        assert!(status.success);
        assert_eq!(status.message, "done");
        assert!(slot.take_recent().is_none());
    }

    #[test]
    fn test_status_slot_expires() {
        let slot = StatusSlot::new(Duration::from_millis(10));
        slot.publish(RetrainStatus::failure("boom"));
        std::thread::sleep(Duration::from_millis(40));
        assert!(slot.take_recent().is_none());
        // Expired statuses are cleared, not kept around
        assert!(slot.slot.lock().is_none());
    }

    #[test]
    fn test_snapshot_job_needs_both_sides() {
        let dir = tempfile::tempdir().unwrap();
        let store = ModelStore::new(dir.path().join("m.json"), dir.path().join("c.json"));
        let records = Arc::new(MemoryRecords::new());
        records.upsert_donor(Donor::new(1, "Kidney"));

        let job = SnapshotRetrainJob::new(records.clone(), store.clone());
        let err = job.run().unwrap_err().to_string();
        assert!(err.contains("need both donors and recipients"));

        records.upsert_recipient(Recipient::new(2, "Kidney"));
        let message = job.run().unwrap();
        assert!(message.contains("1 pairs"));
        assert!(store.has_model());
    }

    #[test]
    fn test_panic_payload() {
        assert_eq!(panic_payload(&"static"), "static");
        assert_eq!(panic_payload(&String::from("owned")), "owned");
        assert_eq!(panic_payload(&42u8), "unknown panic");
    }

    #[tokio::test]
    async fn test_new_inside_runtime() {
        struct Noop;
        impl RetrainJob for Noop {
            fn run(&self) -> anyhow::Result<String> {
                Ok(String::new())
            }
        }
        let orchestrator = RetrainOrchestrator::new(
            Arc::new(Noop),
            Duration::from_millis(10),
            Duration::from_secs(30),
        )
        .unwrap();
        assert!(!orchestrator.is_running());
        assert_eq!(orchestrator.completed_runs(), 0);
    }
}
