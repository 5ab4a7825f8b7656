//! Best-effort background persistence of a case to the remote store.
//!
//! A batch is an ordered list of named steps run strictly one after another.
//! A failing step is recorded and the batch moves on; nothing is thrown to
//! the caller, because the authoritative copy already lives in memory and
//! in the local cache. Progress is published on a watch channel both as a
//! single status line and as per-step detail.

use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex};

use futures::FutureExt;
use futures::future::BoxFuture;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use wardsim_core::models::case::CaseState;
use wardsim_core::models::progress::BatchSaveProgress;
use wardsim_storage::error::StorageError;
use wardsim_storage::remote::{FeedbackRecord, RemoteStore, ResultsRecord, StoreScope};

use crate::error::SessionError;

// ── Steps ────────────────────────────────────────────────────────────────────

type StepAction = Box<dyn FnOnce() -> BoxFuture<'static, Result<(), StorageError>> + Send>;

pub struct PersistStep {
    name: String,
    action: StepAction,
}

impl PersistStep {
    pub fn new<F, Fut>(name: impl Into<String>, action: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), StorageError>> + Send + 'static,
    {
        Self {
            name: name.into(),
            action: Box::new(move || action().boxed()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// The standard save order for a case: conversation, case state, results,
/// feedback, report. Results, feedback and report are skipped when there is
/// nothing to save.
pub fn case_save_steps(
    store: Arc<dyn RemoteStore>,
    scope: StoreScope,
    state: &CaseState,
) -> Vec<PersistStep> {
    let mut steps = Vec::with_capacity(5);

    {
        let (store, scope, messages) = (store.clone(), scope.clone(), state.messages.clone());
        steps.push(PersistStep::new("conversation", move || async move {
            store.save_conversation(&scope, &messages).await
        }));
    }
    steps.push(case_state_step(store.clone(), scope.clone(), state));
    if state.has_results() {
        let record = ResultsRecord {
            examination_results: state.examination_results.clone(),
            investigation_results: state.investigation_results.clone(),
        };
        let (store, scope) = (store.clone(), scope.clone());
        steps.push(PersistStep::new("results", move || async move {
            store.save_results(&scope, &record).await
        }));
    }
    if let Some(feedback) = &state.feedback {
        let record = FeedbackRecord::Simple {
            feedback: feedback.clone(),
        };
        steps.push(feedback_step(store.clone(), scope.clone(), record));
    }
    if let (Some(comprehensive), Some(report)) = (&state.comprehensive_feedback, &state.case_report) {
        let record = FeedbackRecord::Detailed {
            comprehensive_feedback: comprehensive.clone(),
            case_report: report.clone(),
        };
        steps.push(feedback_step(store, scope, record));
    }

    steps
}

pub fn case_state_step(store: Arc<dyn RemoteStore>, scope: StoreScope, state: &CaseState) -> PersistStep {
    let snapshot = state.clone();
    PersistStep::new("case state", move || async move {
        store.save_case_state(&scope, &snapshot).await
    })
}

/// A step saving `record`, named `feedback` or `report` by its kind.
pub fn feedback_step(store: Arc<dyn RemoteStore>, scope: StoreScope, record: FeedbackRecord) -> PersistStep {
    let name = match record {
        FeedbackRecord::Simple { .. } => "feedback",
        FeedbackRecord::Detailed { .. } => "report",
    };
    PersistStep::new(name, move || async move {
        store.save_feedback(&scope, &record).await
    })
}

// ── Status ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum SaveStatus {
    #[default]
    Idle,
    Saving,
    Saved,
    Failed { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    InProgress,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepRecord {
    pub name: String,
    pub status: StepStatus,
    pub detail: Option<String>,
}

/// Everything an indicator needs: the overall status, the step in flight,
/// and per-step outcomes of the current or last batch.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct SaveIndicator {
    pub case_id: Option<String>,
    pub status: SaveStatus,
    pub progress: Option<BatchSaveProgress>,
    pub steps: Vec<StepRecord>,
}

impl SaveIndicator {
    /// The single-line form of the indicator.
    pub fn message(&self) -> String {
        match &self.status {
            SaveStatus::Idle => String::new(),
            SaveStatus::Saving => match &self.progress {
                Some(p) => format!("Saving {} ({}/{})...", p.current_step, p.step_number, p.total_steps),
                None => "Saving...".to_string(),
            },
            SaveStatus::Saved => "All changes saved".to_string(),
            SaveStatus::Failed { message } => message.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReport {
    pub steps: Vec<StepRecord>,
}

impl BatchReport {
    pub fn failed(&self) -> usize {
        self.steps.iter().filter(|s| s.status == StepStatus::Failed).count()
    }

    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }
}

// ── Queue ────────────────────────────────────────────────────────────────────

pub struct BatchPersistenceQueue {
    indicator: watch::Sender<SaveIndicator>,
    in_flight: Mutex<HashSet<String>>,
}

impl Default for BatchPersistenceQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl BatchPersistenceQueue {
    pub fn new() -> Self {
        let (indicator, _) = watch::channel(SaveIndicator::default());
        Self {
            indicator,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<SaveIndicator> {
        self.indicator.subscribe()
    }

    pub fn indicator(&self) -> SaveIndicator {
        self.indicator.borrow().clone()
    }

    pub fn is_saving(&self, case_id: &str) -> bool {
        self.in_flight
            .lock()
            .is_ok_and(|running| running.contains(case_id))
    }

    /// Run `steps` in order. Only overlapping a running batch for the same
    /// case is an error; step failures are reported in the [`BatchReport`].
    pub async fn run(&self, case_id: &str, steps: Vec<PersistStep>) -> Result<BatchReport, SessionError> {
        let _guard = InFlightGuard::acquire(&self.in_flight, case_id)?;

        let total_steps = steps.len();
        let mut records: Vec<StepRecord> = steps
            .iter()
            .map(|s| StepRecord {
                name: s.name.clone(),
                status: StepStatus::Pending,
                detail: None,
            })
            .collect();

        self.indicator.send_replace(SaveIndicator {
            case_id: Some(case_id.to_string()),
            status: SaveStatus::Saving,
            progress: None,
            steps: records.clone(),
        });

        for (index, step) in steps.into_iter().enumerate() {
            records[index].status = StepStatus::InProgress;
            self.indicator.send_modify(|ind| {
                ind.progress = Some(BatchSaveProgress {
                    current_step: step.name.clone(),
                    step_number: index + 1,
                    total_steps,
                });
                ind.steps = records.clone();
            });
            info!(case_id, step = %step.name, step_number = index + 1, total_steps, "saving");

            match (step.action)().await {
                Ok(()) => records[index].status = StepStatus::Succeeded,
                Err(e) => {
                    warn!(case_id, step = %step.name, error = %e, "save step failed");
                    records[index].status = StepStatus::Failed;
                    records[index].detail = Some(e.to_string());
                }
            }
        }

        let report = BatchReport { steps: records };
        let status = match report.failed() {
            0 => SaveStatus::Saved,
            n => SaveStatus::Failed {
                message: format!(
                    "Couldn't save {n} of {total_steps} parts of your case. Your progress is kept on this device."
                ),
            },
        };
        self.indicator.send_modify(|ind| {
            ind.status = status;
            ind.progress = None;
            ind.steps = report.steps.clone();
        });
        info!(case_id, failed = report.failed(), total_steps, "batch save finished");

        Ok(report)
    }

    /// Run a batch on a background task.
    pub fn spawn(
        self: &Arc<Self>,
        case_id: impl Into<String>,
        steps: Vec<PersistStep>,
    ) -> JoinHandle<Result<BatchReport, SessionError>> {
        let queue = Arc::clone(self);
        let case_id = case_id.into();
        tokio::spawn(async move { queue.run(&case_id, steps).await })
    }
}

/// Marks a case as saving for as long as it is alive.
struct InFlightGuard<'a> {
    set: &'a Mutex<HashSet<String>>,
    case_id: String,
}

impl<'a> InFlightGuard<'a> {
    fn acquire(set: &'a Mutex<HashSet<String>>, case_id: &str) -> Result<Self, SessionError> {
        let mut running = set
            .lock()
            .map_err(|_| SessionError::Background("save queue lock poisoned".into()))?;
        if !running.insert(case_id.to_string()) {
            return Err(SessionError::SaveInProgress {
                case_id: case_id.to_string(),
            });
        }
        Ok(Self {
            set,
            case_id: case_id.to_string(),
        })
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut running) = self.set.lock() {
            running.remove(&self.case_id);
        }
    }
}
