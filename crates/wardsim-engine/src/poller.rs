//! Polls for generated OSCE follow-up questions.
//!
//! Readiness is checked once up front; if the questions are already cached
//! the poller is born `Ready` and never spawns a task. Otherwise a task ticks
//! on a fixed interval, re-checking readiness and refreshing the generation
//! status for display, until questions appear or the poller is stopped or
//! dropped. A `failed` status does not stop polling: the generator may still
//! be retrying.

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use wardsim_core::models::osce::{GenerationState, OsceGenerationStatus};

/// Where the poller reads readiness and generation status from.
pub trait FollowUpSource: Send + Sync {
    /// Whether questions for `case_id` are available locally.
    fn is_ready(&self, case_id: &str) -> bool;

    fn refresh_status<'a>(&'a self, case_id: &'a str) -> BoxFuture<'a, Option<OsceGenerationStatus>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Polling,
    Ready,
    /// The generator reported failure. Polling continues.
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollSnapshot {
    pub state: PollState,
    pub status: Option<OsceGenerationStatus>,
    pub ticks: u32,
}

pub struct FollowUpQuestionPoller {
    case_id: String,
    cancel: CancellationToken,
    snapshot: watch::Receiver<PollSnapshot>,
    task: Option<JoinHandle<()>>,
}

impl FollowUpQuestionPoller {
    pub fn start(source: Arc<dyn FollowUpSource>, case_id: impl Into<String>, interval: Duration) -> Self {
        let case_id = case_id.into();
        let cancel = CancellationToken::new();

        if source.is_ready(&case_id) {
            debug!(case_id = %case_id, "follow-up questions already cached");
            let (_tx, rx) = watch::channel(PollSnapshot {
                state: PollState::Ready,
                status: None,
                ticks: 0,
            });
            return Self {
                case_id,
                cancel,
                snapshot: rx,
                task: None,
            };
        }

        let (tx, rx) = watch::channel(PollSnapshot {
            state: PollState::Polling,
            status: None,
            ticks: 0,
        });
        let task = tokio::spawn(poll_loop(
            source,
            case_id.clone(),
            interval,
            tx,
            cancel.clone(),
        ));
        info!(case_id = %case_id, interval_ms = interval.as_millis() as u64, "polling for follow-up questions");

        Self {
            case_id,
            cancel,
            snapshot: rx,
            task: Some(task),
        }
    }

    pub fn case_id(&self) -> &str {
        &self.case_id
    }

    pub fn snapshot(&self) -> PollSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<PollSnapshot> {
        self.snapshot.clone()
    }

    pub fn is_ready(&self) -> bool {
        self.snapshot.borrow().state == PollState::Ready
    }

    /// Wait until questions are ready. Returns `false` if polling stopped
    /// first.
    pub async fn ready(&self) -> bool {
        let mut rx = self.snapshot.clone();
        match rx.wait_for(|s| s.state == PollState::Ready).await {
            Ok(_) => true,
            Err(_) => self.is_ready(),
        }
    }

    /// Stop polling. Idempotent.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Whether the background task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(JoinHandle::is_finished)
    }
}

impl Drop for FollowUpQuestionPoller {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn poll_loop(
    source: Arc<dyn FollowUpSource>,
    case_id: String,
    interval: Duration,
    tx: watch::Sender<PollSnapshot>,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut ticks = 0u32;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!(case_id = %case_id, ticks, "follow-up polling stopped");
                return;
            }
            _ = ticker.tick() => {}
        }
        ticks += 1;

        if source.is_ready(&case_id) {
            tx.send_modify(|s| {
                s.state = PollState::Ready;
                s.ticks = ticks;
            });
            info!(case_id = %case_id, ticks, "follow-up questions ready");
            return;
        }

        let status = source.refresh_status(&case_id).await;
        let state = match status.as_ref().map(|s| s.status) {
            Some(GenerationState::Failed) => PollState::Failed,
            _ => PollState::Polling,
        };
        debug!(case_id = %case_id, ticks, state = ?state, "follow-up poll tick");
        tx.send_modify(|s| {
            s.state = state;
            s.status = status;
            s.ticks = ticks;
        });
    }
}
