use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;

use wardsim_cli::driver::wait_for_follow_up;
use wardsim_core::models::osce::OsceGenerationStatus;
use wardsim_engine::poller::{FollowUpQuestionPoller, FollowUpSource};

/// Becomes ready after `ready_after` status refreshes.
struct Questions {
    ready_after: usize,
    refreshes: AtomicUsize,
    status: Option<OsceGenerationStatus>,
}

impl Questions {
    fn new(ready_after: usize, status: Option<OsceGenerationStatus>) -> Arc<Self> {
        Arc::new(Self {
            ready_after,
            refreshes: AtomicUsize::new(0),
            status,
        })
    }
}

impl FollowUpSource for Questions {
    fn is_ready(&self, _case_id: &str) -> bool {
        self.refreshes.load(Ordering::SeqCst) >= self.ready_after
    }

    fn refresh_status<'a>(&'a self, _case_id: &'a str) -> BoxFuture<'a, Option<OsceGenerationStatus>> {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        let status = self.status.clone();
        async move { status }.boxed()
    }
}

fn retrying() -> OsceGenerationStatus {
    let mut status = OsceGenerationStatus::pending(3);
    status.record_failure("model overloaded");
    status
}

fn given_up() -> OsceGenerationStatus {
    let mut status = OsceGenerationStatus::pending(2);
    status.record_failure("model overloaded");
    status.record_failure("model overloaded");
    status
}

#[tokio::test(start_paused = true)]
async fn waits_through_retries_until_questions_arrive() {
    let source = Questions::new(2, Some(retrying()));
    let poller = FollowUpQuestionPoller::start(source.clone(), "case-1", Duration::from_secs(2));

    assert!(wait_for_follow_up(&poller).await);
    assert_eq!(source.refreshes.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn stops_waiting_once_generation_gives_up() {
    let source = Questions::new(usize::MAX, Some(given_up()));
    let poller = FollowUpQuestionPoller::start(source.clone(), "case-1", Duration::from_secs(2));

    assert!(!wait_for_follow_up(&poller).await);
    assert_eq!(source.refreshes.load(Ordering::SeqCst), 1);
    poller.stop();
}

#[tokio::test(start_paused = true)]
async fn cached_questions_need_no_polling() {
    let source = Questions::new(0, None);
    let poller = FollowUpQuestionPoller::start(source.clone(), "case-1", Duration::from_secs(2));

    assert!(wait_for_follow_up(&poller).await);
    assert_eq!(source.refreshes.load(Ordering::SeqCst), 0);
}
