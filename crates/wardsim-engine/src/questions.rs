//! Background generation of OSCE follow-up questions.
//!
//! The job records an [`OsceGenerationStatus`] in the local cache before the
//! first attempt and after every attempt, so a poller can show progress.
//! Questions are written before the status flips to `ready`.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{info, warn};

use wardsim_ai::operations::{self, QuestionGenerationRequest};
use wardsim_ai::retry::RetryPolicy;
use wardsim_ai::service::AiService;
use wardsim_core::models::osce::{GenerationState, OsceGenerationStatus};

use crate::cache::LocalCaseCache;

pub struct QuestionGenerationJob {
    ai: Arc<dyn AiService>,
    cache: Arc<LocalCaseCache>,
    max_attempts: u32,
    backoff: RetryPolicy,
}

impl QuestionGenerationJob {
    pub fn new(
        ai: Arc<dyn AiService>,
        cache: Arc<LocalCaseCache>,
        max_attempts: u32,
        backoff: RetryPolicy,
    ) -> Self {
        Self {
            ai,
            cache,
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    pub fn spawn(self, request: QuestionGenerationRequest) -> JoinHandle<OsceGenerationStatus> {
        tokio::spawn(self.run(request))
    }

    pub async fn run(self, request: QuestionGenerationRequest) -> OsceGenerationStatus {
        let case_id = request.case_id.clone();
        let mut status = OsceGenerationStatus::pending(self.max_attempts);
        self.record(&case_id, &status);

        loop {
            match operations::osce_questions(self.ai.as_ref(), &request).await {
                Ok(questions) if !questions.is_empty() => {
                    if let Err(e) = self.cache.save_questions(&case_id, &questions) {
                        warn!(case_id = %case_id, error = %e, "failed to cache follow-up questions");
                        status.record_failure(e.to_string());
                    } else {
                        status.mark_ready();
                        info!(case_id = %case_id, count = questions.len(), attempts = status.attempts, "follow-up questions generated");
                    }
                }
                Ok(_) => status.record_failure("no questions returned"),
                Err(e) => {
                    warn!(case_id = %case_id, attempt = status.attempts + 1, error = %e, "follow-up question generation failed");
                    status.record_failure(e.to_string());
                }
            }
            self.record(&case_id, &status);

            if status.status != GenerationState::Retrying {
                return status;
            }
            tokio::time::sleep(self.backoff.delay_for(status.attempts - 1)).await;
        }
    }

    fn record(&self, case_id: &str, status: &OsceGenerationStatus) {
        if let Err(e) = self.cache.save_generation_status(case_id, status) {
            warn!(case_id, error = %e, "failed to record generation status");
        }
    }
}
