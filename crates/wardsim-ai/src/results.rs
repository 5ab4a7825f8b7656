//! Concurrent examination/investigation result generation.
//!
//! Both plans are requested at once, each under its own retry budget, and
//! the coordinator waits for both to settle. An empty plan is never sent.
//!
//! The fan-in keeps each half's outcome separately: if one side succeeds and
//! the other fails, the caller still gets the successful results to commit
//! before the joint failure is reported.

use tracing::{info, warn};

use wardsim_core::error::ValidationError;
use wardsim_core::models::result::ClinicalResult;

use crate::context::EssentialInfo;
use crate::error::AiError;
use crate::operations::{self, ResultsRequest};
use crate::retry::{self, RetryPolicy};
use crate::service::AiService;

/// A learner's plan submission with blank fields dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanSubmission {
    examination: Option<String>,
    investigation: Option<String>,
}

impl PlanSubmission {
    /// Rejects a submission where both plans are blank.
    pub fn new(examination: &str, investigation: &str) -> Result<Self, ValidationError> {
        let non_blank = |s: &str| {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        };
        let submission = Self {
            examination: non_blank(examination),
            investigation: non_blank(investigation),
        };
        if submission.examination.is_none() && submission.investigation.is_none() {
            return Err(ValidationError::EmptyPlans);
        }
        Ok(submission)
    }

    pub fn examination(&self) -> Option<&str> {
        self.examination.as_deref()
    }

    pub fn investigation(&self) -> Option<&str> {
        self.investigation.as_deref()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultKind {
    Examination,
    Investigation,
}

/// Settled outcome of both halves. `None` means no request was issued.
#[derive(Debug)]
pub struct ResultsFanIn {
    pub examination: Option<Result<Vec<ClinicalResult>, AiError>>,
    pub investigation: Option<Result<Vec<ClinicalResult>, AiError>>,
}

impl ResultsFanIn {
    pub fn requested(&self) -> usize {
        usize::from(self.examination.is_some()) + usize::from(self.investigation.is_some())
    }

    pub fn succeeded(&self) -> usize {
        let ok = |r: &Option<Result<_, _>>| usize::from(matches!(r, Some(Ok(_))));
        ok(&self.examination) + ok(&self.investigation)
    }

    pub fn is_complete_success(&self) -> bool {
        self.succeeded() == self.requested()
    }

    /// Split into successful halves and the first failure, if any.
    pub fn into_parts(self) -> (Vec<(ResultKind, Vec<ClinicalResult>)>, Option<AiError>) {
        let mut committed = Vec::new();
        let mut failure = None;

        for (kind, outcome) in [
            (ResultKind::Examination, self.examination),
            (ResultKind::Investigation, self.investigation),
        ] {
            match outcome {
                Some(Ok(results)) => committed.push((kind, results)),
                Some(Err(e)) if failure.is_none() => failure = Some(e),
                Some(Err(e)) => warn!(?kind, error = %e, "additional results failure"),
                None => {}
            }
        }

        (committed, failure)
    }
}

pub struct ResultsCoordinator<'a> {
    ai: &'a dyn AiService,
    policy: RetryPolicy,
}

impl<'a> ResultsCoordinator<'a> {
    pub fn new(ai: &'a dyn AiService, policy: RetryPolicy) -> Self {
        Self { ai, policy }
    }

    /// Issue one request per non-blank plan, concurrently, and wait for both.
    pub async fn fetch(
        &self,
        case_id: &str,
        session_id: Option<&str>,
        submission: &PlanSubmission,
        essential_info: &EssentialInfo,
    ) -> ResultsFanIn {
        let request_for = |plan: &str| ResultsRequest {
            case_id: case_id.to_string(),
            session_id: session_id.map(str::to_string),
            plan: plan.to_string(),
            essential_info: essential_info.clone(),
        };
        let exam_request = submission.examination().map(request_for);
        let inv_request = submission.investigation().map(request_for);

        let examination = async {
            match &exam_request {
                Some(req) => Some(
                    retry::invoke(&self.policy, || operations::examination_results(self.ai, req))
                        .await,
                ),
                None => None,
            }
        };
        let investigation = async {
            match &inv_request {
                Some(req) => Some(
                    retry::invoke(&self.policy, || operations::investigation_results(self.ai, req))
                        .await,
                ),
                None => None,
            }
        };

        let (examination, investigation) = tokio::join!(examination, investigation);
        let fan_in = ResultsFanIn {
            examination,
            investigation,
        };

        info!(
            case_id,
            requested = fan_in.requested(),
            succeeded = fan_in.succeeded(),
            "results fan-in settled"
        );
        fan_in
    }
}
