use std::fmt;

use serde::{Deserialize, Serialize};

use wardsim_core::models::case::CaseState;

/// Where a case is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CasePhase {
    #[default]
    Uninitialized,
    Generating,
    Clerking,
    AwaitingResults,
    ReviewingResults,
    Completing,
    Completed(FeedbackAvailability),
}

/// Whether structured feedback arrived with completion or must be fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackAvailability {
    Ready,
    Pending,
}

impl CasePhase {
    pub fn allowed_transitions(&self) -> &'static [CasePhase] {
        use CasePhase::*;
        use FeedbackAvailability::{Pending, Ready};
        match self {
            Uninitialized => &[Generating],
            Generating => &[Clerking, Uninitialized],
            Clerking => &[AwaitingResults],
            AwaitingResults => &[ReviewingResults, Clerking],
            ReviewingResults => &[AwaitingResults, Completing],
            Completing => &[Completed(Ready), Completed(Pending), ReviewingResults],
            Completed(Pending) => &[Completed(Ready)],
            Completed(Ready) => &[],
        }
    }

    pub fn can_transition_to(&self, target: CasePhase) -> bool {
        self.allowed_transitions().contains(&target)
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, CasePhase::Completed(_))
    }

    /// Phases in which the learner may talk to the patient.
    pub fn accepts_messages(&self) -> bool {
        matches!(self, CasePhase::Clerking | CasePhase::ReviewingResults)
    }

    /// Best guess at the phase a restored case was in, from its content.
    pub fn infer(state: &CaseState) -> CasePhase {
        if state.feedback.is_some() {
            CasePhase::Completed(FeedbackAvailability::Ready)
        } else if !state.final_diagnosis.trim().is_empty() && !state.management_plan.trim().is_empty() {
            CasePhase::Completed(FeedbackAvailability::Pending)
        } else if state.has_results() {
            CasePhase::ReviewingResults
        } else {
            CasePhase::Clerking
        }
    }
}

impl fmt::Display for CasePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Uninitialized => "uninitialized",
            Self::Generating => "generating",
            Self::Clerking => "clerking",
            Self::AwaitingResults => "awaiting results",
            Self::ReviewingResults => "reviewing results",
            Self::Completing => "completing",
            Self::Completed(FeedbackAvailability::Ready) => "completed",
            Self::Completed(FeedbackAvailability::Pending) => "completed (feedback pending)",
        };
        f.write_str(s)
    }
}
