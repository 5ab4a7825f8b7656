use thiserror::Error;

use wardsim_ai::error::AiError;
use wardsim_core::error::{CoreError, ValidationError};
use wardsim_storage::error::StorageError;

use crate::controller::ResultsSummary;
use crate::phase::CasePhase;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("cannot {action} while the case is {phase}")]
    InvalidPhase {
        action: &'static str,
        phase: CasePhase,
    },

    #[error(transparent)]
    Ai(#[from] AiError),

    /// Some results were generated and committed; the rest failed.
    #[error("only part of the requested results were generated: {source}")]
    PartialResults {
        committed: ResultsSummary,
        #[source]
        source: AiError,
    },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("a save is already running for case {case_id}")]
    SaveInProgress { case_id: String },

    #[error("background task failed: {0}")]
    Background(String),

    #[error("{0} is only available for OSCE cases")]
    NotOsce(&'static str),

    #[error("follow-up questions for case {case_id} are not ready")]
    QuestionsNotReady { case_id: String },
}

impl SessionError {
    /// Text safe to show the learner.
    pub fn user_message(&self) -> String {
        match self {
            SessionError::Ai(e) => e.user_message(),
            SessionError::PartialResults { source, .. } => {
                format!("Some results could not be generated. {}", source.user_message())
            }
            SessionError::Validation(e) => e.to_string(),
            SessionError::InvalidPhase { .. } | SessionError::NotOsce(_) => self.to_string(),
            SessionError::QuestionsNotReady { .. } => {
                "Follow-up questions are still being prepared.".to_string()
            }
            SessionError::SaveInProgress { .. } => {
                "Your case is still being saved. Please wait a moment.".to_string()
            }
            _ => "Something went wrong. Please try again.".to_string(),
        }
    }

    /// `(code, reason)` when the failure is a quota rejection.
    pub fn quota(&self) -> Option<(&str, &str)> {
        match self {
            SessionError::Ai(AiError::QuotaExceeded { code, reason })
            | SessionError::PartialResults {
                source: AiError::QuotaExceeded { code, reason },
                ..
            } => Some((code.as_str(), reason.as_str())),
            _ => None,
        }
    }
}
