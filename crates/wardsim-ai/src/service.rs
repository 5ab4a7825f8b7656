use std::fmt;
use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::AiError;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// The operations the generation service exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Operation {
    GenerateCase,
    PatientTurn,
    ExaminationResults,
    InvestigationResults,
    Feedback,
    DetailedFeedback,
    ComprehensiveFeedback,
    OsceQuestionGeneration,
    OsceEvaluation,
}

impl Operation {
    pub const ALL: [Operation; 9] = [
        Operation::GenerateCase,
        Operation::PatientTurn,
        Operation::ExaminationResults,
        Operation::InvestigationResults,
        Operation::Feedback,
        Operation::DetailedFeedback,
        Operation::ComprehensiveFeedback,
        Operation::OsceQuestionGeneration,
        Operation::OsceEvaluation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::GenerateCase => "generate-case",
            Operation::PatientTurn => "patient-turn",
            Operation::ExaminationResults => "examination-results",
            Operation::InvestigationResults => "investigation-results",
            Operation::Feedback => "feedback",
            Operation::DetailedFeedback => "detailed-feedback",
            Operation::ComprehensiveFeedback => "comprehensive-feedback",
            Operation::OsceQuestionGeneration => "osce-question-generation",
            Operation::OsceEvaluation => "osce-evaluation",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A black-box generation backend.
///
/// Implementations send the purpose-keyed JSON payload and return the raw
/// JSON body. Unwrapping the `{ error }` envelope and shape validation
/// happen in [`crate::operations`], so every backend is treated the same.
pub trait AiService: Send + Sync {
    fn invoke(&self, operation: Operation, payload: Value) -> BoxFuture<'_, Result<Value, AiError>>;
}

/// Turn an `{ "error": "..." }` body into the matching [`AiError`].
pub fn unwrap_envelope(body: Value) -> Result<Value, AiError> {
    if let Some(message) = body.get("error").and_then(Value::as_str) {
        return Err(AiError::from_service_message(message));
    }
    Ok(body)
}
