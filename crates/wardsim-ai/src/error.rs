use thiserror::Error;
use wardsim_core::error::ValidationError;

use crate::service::Operation;

/// Prefix the service uses for non-retryable quota errors.
pub const QUOTA_EXCEEDED: &str = "QUOTA_EXCEEDED";

#[derive(Debug, Error)]
pub enum AiError {
    #[error("model invocation failed: {0}")]
    Invocation(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("{code}: {reason}")]
    QuotaExceeded { code: String, reason: String },

    #[error("service error: {0}")]
    Service(String),

    #[error("response parsing failed: {0}")]
    ResponseParse(String),

    #[error("{operation} response is missing required fields: {}", .missing.join(", "))]
    SchemaViolation {
        operation: Operation,
        missing: Vec<String>,
    },

    #[error("max retries exceeded after {attempts} attempts")]
    MaxRetriesExceeded {
        attempts: u32,
        #[source]
        last: Box<AiError>,
    },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("AWS config error: {0}")]
    Config(String),
}

impl AiError {
    /// Classify an error string returned in the service's `{ error }` object.
    ///
    /// `QUOTA_EXCEEDED: <reason>` is split on the first `": "` into a code and
    /// a user-facing reason.
    pub fn from_service_message(message: &str) -> Self {
        if message.starts_with(QUOTA_EXCEEDED) {
            let (code, reason) = match message.split_once(": ") {
                Some((code, reason)) => (code.to_string(), reason.to_string()),
                None => (message.to_string(), String::new()),
            };
            return AiError::QuotaExceeded { code, reason };
        }
        if looks_rate_limited(message) {
            return AiError::RateLimited(message.to_string());
        }
        AiError::Service(message.to_string())
    }

    /// Transient failures worth retrying: HTTP 429 or a rate-limit marker.
    pub fn is_rate_limited(&self) -> bool {
        match self {
            AiError::RateLimited(_) => true,
            AiError::Invocation(msg) | AiError::Service(msg) => looks_rate_limited(msg),
            _ => false,
        }
    }

    /// Text safe to show the learner.
    pub fn user_message(&self) -> String {
        match self {
            AiError::QuotaExceeded { reason, .. } if !reason.is_empty() => reason.clone(),
            AiError::QuotaExceeded { .. } => "You have reached your usage limit.".to_string(),
            AiError::RateLimited(_) | AiError::MaxRetriesExceeded { .. } => {
                "The simulator is busy right now. Please wait a moment and try again.".to_string()
            }
            AiError::SchemaViolation { .. } | AiError::ResponseParse(_) => {
                "The simulator returned an unexpected response. Please try again.".to_string()
            }
            AiError::Validation(e) => e.to_string(),
            AiError::Service(msg) => msg.clone(),
            _ => "Something went wrong. Please try again.".to_string(),
        }
    }
}

fn looks_rate_limited(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("429")
        || lower.contains("rate limit")
        || lower.contains("rate_limit")
        || lower.contains("ratelimit")
        || lower.contains("too many requests")
        || lower.contains("throttl")
}
