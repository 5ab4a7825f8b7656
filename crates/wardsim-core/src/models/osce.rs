use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Progress of the background follow-up question job for one case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct OsceGenerationStatus {
    pub status: GenerationState,
    pub attempts: u32,
    pub max_attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum GenerationState {
    Pending,
    Retrying,
    Ready,
    Failed,
}

impl OsceGenerationStatus {
    pub fn pending(max_attempts: u32) -> Self {
        Self {
            status: GenerationState::Pending,
            attempts: 0,
            max_attempts,
            last_error: None,
        }
    }

    /// Count a failed attempt. Moves to `Retrying` while attempts remain,
    /// `Failed` once they are used up.
    pub fn record_failure(&mut self, error: impl Into<String>) {
        self.attempts += 1;
        self.last_error = Some(error.into());
        self.status = if self.attempts < self.max_attempts {
            GenerationState::Retrying
        } else {
            GenerationState::Failed
        };
    }

    pub fn mark_ready(&mut self) {
        self.attempts += 1;
        self.status = GenerationState::Ready;
        self.last_error = None;
    }
}

/// Configuration for an exam-style station.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct OsceStation {
    pub title: String,
    pub instructions: String,
    pub duration_secs: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct FollowUpQuestion {
    pub id: String,
    pub prompt: String,
    #[serde(default)]
    pub expected_points: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct FollowUpAnswer {
    pub question_id: String,
    pub answer: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct OsceEvaluation {
    pub score: u32,
    pub max_score: u32,
    pub summary: String,
    #[serde(default)]
    pub questions: Vec<QuestionScore>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct QuestionScore {
    pub question_id: String,
    pub score: u32,
    #[serde(default)]
    pub comment: String,
}
