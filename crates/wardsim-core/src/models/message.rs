use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// One turn of the clerking transcript.
///
/// Conversation order is insertion order. Messages are never mutated after
/// they are created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Message {
    pub sender: Sender,
    pub text: String,
    pub timestamp: jiff::Timestamp,
    /// Disambiguates multi-speaker turns, e.g. a parent answering for a child.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaker_label: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum Sender {
    Student,
    Patient,
    Parent,
    System,
}

impl Message {
    pub fn new(sender: Sender, text: impl Into<String>) -> Self {
        Self {
            sender,
            text: text.into(),
            timestamp: jiff::Timestamp::now(),
            speaker_label: None,
        }
    }

    pub fn student(text: impl Into<String>) -> Self {
        Self::new(Sender::Student, text)
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Sender::System, text)
    }

    pub fn with_speaker(mut self, label: impl Into<String>) -> Self {
        self.speaker_label = Some(label.into());
        self
    }

    /// Label used when the message is rendered into a prompt or summary.
    pub fn speaker(&self) -> &str {
        if let Some(label) = &self.speaker_label {
            return label;
        }
        match self.sender {
            Sender::Student => "Student",
            Sender::Patient => "Patient",
            Sender::Parent => "Parent",
            Sender::System => "System",
        }
    }
}
