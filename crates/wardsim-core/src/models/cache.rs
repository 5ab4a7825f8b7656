use serde::{Deserialize, Serialize};

use super::case::CaseState;
use super::message::Message;

/// The local, non-authoritative mirror of an in-progress case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub case_id: String,
    pub conversation: Vec<Message>,
    pub case_state: CaseState,
    pub last_updated: jiff::Timestamp,
}

impl CacheEntry {
    pub fn from_state(state: &CaseState) -> Self {
        Self {
            case_id: state.case_id.clone(),
            conversation: state.messages.clone(),
            case_state: state.clone(),
            last_updated: jiff::Timestamp::now(),
        }
    }

    /// The cached case with the conversation restored into it.
    pub fn into_state(self) -> CaseState {
        let mut state = self.case_state;
        state.messages = self.conversation;
        state
    }
}
