use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Live progress of one batch save. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct BatchSaveProgress {
    pub current_step: String,
    pub step_number: usize,
    pub total_steps: usize,
}
