use std::time::Duration;

use jiff::SignedDuration;
use serde::{Deserialize, Serialize};

use wardsim_ai::retry::RetryPolicy;

/// Tunables for a case session. Every field has a default, so a partial
/// `engine` section in the config file is fine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Total attempts per AI call, including the first.
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    pub poll_interval_ms: u64,
    pub osce_duration_secs: u64,
    pub osce_auto_start_delay_ms: u64,
    pub question_generation_max_attempts: u32,
    pub session_ttl_mins: i64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_base_delay_ms: 1000,
            poll_interval_ms: 2000,
            osce_duration_secs: 300,
            osce_auto_start_delay_ms: 1500,
            question_generation_max_attempts: 3,
            session_ttl_mins: 240,
        }
    }
}

impl EngineSettings {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, Duration::from_millis(self.retry_base_delay_ms))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn osce_duration(&self) -> Duration {
        Duration::from_secs(self.osce_duration_secs)
    }

    pub fn osce_auto_start_delay(&self) -> Duration {
        Duration::from_millis(self.osce_auto_start_delay_ms)
    }

    pub fn session_ttl(&self) -> SignedDuration {
        SignedDuration::from_mins(self.session_ttl_mins)
    }
}
