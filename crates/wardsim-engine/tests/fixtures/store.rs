use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use jiff::Timestamp;

use wardsim_core::models::case::CaseState;
use wardsim_core::models::message::Message;
use wardsim_storage::error::StorageError;
use wardsim_storage::remote::{
    BoxFuture, FeedbackRecord, RemoteStore, ResultsRecord, SessionRecord, SessionValidity,
    StoreScope,
};

/// In-memory remote store that records every write as `"<kind>:<case_id>"`.
#[derive(Default)]
pub struct MemoryStore {
    writes: Mutex<Vec<String>>,
    failing: Mutex<HashSet<&'static str>>,
    sessions: Mutex<HashMap<String, SessionRecord>>,
    states: Mutex<HashMap<String, CaseState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every write of `kind` fail.
    pub fn fail(self, kind: &'static str) -> Self {
        self.failing.lock().unwrap().insert(kind);
        self
    }

    pub fn writes(&self) -> Vec<String> {
        self.writes.lock().unwrap().clone()
    }

    pub fn kinds(&self) -> Vec<String> {
        self.writes()
            .into_iter()
            .filter_map(|w| w.split_once(':').map(|(kind, _)| kind.to_string()))
            .collect()
    }

    pub fn has_session(&self, case_id: &str) -> bool {
        self.sessions.lock().unwrap().contains_key(case_id)
    }

    pub fn forget_sessions(&self) {
        self.sessions.lock().unwrap().clear();
    }

    pub fn completed_state(&self, case_id: &str) -> Option<CaseState> {
        self.states.lock().unwrap().get(case_id).cloned()
    }

    fn record(&self, kind: &'static str, case_id: &str) -> Result<(), StorageError> {
        self.writes.lock().unwrap().push(format!("{kind}:{case_id}"));
        if self.failing.lock().unwrap().contains(kind) {
            return Err(StorageError::PutObject(format!("injected {kind} failure")));
        }
        Ok(())
    }
}

impl RemoteStore for MemoryStore {
    fn save_conversation<'a>(
        &'a self,
        scope: &'a StoreScope,
        _messages: &'a [Message],
    ) -> BoxFuture<'a, Result<(), StorageError>> {
        Box::pin(async move { self.record("conversation", &scope.case_id) })
    }

    fn save_case_state<'a>(
        &'a self,
        scope: &'a StoreScope,
        _case_state: &'a CaseState,
    ) -> BoxFuture<'a, Result<(), StorageError>> {
        Box::pin(async move { self.record("case_state", &scope.case_id) })
    }

    fn save_results<'a>(
        &'a self,
        scope: &'a StoreScope,
        _results: &'a ResultsRecord,
    ) -> BoxFuture<'a, Result<(), StorageError>> {
        Box::pin(async move { self.record("results", &scope.case_id) })
    }

    fn save_feedback<'a>(
        &'a self,
        scope: &'a StoreScope,
        feedback: &'a FeedbackRecord,
    ) -> BoxFuture<'a, Result<(), StorageError>> {
        let kind = match feedback {
            FeedbackRecord::Simple { .. } => "feedback",
            FeedbackRecord::Detailed { .. } => "report",
        };
        Box::pin(async move { self.record(kind, &scope.case_id) })
    }

    fn save_completed_case<'a>(
        &'a self,
        scope: &'a StoreScope,
        case_state: &'a CaseState,
    ) -> BoxFuture<'a, Result<(), StorageError>> {
        Box::pin(async move {
            self.record("completed", &scope.case_id)?;
            self.states
                .lock()
                .unwrap()
                .insert(scope.case_id.clone(), case_state.clone());
            Ok(())
        })
    }

    fn register_session<'a>(
        &'a self,
        record: &'a SessionRecord,
    ) -> BoxFuture<'a, Result<(), StorageError>> {
        Box::pin(async move {
            self.record("session", &record.case_id)?;
            self.sessions
                .lock()
                .unwrap()
                .insert(record.case_id.clone(), record.clone());
            Ok(())
        })
    }

    fn validate_case_session<'a>(
        &'a self,
        case_id: &'a str,
    ) -> BoxFuture<'a, Result<SessionValidity, StorageError>> {
        Box::pin(async move {
            let sessions = self.sessions.lock().unwrap();
            Ok(SessionValidity::of(sessions.get(case_id), Timestamp::now()))
        })
    }
}
