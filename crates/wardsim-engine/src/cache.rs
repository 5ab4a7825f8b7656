//! Local, non-authoritative mirror of in-progress cases.
//!
//! One directory holds three files per case:
//!
//! - `{case_id}.json`: the [`CacheEntry`] used to resume
//! - `{case_id}.questions.json`: generated OSCE follow-up questions
//! - `{case_id}.osce-status.json`: the question job's [`OsceGenerationStatus`]
//!
//! Reads never fail: a missing file is `None`, and a file that does not
//! parse or validate is logged, deleted and also `None`.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use futures::FutureExt;
use futures::future::BoxFuture;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use wardsim_core::models::cache::CacheEntry;
use wardsim_core::models::case::CaseState;
use wardsim_core::models::osce::{FollowUpQuestion, OsceGenerationStatus};
use wardsim_core::validate;

use crate::error::SessionError;
use crate::poller::FollowUpSource;

#[derive(Debug, Clone)]
pub struct LocalCaseCache {
    dir: PathBuf,
}

impl LocalCaseCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    // ── Case entries ─────────────────────────────────────────────────────

    pub fn save(&self, state: &CaseState) -> Result<(), SessionError> {
        let path = self.path(&state.case_id, "json")?;
        write_atomic(&path, &CacheEntry::from_state(state))?;
        debug!(case_id = %state.case_id, messages = state.messages.len(), "case cached locally");
        Ok(())
    }

    pub fn load(&self, case_id: &str) -> Option<CacheEntry> {
        let path = self.path(case_id, "json").ok()?;
        let raw = self.read_json(&path)?;

        match validate::cache_entry(raw) {
            Ok(entry) if entry.case_id == case_id => Some(entry),
            Ok(entry) => {
                warn!(case_id, found = %entry.case_id, "cache entry belongs to another case, discarding");
                discard(&path);
                None
            }
            Err(e) => {
                warn!(case_id, error = %e, "invalid cache entry, discarding");
                discard(&path);
                None
            }
        }
    }

    // ── OSCE follow-up ───────────────────────────────────────────────────

    pub fn save_questions(&self, case_id: &str, questions: &[FollowUpQuestion]) -> Result<(), SessionError> {
        write_atomic(&self.path(case_id, "questions.json")?, &questions)
    }

    pub fn load_questions(&self, case_id: &str) -> Option<Vec<FollowUpQuestion>> {
        self.load_typed(case_id, "questions.json")
    }

    pub fn save_generation_status(
        &self,
        case_id: &str,
        status: &OsceGenerationStatus,
    ) -> Result<(), SessionError> {
        write_atomic(&self.path(case_id, "osce-status.json")?, status)
    }

    pub fn load_generation_status(&self, case_id: &str) -> Option<OsceGenerationStatus> {
        self.load_typed(case_id, "osce-status.json")
    }

    /// Questions are ready once a non-empty set has been stored.
    pub fn questions_ready(&self, case_id: &str) -> bool {
        self.load_questions(case_id)
            .is_some_and(|questions| !questions.is_empty())
    }

    /// Remove every file for the case, including its generation status.
    pub fn clear(&self, case_id: &str) {
        for suffix in ["json", "questions.json", "osce-status.json"] {
            if let Ok(path) = self.path(case_id, suffix) {
                discard(&path);
            }
        }
        debug!(case_id, "local cache cleared");
    }

    // ── Helpers ──────────────────────────────────────────────────────────

    fn path(&self, case_id: &str, suffix: &str) -> Result<PathBuf, SessionError> {
        let safe = !case_id.is_empty()
            && case_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
            && !case_id.starts_with('.');
        if !safe {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("case id {case_id:?} is not usable as a file name"),
            )
            .into());
        }
        Ok(self.dir.join(format!("{case_id}.{suffix}")))
    }

    fn read_json(&self, path: &Path) -> Option<serde_json::Value> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to read cache file");
                return None;
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "corrupt cache file, discarding");
                discard(path);
                None
            }
        }
    }

    fn load_typed<T: DeserializeOwned>(&self, case_id: &str, suffix: &str) -> Option<T> {
        let path = self.path(case_id, suffix).ok()?;
        let raw = self.read_json(&path)?;
        match serde_json::from_value(raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(case_id, file = suffix, error = %e, "invalid cache file, discarding");
                discard(&path);
                None
            }
        }
    }
}

impl FollowUpSource for LocalCaseCache {
    fn is_ready(&self, case_id: &str) -> bool {
        self.questions_ready(case_id)
    }

    fn refresh_status<'a>(&'a self, case_id: &'a str) -> BoxFuture<'a, Option<OsceGenerationStatus>> {
        async move { self.load_generation_status(case_id) }.boxed()
    }
}

/// Write JSON to a temp file in the same directory, then rename over `path`.
fn write_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), SessionError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_vec_pretty(value)?;
    let tmp_path = path.with_extension("tmp");
    fs::write(&tmp_path, &json)?;
    fs::rename(&tmp_path, path)?;
    Ok(())
}

fn discard(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "failed to remove cache file"),
    }
}
