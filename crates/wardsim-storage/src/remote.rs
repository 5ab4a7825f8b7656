//! Remote case persistence.
//!
//! Every write is keyed by a [`StoreScope`] and wrapped in a
//! [`StoredDocument`] envelope carrying the scope and a save timestamp, so an
//! auditor can reconstruct who saved what and when from the bucket alone.
//! Writes are plain overwrites: nothing here locks, and callers must not
//! overlap saves for the same case.

use std::future::Future;
use std::pin::Pin;

use aws_sdk_s3::Client;
use jiff::{SignedDuration, Timestamp};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use wardsim_core::models::case::CaseState;
use wardsim_core::models::feedback::{CaseReport, ComprehensiveFeedback, Feedback};
use wardsim_core::models::message::Message;
use wardsim_core::models::result::ClinicalResult;
use wardsim_core::store_keys;

use crate::error::StorageError;
use crate::{objects, state};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

// ── Types ────────────────────────────────────────────────────────────────────

/// Who a save belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreScope {
    pub user_email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_country: Option<String>,
    pub case_id: String,
}

impl StoreScope {
    pub fn new(user_email: impl Into<String>, user_country: Option<String>, case_id: impl Into<String>) -> Self {
        Self {
            user_email: user_email.into(),
            user_country,
            case_id: case_id.into(),
        }
    }

    fn check(&self) -> Result<(), StorageError> {
        if self.user_email.trim().is_empty() {
            return Err(StorageError::InvalidScope("user email is empty".into()));
        }
        if self.case_id.trim().is_empty() {
            return Err(StorageError::InvalidScope("case id is empty".into()));
        }
        Ok(())
    }
}

/// Envelope written around every persisted document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredDocument<T> {
    #[serde(flatten)]
    pub scope: StoreScope,
    pub saved_at: Timestamp,
    pub data: T,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultsRecord {
    pub examination_results: Vec<ClinicalResult>,
    pub investigation_results: Vec<ClinicalResult>,
}

/// Either the quick structured feedback or the full background report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FeedbackRecord {
    Simple {
        feedback: Feedback,
    },
    #[serde(rename_all = "camelCase")]
    Detailed {
        comprehensive_feedback: ComprehensiveFeedback,
        case_report: CaseReport,
    },
}

impl FeedbackRecord {
    /// Simple feedback and the full report live in separate objects.
    pub fn object_key(&self, scope: &StoreScope) -> String {
        match self {
            Self::Simple { .. } => store_keys::feedback(&scope.user_email, &scope.case_id),
            Self::Detailed { .. } => store_keys::report(&scope.user_email, &scope.case_id),
        }
    }
}

/// Server-side record used to decide whether a case can be resumed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub case_id: String,
    pub session_id: String,
    pub expires_at: Timestamp,
}

impl SessionRecord {
    pub fn starting_now(case_id: &str, session_id: &str, ttl: SignedDuration) -> Self {
        Self {
            case_id: case_id.to_string(),
            session_id: session_id.to_string(),
            expires_at: Timestamp::now().checked_add(ttl).unwrap_or(Timestamp::MAX),
        }
    }

    pub fn is_valid_at(&self, now: Timestamp) -> bool {
        now < self.expires_at
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionValidity {
    pub is_valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl SessionValidity {
    pub fn invalid() -> Self {
        Self {
            is_valid: false,
            session_id: None,
        }
    }

    /// Validity of an optional record at `now`. A missing or expired record
    /// is invalid.
    pub fn of(record: Option<&SessionRecord>, now: Timestamp) -> Self {
        match record {
            Some(r) if r.is_valid_at(now) => Self {
                is_valid: true,
                session_id: Some(r.session_id.clone()),
            },
            _ => Self::invalid(),
        }
    }
}

// ── Store contract ───────────────────────────────────────────────────────────

/// Durable per-case persistence. Each call is independent: a failure never
/// rolls back an earlier save.
pub trait RemoteStore: Send + Sync {
    fn save_conversation<'a>(
        &'a self,
        scope: &'a StoreScope,
        messages: &'a [Message],
    ) -> BoxFuture<'a, Result<(), StorageError>>;

    fn save_case_state<'a>(
        &'a self,
        scope: &'a StoreScope,
        case_state: &'a CaseState,
    ) -> BoxFuture<'a, Result<(), StorageError>>;

    fn save_results<'a>(
        &'a self,
        scope: &'a StoreScope,
        results: &'a ResultsRecord,
    ) -> BoxFuture<'a, Result<(), StorageError>>;

    fn save_feedback<'a>(
        &'a self,
        scope: &'a StoreScope,
        feedback: &'a FeedbackRecord,
    ) -> BoxFuture<'a, Result<(), StorageError>>;

    /// Persist the final case at completion.
    fn save_completed_case<'a>(
        &'a self,
        scope: &'a StoreScope,
        case_state: &'a CaseState,
    ) -> BoxFuture<'a, Result<(), StorageError>>;

    fn register_session<'a>(
        &'a self,
        record: &'a SessionRecord,
    ) -> BoxFuture<'a, Result<(), StorageError>>;

    fn validate_case_session<'a>(
        &'a self,
        case_id: &'a str,
    ) -> BoxFuture<'a, Result<SessionValidity, StorageError>>;
}

// ── S3 implementation ────────────────────────────────────────────────────────

pub struct S3CaseStore {
    client: Client,
    bucket: String,
}

impl S3CaseStore {
    pub fn new(client: Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Case ids with anything saved for `user_email`, sorted.
    pub async fn list_case_ids(&self, user_email: &str) -> Result<Vec<String>, StorageError> {
        let prefix = store_keys::user_cases_prefix(user_email);
        let keys = objects::list_objects(&self.client, &self.bucket, &prefix).await?;

        let mut ids: Vec<String> = keys
            .iter()
            .filter_map(|key| key.strip_prefix(&prefix))
            .filter_map(|rest| rest.split_once('/').map(|(id, _)| id.to_string()))
            .collect();
        ids.sort();
        ids.dedup();
        Ok(ids)
    }

    async fn put_document<T: Serialize>(
        &self,
        scope: &StoreScope,
        key: String,
        data: &T,
    ) -> Result<(), StorageError> {
        scope.check()?;
        let document = StoredDocument {
            scope: scope.clone(),
            saved_at: Timestamp::now(),
            data,
        };
        state::save_state(&self.client, &self.bucket, &key, &document).await?;
        debug!(case_id = %scope.case_id, key = %key, "saved case document");
        Ok(())
    }
}

impl RemoteStore for S3CaseStore {
    fn save_conversation<'a>(
        &'a self,
        scope: &'a StoreScope,
        messages: &'a [Message],
    ) -> BoxFuture<'a, Result<(), StorageError>> {
        Box::pin(async move {
            let key = store_keys::conversation(&scope.user_email, &scope.case_id);
            self.put_document(scope, key, &messages).await
        })
    }

    fn save_case_state<'a>(
        &'a self,
        scope: &'a StoreScope,
        case_state: &'a CaseState,
    ) -> BoxFuture<'a, Result<(), StorageError>> {
        Box::pin(async move {
            let key = store_keys::case_state(&scope.user_email, &scope.case_id);
            self.put_document(scope, key, case_state).await
        })
    }

    fn save_results<'a>(
        &'a self,
        scope: &'a StoreScope,
        results: &'a ResultsRecord,
    ) -> BoxFuture<'a, Result<(), StorageError>> {
        Box::pin(async move {
            let key = store_keys::results(&scope.user_email, &scope.case_id);
            self.put_document(scope, key, results).await
        })
    }

    fn save_feedback<'a>(
        &'a self,
        scope: &'a StoreScope,
        feedback: &'a FeedbackRecord,
    ) -> BoxFuture<'a, Result<(), StorageError>> {
        Box::pin(async move {
            self.put_document(scope, feedback.object_key(scope), feedback).await
        })
    }

    fn save_completed_case<'a>(
        &'a self,
        scope: &'a StoreScope,
        case_state: &'a CaseState,
    ) -> BoxFuture<'a, Result<(), StorageError>> {
        Box::pin(async move {
            let key = store_keys::completed_case(&scope.user_email, &scope.case_id);
            self.put_document(scope, key, case_state).await?;
            info!(case_id = %scope.case_id, "completed case persisted");
            Ok(())
        })
    }

    fn register_session<'a>(
        &'a self,
        record: &'a SessionRecord,
    ) -> BoxFuture<'a, Result<(), StorageError>> {
        Box::pin(async move {
            let key = store_keys::session(&record.case_id);
            state::save_state(&self.client, &self.bucket, &key, record).await?;
            debug!(case_id = %record.case_id, expires_at = %record.expires_at, "session registered");
            Ok(())
        })
    }

    fn validate_case_session<'a>(
        &'a self,
        case_id: &'a str,
    ) -> BoxFuture<'a, Result<SessionValidity, StorageError>> {
        Box::pin(async move {
            let key = store_keys::session(case_id);
            let record: Option<SessionRecord> =
                state::load_state_opt(&self.client, &self.bucket, &key).await?;
            let validity = SessionValidity::of(record.as_ref(), Timestamp::now());
            debug!(case_id, is_valid = validity.is_valid, "session validated");
            Ok(validity)
        })
    }
}
