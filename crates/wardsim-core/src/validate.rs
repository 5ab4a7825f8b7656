//! Shape checks for JSON entering the system from outside: AI responses and
//! locally cached entries. Everything is checked up front and turned into a
//! typed value or a typed error; nothing downstream reads raw JSON.

use serde_json::Value;

use crate::error::{CoreError, ValidationError};
use crate::models::cache::CacheEntry;

/// Every top-level key in `fields` must be present and non-null.
///
/// Reports all missing keys at once so they can be logged together.
pub fn require_fields(value: &Value, fields: &[&str]) -> Result<(), ValidationError> {
    let obj = value.as_object().ok_or(ValidationError::NotAnObject)?;
    let missing: Vec<String> = fields
        .iter()
        .filter(|f| obj.get(**f).is_none_or(Value::is_null))
        .map(|f| f.to_string())
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(ValidationError::MissingFields(missing))
    }
}

const CACHE_ENTRY_FIELDS: &[&str] = &["caseId", "conversation", "caseState", "lastUpdated"];

/// Validate a raw cache entry and convert it to a typed [`CacheEntry`].
pub fn cache_entry(value: Value) -> Result<CacheEntry, CoreError> {
    require_fields(&value, CACHE_ENTRY_FIELDS)?;

    if !value["conversation"].is_array() {
        return Err(ValidationError::MissingFields(vec!["conversation[]".into()]).into());
    }
    require_fields(&value["caseState"], &["caseId", "mode", "details"])?;

    let entry: CacheEntry = serde_json::from_value(value)?;
    if entry.case_id.is_empty() {
        return Err(ValidationError::Empty("caseId").into());
    }
    if entry.case_id != entry.case_state.case_id {
        return Err(ValidationError::CaseIdMismatch {
            entry: entry.case_id,
            state: entry.case_state.case_id,
        }
        .into());
    }

    Ok(entry)
}
