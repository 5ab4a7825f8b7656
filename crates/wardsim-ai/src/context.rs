//! Conversation context trimming for AI calls.
//!
//! Every call that carries conversation history goes through [`optimize`]
//! first. The most recent messages are kept verbatim; older history is
//! filtered down to clinically relevant turns and, for long transcripts,
//! collapsed into a marked summary block.
//!
//! This module is pure: no I/O, no hidden state.

use serde::Serialize;

use wardsim_core::models::case::{CaseDetails, CaseMode, CaseState, Department, PatientProfile, PediatricProfile};
use wardsim_core::models::message::{Message, Sender};

/// Messages always kept verbatim, newest last.
pub const RECENT_WINDOW: usize = 15;

/// Histories longer than this also get a summary of earlier turns.
pub const SUMMARY_THRESHOLD: usize = 20;

/// Upper bound on the number of earlier turns folded into the summary.
pub const SUMMARY_LIMIT: usize = 10;

/// Messages this close to the end survive the relevance filter regardless
/// of content.
pub const PROTECTED_TAIL: usize = 10;

pub const SUMMARY_START: &str = "[Summary of earlier conversation]";
pub const SUMMARY_END: &str = "[End of summary. Live conversation follows.]";

const SUMMARY_LINE_CHARS: usize = 200;

const MEDICAL_TERMS: &[&str] = &[
    "pain", "ache", "fever", "temperature", "cough", "breath", "wheez", "chest",
    "palpitation", "headache", "dizz", "faint", "nausea", "vomit", "diarrh",
    "constipat", "bleed", "blood", "rash", "itch", "swell", "lump", "weight",
    "appetite", "sleep", "tired", "fatigue", "urine", "urinat", "bowel", "stool",
    "heart", "pressure", "diabet", "asthma", "allerg", "medication", "medicine",
    "tablet", "dose", "surgery", "operation", "hospital", "smok", "alcohol",
    "drink", "drug", "family history", "pregnan", "period", "numb", "tingl",
    "weak", "vision", "hearing", "seizure", "injury", "fall", "symptom",
    "onset", "duration", "radiat", "sweat", "vaccin", "immunis", "feeding",
];

/// Case facts every AI turn needs regardless of how much history is sent.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EssentialInfo {
    pub mode: CaseMode,
    pub diagnosis: String,
    pub presenting_complaint: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub department: Option<Department>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patient_profile: Option<PatientProfile>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pediatric_profile: Option<PediatricProfile>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_summary: Option<String>,
}

/// The slice of a case the optimizer reads.
#[derive(Debug, Clone, Copy)]
pub struct CaseFacts<'a> {
    pub mode: CaseMode,
    pub details: &'a CaseDetails,
    pub department: Option<&'a Department>,
}

impl<'a> CaseFacts<'a> {
    pub fn of(state: &'a CaseState) -> Self {
        Self {
            mode: state.mode,
            details: &state.details,
            department: state.department.as_ref(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizedContext {
    pub recent_messages: Vec<Message>,
    pub essential_info: EssentialInfo,
}

/// Whether `text` mentions any recognised clinical vocabulary.
pub fn is_medically_relevant(text: &str) -> bool {
    let lower = text.to_lowercase();
    MEDICAL_TERMS.iter().any(|term| lower.contains(term))
}

/// Indices of the messages that survive the relevance filter, in order.
///
/// System messages and the last [`PROTECTED_TAIL`] positions are always
/// kept; anything else must be medically relevant.
pub fn relevant_indices(history: &[Message]) -> Vec<usize> {
    let tail_start = history.len().saturating_sub(PROTECTED_TAIL);
    history
        .iter()
        .enumerate()
        .filter(|(i, m)| {
            m.sender == Sender::System || *i >= tail_start || is_medically_relevant(&m.text)
        })
        .map(|(i, _)| i)
        .collect()
}

/// Summarise up to [`SUMMARY_LIMIT`] medically relevant messages between
/// the summary markers. Returns `None` when nothing qualifies.
pub fn summarize<'a>(messages: impl IntoIterator<Item = &'a Message>) -> Option<String> {
    let lines: Vec<String> = messages
        .into_iter()
        .filter(|m| is_medically_relevant(&m.text))
        .take(SUMMARY_LIMIT)
        .map(|m| format!("- {}: {}", m.speaker(), truncate(&m.text, SUMMARY_LINE_CHARS)))
        .collect();

    if lines.is_empty() {
        return None;
    }

    Some(format!("{SUMMARY_START}\n{}\n{SUMMARY_END}", lines.join("\n")))
}

/// Reduce `history` to a bounded, relevant slice plus essential case facts.
pub fn optimize(history: &[Message], facts: &CaseFacts<'_>) -> OptimizedContext {
    let mut essential_info = EssentialInfo {
        mode: facts.mode,
        diagnosis: facts.details.diagnosis.clone(),
        presenting_complaint: facts.details.presenting_complaint.clone(),
        department: facts.department.cloned(),
        patient_profile: facts.details.patient_profile.clone(),
        pediatric_profile: facts.details.pediatric_profile.clone(),
        conversation_summary: None,
    };

    if history.len() <= RECENT_WINDOW {
        return OptimizedContext {
            recent_messages: history.to_vec(),
            essential_info,
        };
    }

    let kept = relevant_indices(history);
    let recent = &kept[kept.len().saturating_sub(RECENT_WINDOW)..];

    if history.len() > SUMMARY_THRESHOLD {
        let first_recent = recent.first().copied().unwrap_or(history.len());
        essential_info.conversation_summary = summarize(&history[..first_recent]);
    }

    OptimizedContext {
        recent_messages: recent.iter().map(|&i| history[i].clone()).collect(),
        essential_info,
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}
