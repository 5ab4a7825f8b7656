use serde::{Deserialize, Serialize};
use ts_rs::TS;

use super::feedback::{CaseReport, ComprehensiveFeedback, Feedback};
use super::message::Message;
use super::result::ClinicalResult;

/// The central aggregate for one simulated encounter.
///
/// `case_id` is assigned once at generation and never changes. `messages`
/// only grows during clerking; the result collections are replaced, never
/// appended to, when the results phase is re-run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct CaseState {
    pub case_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub mode: CaseMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<Department>,
    #[serde(default)]
    pub difficulty: Difficulty,
    pub details: CaseDetails,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub preliminary_diagnosis: String,
    #[serde(default)]
    pub examination_plan: String,
    #[serde(default)]
    pub investigation_plan: String,
    #[serde(default)]
    pub examination_results: Vec<ClinicalResult>,
    #[serde(default)]
    pub investigation_results: Vec<ClinicalResult>,
    #[serde(default)]
    pub final_diagnosis: String,
    #[serde(default)]
    pub management_plan: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<Feedback>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comprehensive_feedback: Option<ComprehensiveFeedback>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub case_report: Option<CaseReport>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Department {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subspecialty: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum Difficulty {
    Foundation,
    #[default]
    Standard,
    Advanced,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum CaseMode {
    Simulation,
    Practice,
    Osce,
}

/// What the generator produced for a new case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct CaseDetails {
    pub diagnosis: String,
    pub presenting_complaint: String,
    pub opening_line: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_profile: Option<PatientProfile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pediatric_profile: Option<PediatricProfile>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct PatientProfile {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sex: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub occupation: Option<String>,
}

/// Present for paediatric cases, where a parent may answer on the child's
/// behalf.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct PediatricProfile {
    pub age_description: String,
    pub parent_name: String,
    pub parent_relationship: String,
    #[serde(default)]
    pub child_can_speak: bool,
}

impl CaseState {
    /// A freshly generated case whose transcript holds a single system
    /// message carrying the opening line.
    pub fn seeded(
        case_id: String,
        session_id: Option<String>,
        mode: CaseMode,
        department: Option<Department>,
        difficulty: Difficulty,
        details: CaseDetails,
    ) -> Self {
        let opening = Message::system(details.opening_line.clone());
        Self {
            case_id,
            session_id,
            mode,
            department,
            difficulty,
            details,
            messages: vec![opening],
            preliminary_diagnosis: String::new(),
            examination_plan: String::new(),
            investigation_plan: String::new(),
            examination_results: Vec::new(),
            investigation_results: Vec::new(),
            final_diagnosis: String::new(),
            management_plan: String::new(),
            feedback: None,
            comprehensive_feedback: None,
            case_report: None,
        }
    }

    pub fn has_results(&self) -> bool {
        !self.examination_results.is_empty() || !self.investigation_results.is_empty()
    }
}
