use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Structured feedback returned alongside case completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Feedback {
    pub score: u32,
    pub summary: String,
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub improvements: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ComprehensiveFeedback {
    pub overall_score: u32,
    pub summary: String,
    #[serde(default)]
    pub domains: Vec<DomainScore>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct DomainScore {
    pub domain: String,
    pub score: u32,
    #[serde(default)]
    pub comment: String,
}

/// The narrative report assembled in the background after completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct CaseReport {
    pub title: String,
    pub narrative: String,
    #[serde(default)]
    pub sections: Vec<ReportSection>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ReportSection {
    pub heading: String,
    pub body: String,
}
