use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// A generated examination or investigation finding.
///
/// The `type` discriminant decides which fields are populated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(tag = "type", rename_all = "snake_case")]
#[ts(export)]
pub enum ClinicalResult {
    Quantitative(QuantitativeResult),
    Descriptive(DescriptiveResult),
}

pub type ExaminationResult = ClinicalResult;
pub type InvestigationResult = ClinicalResult;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct QuantitativeResult {
    pub name: String,
    pub value: f64,
    pub unit: String,
    pub reference_range: ReferenceRange,
    #[serde(default)]
    pub status: ResultStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ReferenceRange {
    pub low: f64,
    pub high: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub enum ResultStatus {
    #[default]
    Normal,
    High,
    Low,
    /// Only ever assigned by the generator.
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct DescriptiveResult {
    pub name: String,
    pub findings: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub impression: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommendation: Option<String>,
    #[serde(default)]
    pub abnormal_flags: Vec<String>,
    #[serde(default)]
    pub urgency: Urgency,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum Urgency {
    #[default]
    Routine,
    Urgent,
    Emergent,
}

impl ResultStatus {
    /// Normal within `[low, high]`, High above, Low below.
    pub fn derive(value: f64, range: ReferenceRange) -> Self {
        if value > range.high {
            ResultStatus::High
        } else if value < range.low {
            ResultStatus::Low
        } else {
            ResultStatus::Normal
        }
    }
}

impl QuantitativeResult {
    /// The status used for display and scoring. A generator-assigned
    /// `Critical` is kept as-is; everything else is recomputed from the range.
    pub fn effective_status(&self) -> ResultStatus {
        match self.status {
            ResultStatus::Critical => ResultStatus::Critical,
            _ => ResultStatus::derive(self.value, self.reference_range),
        }
    }
}

impl ClinicalResult {
    pub fn name(&self) -> &str {
        match self {
            ClinicalResult::Quantitative(q) => &q.name,
            ClinicalResult::Descriptive(d) => &d.name,
        }
    }

    /// Replace any non-critical quantitative status with the one derived from
    /// its reference range.
    pub fn normalized(self) -> Self {
        match self {
            ClinicalResult::Quantitative(mut q) => {
                q.status = q.effective_status();
                ClinicalResult::Quantitative(q)
            }
            other => other,
        }
    }

    pub fn is_abnormal(&self) -> bool {
        match self {
            ClinicalResult::Quantitative(q) => q.effective_status() != ResultStatus::Normal,
            ClinicalResult::Descriptive(d) => {
                !d.abnormal_flags.is_empty() || d.urgency != Urgency::Routine
            }
        }
    }
}
