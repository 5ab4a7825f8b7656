//! Typed wrappers over [`AiService::invoke`].
//!
//! Each wrapper serializes a request, unwraps the `{ error }` envelope,
//! checks the response's required fields at the trust boundary, then
//! deserializes the typed result. Missing fields are logged together and
//! surface as [`AiError::SchemaViolation`]; they are never retried.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use wardsim_core::error::ValidationError;
use wardsim_core::models::case::{CaseDetails, CaseMode, CaseState, Department, Difficulty};
use wardsim_core::models::feedback::{CaseReport, ComprehensiveFeedback, Feedback};
use wardsim_core::models::message::{Message, Sender};
use wardsim_core::models::osce::{FollowUpAnswer, FollowUpQuestion, OsceEvaluation, OsceStation};
use wardsim_core::models::result::ClinicalResult;
use wardsim_core::validate;

use crate::context::{EssentialInfo, OptimizedContext};
use crate::error::AiError;
use crate::service::{AiService, Operation, unwrap_envelope};

// ── Case generation ──────────────────────────────────────────────────────────

/// What the learner chose on the case-selection screen, addressed by the
/// ids the caller minted for the new case.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateCaseRequest {
    pub case_id: String,
    pub session_id: String,
    pub mode: CaseMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub department: Option<Department>,
    pub difficulty: Difficulty,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub station: Option<OsceStation>,
}

/// Generated case content. Ids echoed back by the service are ignored.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedCase {
    #[serde(flatten)]
    pub details: CaseDetails,
}

pub async fn generate_case(
    ai: &dyn AiService,
    request: &GenerateCaseRequest,
) -> Result<GeneratedCase, AiError> {
    let generated: GeneratedCase = call(
        ai,
        Operation::GenerateCase,
        request,
        &["diagnosis", "presentingComplaint", "openingLine"],
    )
    .await?;

    info!(case_id = %request.case_id, mode = ?request.mode, "case generated");
    Ok(generated)
}

// ── Clerking ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientTurnRequest {
    pub case_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub message: String,
    #[serde(flatten)]
    pub context: OptimizedContext,
}

/// Who may speak in a generated reply. The learner's own role is not
/// representable, so a reply claiming to be from the student fails to parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplySender {
    Patient,
    Parent,
    System,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientReply {
    pub sender: ReplySender,
    pub text: String,
    #[serde(default)]
    pub speaker_label: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PatientTurnResponse {
    messages: Vec<PatientReply>,
}

impl From<PatientReply> for Message {
    fn from(reply: PatientReply) -> Self {
        let sender = match reply.sender {
            ReplySender::Patient => Sender::Patient,
            ReplySender::Parent => Sender::Parent,
            ReplySender::System => Sender::System,
        };
        let message = Message::new(sender, reply.text);
        match reply.speaker_label {
            Some(label) => message.with_speaker(label),
            None => message,
        }
    }
}

/// One clerking turn. Returns the reply messages in speaking order.
pub async fn patient_turn(
    ai: &dyn AiService,
    request: &PatientTurnRequest,
) -> Result<Vec<Message>, AiError> {
    let response: PatientTurnResponse =
        call(ai, Operation::PatientTurn, request, &["messages"]).await?;
    Ok(response.messages.into_iter().map(Message::from).collect())
}

// ── Results ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultsRequest {
    pub case_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub plan: String,
    pub essential_info: EssentialInfo,
}

#[derive(Debug, Deserialize)]
struct ResultsResponse {
    results: Vec<ClinicalResult>,
}

pub async fn examination_results(
    ai: &dyn AiService,
    request: &ResultsRequest,
) -> Result<Vec<ClinicalResult>, AiError> {
    fetch_results(ai, Operation::ExaminationResults, request).await
}

pub async fn investigation_results(
    ai: &dyn AiService,
    request: &ResultsRequest,
) -> Result<Vec<ClinicalResult>, AiError> {
    fetch_results(ai, Operation::InvestigationResults, request).await
}

async fn fetch_results(
    ai: &dyn AiService,
    operation: Operation,
    request: &ResultsRequest,
) -> Result<Vec<ClinicalResult>, AiError> {
    if request.plan.trim().is_empty() {
        return Err(ValidationError::Empty("plan").into());
    }
    let response: ResultsResponse = call(ai, operation, request, &["results"]).await?;
    Ok(response
        .results
        .into_iter()
        .map(ClinicalResult::normalized)
        .collect())
}

// ── Completion and feedback ──────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionRequest {
    pub case_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub preliminary_diagnosis: String,
    pub examination_plan: String,
    pub investigation_plan: String,
    pub final_diagnosis: String,
    pub management_plan: String,
    #[serde(flatten)]
    pub context: OptimizedContext,
}

/// `feedback` is absent when the service is still generating it.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CompletionResponse {
    #[serde(default)]
    pub feedback: Option<Feedback>,
}

pub async fn feedback(
    ai: &dyn AiService,
    request: &CompletionRequest,
) -> Result<CompletionResponse, AiError> {
    call(ai, Operation::Feedback, request, &[]).await
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseLookup {
    pub case_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

/// Fetch structured feedback that was still pending at completion.
/// `None` while it is not ready yet.
pub async fn detailed_feedback(
    ai: &dyn AiService,
    lookup: &CaseLookup,
) -> Result<Option<Feedback>, AiError> {
    let response: CompletionResponse = call(ai, Operation::DetailedFeedback, lookup, &[]).await?;
    Ok(response.feedback)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportRequest {
    pub case_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub case_state: CaseState,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseReportBundle {
    pub comprehensive_feedback: ComprehensiveFeedback,
    pub case_report: CaseReport,
}

/// The heavy narrative report; runs in the background after completion.
pub async fn comprehensive_feedback(
    ai: &dyn AiService,
    request: &ReportRequest,
) -> Result<CaseReportBundle, AiError> {
    call(
        ai,
        Operation::ComprehensiveFeedback,
        request,
        &["comprehensiveFeedback", "caseReport"],
    )
    .await
}

// ── OSCE follow-up ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionGenerationRequest {
    pub case_id: String,
    pub diagnosis: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub station: Option<OsceStation>,
    pub recent_messages: Vec<Message>,
}

#[derive(Debug, Deserialize)]
struct QuestionGenerationResponse {
    questions: Vec<FollowUpQuestion>,
}

pub async fn osce_questions(
    ai: &dyn AiService,
    request: &QuestionGenerationRequest,
) -> Result<Vec<FollowUpQuestion>, AiError> {
    let response: QuestionGenerationResponse =
        call(ai, Operation::OsceQuestionGeneration, request, &["questions"]).await?;
    Ok(response.questions)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationRequest {
    pub case_id: String,
    pub questions: Vec<FollowUpQuestion>,
    pub answers: Vec<FollowUpAnswer>,
}

pub async fn osce_evaluation(
    ai: &dyn AiService,
    request: &EvaluationRequest,
) -> Result<OsceEvaluation, AiError> {
    call(
        ai,
        Operation::OsceEvaluation,
        request,
        &["score", "maxScore", "summary"],
    )
    .await
}

// ── Shared call path ─────────────────────────────────────────────────────────

async fn call<Req, Resp>(
    ai: &dyn AiService,
    operation: Operation,
    request: &Req,
    required: &[&str],
) -> Result<Resp, AiError>
where
    Req: Serialize,
    Resp: DeserializeOwned,
{
    let payload = serde_json::to_value(request)?;
    debug!(%operation, "invoking AI operation");

    let body = unwrap_envelope(ai.invoke(operation, payload).await?)?;

    match validate::require_fields(&body, required) {
        Ok(()) => {}
        Err(ValidationError::MissingFields(missing)) => {
            warn!(%operation, missing = ?missing, "AI response is missing required fields");
            return Err(AiError::SchemaViolation { operation, missing });
        }
        Err(e) => {
            warn!(%operation, error = %e, "AI response has the wrong shape");
            return Err(AiError::ResponseParse(format!("{operation}: {e}")));
        }
    }

    serde_json::from_value(body).map_err(|e| {
        warn!(%operation, error = %e, "AI response failed to deserialize");
        AiError::ResponseParse(format!("{operation}: {e}"))
    })
}
