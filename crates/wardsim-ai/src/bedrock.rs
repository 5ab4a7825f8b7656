//! [`AiService`] backed by the Bedrock Converse API.
//!
//! The operation name and payload are sent as a single JSON user message;
//! the model is instructed to answer with one JSON object, which becomes the
//! response body. Throttling maps to [`AiError::RateLimited`] so the retry
//! layer picks it up.

use aws_sdk_bedrockruntime::Client;
use aws_sdk_bedrockruntime::types::{
    ContentBlock, ConversationRole, Message as ConverseMessage, SystemContentBlock,
};
use serde_json::Value;
use tracing::info;

use crate::error::AiError;
use crate::service::{AiService, BoxFuture, Operation};

const SYSTEM_PREAMBLE: &str = "\
You are the generation backend of a clinical-education simulator. \
The user message is a JSON object with an `operation` and a `payload`. \
Reply with exactly one JSON object and nothing else: no prose, no code fences. \
If the request cannot be served, reply with {\"error\": \"<reason>\"}.";

pub struct BedrockService {
    client: Client,
    model_id: String,
}

impl BedrockService {
    pub fn new(config: &aws_config::SdkConfig, model_id: impl Into<String>) -> Self {
        Self {
            client: Client::new(config),
            model_id: model_id.into(),
        }
    }

    async fn converse(&self, operation: Operation, payload: Value) -> Result<Value, AiError> {
        let user_message = serde_json::json!({
            "operation": operation.as_str(),
            "payload": payload,
        })
        .to_string();

        let message = ConverseMessage::builder()
            .role(ConversationRole::User)
            .content(ContentBlock::Text(user_message))
            .build()
            .map_err(|e| AiError::Invocation(e.to_string()))?;

        info!(%operation, model = %self.model_id, "invoking Bedrock");

        let response = self
            .client
            .converse()
            .model_id(&self.model_id)
            .system(SystemContentBlock::Text(system_prompt(operation)))
            .messages(message)
            .send()
            .await
            .map_err(|e| {
                let err = e.into_service_error();
                if err.is_throttling_exception() {
                    AiError::RateLimited(err.to_string())
                } else {
                    AiError::Invocation(err.to_string())
                }
            })?;

        let output_message = response
            .output()
            .and_then(|o| o.as_message().ok())
            .ok_or_else(|| AiError::ResponseParse("no message in response".to_string()))?;

        let response_text = output_message
            .content()
            .iter()
            .filter_map(|block| {
                if let ContentBlock::Text(text) = block {
                    Some(text.as_str())
                } else {
                    None
                }
            })
            .collect::<Vec<_>>()
            .join("");

        parse_json_reply(&response_text)
    }
}

impl AiService for BedrockService {
    fn invoke(&self, operation: Operation, payload: Value) -> BoxFuture<'_, Result<Value, AiError>> {
        Box::pin(self.converse(operation, payload))
    }
}

fn system_prompt(operation: Operation) -> String {
    let shape = match operation {
        Operation::GenerateCase => {
            "Keys: diagnosis, presentingComplaint, openingLine, \
             optional patientProfile and pediatricProfile."
        }
        Operation::PatientTurn => {
            "Keys: messages, a list of {sender: patient|parent|system, text, speakerLabel?}."
        }
        Operation::ExaminationResults | Operation::InvestigationResults => {
            "Keys: results, a list of results tagged by type: quantitative \
             {name, value, unit, referenceRange{low, high}, status} or descriptive \
             {name, findings, impression, recommendation, abnormalFlags, urgency}."
        }
        Operation::Feedback | Operation::DetailedFeedback => {
            "Keys: feedback {score, summary, strengths, improvements}, or null while pending."
        }
        Operation::ComprehensiveFeedback => {
            "Keys: comprehensiveFeedback {overallScore, summary, domains}, \
             caseReport {title, narrative, sections}."
        }
        Operation::OsceQuestionGeneration => {
            "Keys: questions, a list of {id, prompt, expectedPoints}."
        }
        Operation::OsceEvaluation => "Keys: score, maxScore, summary, questions.",
    };
    format!("{SYSTEM_PREAMBLE}\nOperation: {operation}. {shape}")
}

/// Parse the model's reply, tolerating a surrounding code fence.
fn parse_json_reply(text: &str) -> Result<Value, AiError> {
    let trimmed = text.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .unwrap_or(trimmed)
        .trim();

    serde_json::from_str(body)
        .map_err(|e| AiError::ResponseParse(format!("reply is not valid JSON: {e}")))
}
