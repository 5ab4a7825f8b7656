mod fixtures;

use std::time::Duration;

use serde_json::json;

use fixtures::ScriptedAi;
use wardsim_ai::context::EssentialInfo;
use wardsim_ai::error::AiError;
use wardsim_ai::results::{PlanSubmission, ResultKind, ResultsCoordinator};
use wardsim_ai::retry::RetryPolicy;
use wardsim_ai::service::Operation;
use wardsim_core::error::ValidationError;
use wardsim_core::models::case::CaseMode;
use wardsim_core::models::result::{ClinicalResult, ResultStatus};

fn info() -> EssentialInfo {
    EssentialInfo {
        mode: CaseMode::Simulation,
        diagnosis: "Acute coronary syndrome".into(),
        presenting_complaint: "Central chest pain".into(),
        department: None,
        patient_profile: None,
        pediatric_profile: None,
        conversation_summary: None,
    }
}

fn troponin() -> serde_json::Value {
    json!({ "results": [{
        "type": "quantitative",
        "name": "Troponin I",
        "value": 0.9,
        "unit": "ng/mL",
        "referenceRange": { "low": 0.0, "high": 0.04 }
    }]})
}

fn auscultation() -> serde_json::Value {
    json!({ "results": [{
        "type": "descriptive",
        "name": "Cardiac auscultation",
        "findings": "Normal heart sounds, no murmurs"
    }]})
}

fn fast_policy() -> RetryPolicy {
    RetryPolicy::new(3, Duration::from_millis(10))
}

#[test]
fn both_plans_blank_is_rejected() {
    assert_eq!(PlanSubmission::new("  ", ""), Err(ValidationError::EmptyPlans));
}

#[test]
fn blank_half_is_dropped_and_text_trimmed() {
    let submission = PlanSubmission::new("", "  ECG, troponin \n").unwrap();
    assert_eq!(submission.examination(), None);
    assert_eq!(submission.investigation(), Some("ECG, troponin"));
}

#[tokio::test(start_paused = true)]
async fn only_non_blank_plan_is_requested() {
    let ai = ScriptedAi::new().always(Operation::InvestigationResults, troponin());
    let submission = PlanSubmission::new("", "ECG, troponin").unwrap();

    let fan_in = ResultsCoordinator::new(&ai, fast_policy())
        .fetch("case-1", None, &submission, &info())
        .await;

    assert_eq!(ai.calls_to(Operation::ExaminationResults), 0);
    assert_eq!(ai.calls_to(Operation::InvestigationResults), 1);
    assert_eq!(fan_in.requested(), 1);
    assert!(fan_in.is_complete_success());

    let (committed, failure) = fan_in.into_parts();
    assert!(failure.is_none());
    assert_eq!(committed.len(), 1);
    let (kind, results) = &committed[0];
    assert_eq!(*kind, ResultKind::Investigation);
    match &results[0] {
        ClinicalResult::Quantitative(q) => assert_eq!(q.status, ResultStatus::High),
        other => panic!("unexpected result {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn both_halves_are_requested_with_the_plan_text() {
    let ai = ScriptedAi::new()
        .always(Operation::ExaminationResults, auscultation())
        .always(Operation::InvestigationResults, troponin());
    let submission = PlanSubmission::new("Auscultate heart", "ECG, troponin").unwrap();

    let fan_in = ResultsCoordinator::new(&ai, fast_policy())
        .fetch("case-1", Some("sess-1"), &submission, &info())
        .await;

    assert_eq!(fan_in.succeeded(), 2);
    let exam = ai.payloads(Operation::ExaminationResults);
    assert_eq!(exam[0]["plan"], "Auscultate heart");
    assert_eq!(exam[0]["sessionId"], "sess-1");
    let inv = ai.payloads(Operation::InvestigationResults);
    assert_eq!(inv[0]["plan"], "ECG, troponin");
}

#[tokio::test(start_paused = true)]
async fn partial_failure_keeps_the_successful_half() {
    let ai = ScriptedAi::new()
        .always(Operation::ExaminationResults, auscultation())
        .always(Operation::InvestigationResults, json!({ "error": "lab generator offline" }));
    let submission = PlanSubmission::new("Auscultate heart", "ECG").unwrap();

    let fan_in = ResultsCoordinator::new(&ai, fast_policy())
        .fetch("case-1", None, &submission, &info())
        .await;

    assert_eq!(fan_in.requested(), 2);
    assert_eq!(fan_in.succeeded(), 1);
    assert!(!fan_in.is_complete_success());

    let (committed, failure) = fan_in.into_parts();
    assert_eq!(committed.len(), 1);
    assert_eq!(committed[0].0, ResultKind::Examination);
    assert!(matches!(failure, Some(AiError::Service(_))));
    // Non-transient: exactly one attempt.
    assert_eq!(ai.calls_to(Operation::InvestigationResults), 1);
}

#[tokio::test(start_paused = true)]
async fn each_half_retries_independently() {
    let ai = ScriptedAi::new()
        .then(Operation::ExaminationResults, || Err(AiError::RateLimited("429".into())))
        .always(Operation::ExaminationResults, auscultation())
        .always(Operation::InvestigationResults, troponin());
    let submission = PlanSubmission::new("Auscultate heart", "ECG").unwrap();

    let fan_in = ResultsCoordinator::new(&ai, fast_policy())
        .fetch("case-1", None, &submission, &info())
        .await;

    assert!(fan_in.is_complete_success());
    assert_eq!(ai.calls_to(Operation::ExaminationResults), 2);
    assert_eq!(ai.calls_to(Operation::InvestigationResults), 1);
}

#[tokio::test(start_paused = true)]
async fn both_halves_start_before_either_finishes() {
    let ai = ScriptedAi::new()
        .then(Operation::ExaminationResults, || Err(AiError::RateLimited("429".into())))
        .always(Operation::ExaminationResults, auscultation())
        .always(Operation::InvestigationResults, troponin());
    let submission = PlanSubmission::new("Auscultate heart", "ECG").unwrap();

    ResultsCoordinator::new(&ai, fast_policy())
        .fetch("case-1", None, &submission, &info())
        .await;

    let exam = ai.call_times(Operation::ExaminationResults);
    let inv = ai.call_times(Operation::InvestigationResults);
    // The investigation request went out alongside the first examination
    // attempt, not after the examination retry settled.
    assert_eq!(inv[0], exam[0]);
    assert!(exam[1] > exam[0]);
}
