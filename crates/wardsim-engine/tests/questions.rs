mod fixtures;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;

use fixtures::ScriptedAi;
use wardsim_ai::error::AiError;
use wardsim_ai::operations::QuestionGenerationRequest;
use wardsim_ai::retry::RetryPolicy;
use wardsim_ai::service::Operation;
use wardsim_core::models::message::Message;
use wardsim_core::models::osce::{GenerationState, OsceGenerationStatus};
use wardsim_engine::cache::LocalCaseCache;
use wardsim_engine::questions::QuestionGenerationJob;

fn request() -> QuestionGenerationRequest {
    QuestionGenerationRequest {
        case_id: "case-1".into(),
        diagnosis: "Pulmonary embolism".into(),
        station: None,
        recent_messages: vec![Message::student("Any recent long journeys?")],
    }
}

fn questions() -> serde_json::Value {
    json!({ "questions": [
        { "id": "q1", "prompt": "What is your leading diagnosis?", "expectedPoints": ["PE"] },
        { "id": "q2", "prompt": "Which scoring tool would you use?", "expectedPoints": ["Wells"] }
    ]})
}

fn backoff() -> RetryPolicy {
    RetryPolicy::new(3, Duration::from_millis(1000))
}

#[tokio::test(start_paused = true)]
async fn retries_until_questions_are_cached() {
    let dir = tempfile::tempdir().unwrap();
    let cache = Arc::new(LocalCaseCache::new(dir.path()));
    let seen: Arc<Mutex<Vec<Option<OsceGenerationStatus>>>> = Arc::default();

    let ai = {
        let (cache, seen) = (cache.clone(), seen.clone());
        Arc::new(
            ScriptedAi::new()
                .then(Operation::OsceQuestionGeneration, move || {
                    seen.lock().unwrap().push(cache.load_generation_status("case-1"));
                    Err(AiError::Service("model overloaded".into()))
                })
                .always(Operation::OsceQuestionGeneration, questions()),
        )
    };

    let status = QuestionGenerationJob::new(ai.clone(), cache.clone(), 3, backoff())
        .spawn(request())
        .await
        .unwrap();

    assert_eq!(status.status, GenerationState::Ready);
    assert_eq!(status.attempts, 2);
    assert!(status.last_error.is_none());

    // Pending was on record before the first attempt went out.
    let before_first = seen.lock().unwrap()[0].clone().unwrap();
    assert_eq!(before_first.status, GenerationState::Pending);
    assert_eq!(before_first.attempts, 0);

    let times = ai.call_times(Operation::OsceQuestionGeneration);
    assert_eq!(times.len(), 2);
    assert_eq!(times[1] - times[0], Duration::from_millis(1000));

    assert!(cache.questions_ready("case-1"));
    assert_eq!(cache.load_questions("case-1").unwrap().len(), 2);
    assert_eq!(cache.load_generation_status("case-1"), Some(status));
}

#[tokio::test(start_paused = true)]
async fn gives_up_after_max_attempts() {
    let dir = tempfile::tempdir().unwrap();
    let cache = Arc::new(LocalCaseCache::new(dir.path()));
    let ai = Arc::new(
        ScriptedAi::new().always(Operation::OsceQuestionGeneration, json!({ "error": "model overloaded" })),
    );

    let status = QuestionGenerationJob::new(ai.clone(), cache.clone(), 3, backoff())
        .run(request())
        .await;

    assert_eq!(status.status, GenerationState::Failed);
    assert_eq!(status.attempts, 3);
    assert_eq!(status.last_error.as_deref(), Some("service error: model overloaded"));

    let times = ai.call_times(Operation::OsceQuestionGeneration);
    assert_eq!(times.len(), 3);
    assert_eq!(times[1] - times[0], Duration::from_millis(1000));
    assert_eq!(times[2] - times[1], Duration::from_millis(2000));

    assert!(!cache.questions_ready("case-1"));
    assert_eq!(
        cache.load_generation_status("case-1").map(|s| s.status),
        Some(GenerationState::Failed)
    );
}

#[tokio::test(start_paused = true)]
async fn an_empty_question_set_is_a_failed_attempt() {
    let dir = tempfile::tempdir().unwrap();
    let cache = Arc::new(LocalCaseCache::new(dir.path()));
    let ai = Arc::new(ScriptedAi::new().always(Operation::OsceQuestionGeneration, json!({ "questions": [] })));

    let status = QuestionGenerationJob::new(ai, cache.clone(), 1, backoff())
        .run(request())
        .await;

    assert_eq!(status.status, GenerationState::Failed);
    assert_eq!(status.attempts, 1);
    assert_eq!(status.last_error.as_deref(), Some("no questions returned"));
    assert!(cache.load_questions("case-1").is_none());
}
