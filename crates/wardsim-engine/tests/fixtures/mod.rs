#![allow(dead_code)]

mod ai;
mod store;

use std::path::Path;
use std::sync::Arc;

use serde_json::{Value, json};

use wardsim_engine::cache::LocalCaseCache;
use wardsim_engine::controller::{SessionDeps, UserIdentity};
use wardsim_engine::persistence::BatchPersistenceQueue;
use wardsim_engine::settings::EngineSettings;

pub use ai::ScriptedAi;
pub use store::MemoryStore;

pub fn deps(ai: &Arc<ScriptedAi>, store: &Arc<MemoryStore>, cache_dir: &Path) -> SessionDeps {
    SessionDeps {
        ai: ai.clone(),
        store: store.clone(),
        cache: Arc::new(LocalCaseCache::new(cache_dir)),
        persistence: Arc::new(BatchPersistenceQueue::new()),
        settings: EngineSettings::default(),
        user: UserIdentity {
            email: "learner@example.com".into(),
            country: Some("GB".into()),
        },
    }
}

pub fn generated_case(case_id: &str) -> Value {
    json!({
        "caseId": case_id,
        "sessionId": format!("sess-{case_id}"),
        "diagnosis": "Acute coronary syndrome",
        "presentingComplaint": "Central chest pain for two hours",
        "openingLine": "Doctor, my chest feels really tight.",
        "patientProfile": { "name": "Graham Hill", "age": 58, "sex": "male" }
    })
}

pub fn patient_reply(text: &str) -> Value {
    json!({ "messages": [{ "sender": "patient", "text": text }] })
}

pub fn auscultation() -> Value {
    json!({ "results": [{
        "type": "descriptive",
        "name": "Cardiovascular examination",
        "findings": "Heart sounds I and II, no added sounds. Mild diaphoresis."
    }]})
}

pub fn troponin() -> Value {
    json!({ "results": [{
        "type": "quantitative",
        "name": "High-sensitivity troponin",
        "value": 250.0,
        "unit": "ng/L",
        "referenceRange": { "low": 0.0, "high": 14.0 }
    }]})
}

pub fn feedback() -> Value {
    json!({ "feedback": {
        "score": 8,
        "summary": "Focused history with appropriate red-flag screening.",
        "strengths": ["Characterised the pain"],
        "improvements": ["Ask about family history"]
    }})
}

pub fn report() -> Value {
    json!({
        "comprehensiveFeedback": {
            "overallScore": 78,
            "summary": "Safe and structured.",
            "domains": [{ "domain": "History", "score": 8, "comment": "Thorough" }]
        },
        "caseReport": {
            "title": "Chest pain in a 58-year-old man",
            "narrative": "A 58-year-old presented with central chest pain.",
            "sections": []
        }
    })
}
