use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use serde_json::Value;
use tokio::time::Instant;

use wardsim_ai::error::AiError;
use wardsim_ai::service::{AiService, BoxFuture, Operation};

pub type Reply = Box<dyn Fn() -> Result<Value, AiError> + Send + Sync>;

#[derive(Default)]
pub struct ScriptedAi {
    queued: Mutex<HashMap<Operation, VecDeque<Reply>>>,
    fallback: Mutex<HashMap<Operation, Value>>,
    calls: Mutex<Vec<(Operation, Value, Instant)>>,
}

#[allow(dead_code)]
impl ScriptedAi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reply used whenever nothing is queued for `operation`.
    pub fn always(self, operation: Operation, body: Value) -> Self {
        self.fallback.lock().unwrap().insert(operation, body);
        self
    }

    /// Queue a one-off reply for the next call to `operation`.
    pub fn then(self, operation: Operation, reply: impl Fn() -> Result<Value, AiError> + Send + Sync + 'static) -> Self {
        self.queued
            .lock()
            .unwrap()
            .entry(operation)
            .or_default()
            .push_back(Box::new(reply));
        self
    }

    pub fn calls_to(&self, operation: Operation) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(op, _, _)| *op == operation)
            .count()
    }

    pub fn payloads(&self, operation: Operation) -> Vec<Value> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(op, _, _)| *op == operation)
            .map(|(_, payload, _)| payload.clone())
            .collect()
    }

    pub fn call_times(&self, operation: Operation) -> Vec<Instant> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(op, _, _)| *op == operation)
            .map(|(_, _, at)| *at)
            .collect()
    }
}

impl AiService for ScriptedAi {
    fn invoke(&self, operation: Operation, payload: Value) -> BoxFuture<'_, Result<Value, AiError>> {
        self.calls
            .lock()
            .unwrap()
            .push((operation, payload, Instant::now()));

        let queued = self
            .queued
            .lock()
            .unwrap()
            .get_mut(&operation)
            .and_then(VecDeque::pop_front);

        let result = match queued {
            Some(reply) => reply(),
            None => self
                .fallback
                .lock()
                .unwrap()
                .get(&operation)
                .cloned()
                .ok_or_else(|| AiError::Invocation(format!("no scripted reply for {operation}"))),
        };
        Box::pin(async move { result })
    }
}
