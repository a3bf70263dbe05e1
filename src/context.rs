use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use chrono::Utc;
use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

use crate::models::message::ContentItem;

/// A recorded occurrence during one agent run. Immutable once appended.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Event {
    pub id: String,
    pub execution_id: String,
    pub timestamp: i64,
    pub author: String,
    pub content: Vec<ContentItem>,
}

impl Event {
    pub fn new<E, A>(execution_id: E, author: A, content: Vec<ContentItem>) -> Self
    where
        E: Into<String>,
        A: Into<String>,
    {
        Event {
            id: Uuid::new_v4().to_string(),
            execution_id: execution_id.into(),
            timestamp: Utc::now().timestamp(),
            author: author.into(),
            content,
        }
    }
}

/// The run's final value. A single typed result, whichever termination
/// path produced it: plain text replies yield `Text`, the structured
/// final-answer tool yields `Structured`.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum FinalValue {
    Text(String),
    Structured(Value),
}

impl FinalValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FinalValue::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_structured(&self) -> Option<&Value> {
        match self {
            FinalValue::Structured(value) => Some(value),
            _ => None,
        }
    }
}

/// Central storage for all execution state of one agent run.
///
/// The event log is append-only and owned exclusively by the run loop.
/// The scratch `state` map sits behind a mutex so tools dispatched
/// concurrently within one iteration can read and write it through a
/// shared borrow of the context.
#[derive(Debug)]
pub struct ExecutionContext {
    execution_id: String,
    events: Vec<Event>,
    current_step: usize,
    state: Mutex<HashMap<String, Value>>,
    final_result: Option<FinalValue>,
    finalized: bool,
}

impl ExecutionContext {
    pub fn new() -> Self {
        ExecutionContext {
            execution_id: Uuid::new_v4().to_string(),
            events: Vec::new(),
            current_step: 0,
            state: Mutex::new(HashMap::new()),
            final_result: None,
            finalized: false,
        }
    }

    pub fn execution_id(&self) -> &str {
        &self.execution_id
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn current_step(&self) -> usize {
        self.current_step
    }

    /// Append an event to the execution history. A finalized context is
    /// read-only; late appends are dropped.
    pub fn add_event(&mut self, event: Event) {
        if self.finalized {
            warn!(
                execution_id = %self.execution_id,
                author = %event.author,
                "event appended to finalized context; dropping"
            );
            return;
        }
        self.events.push(event);
    }

    /// Move to the next execution step
    pub fn increment_step(&mut self) {
        self.current_step += 1;
    }

    /// All content items across events, in append order
    pub fn content_items(&self) -> impl Iterator<Item = &ContentItem> {
        self.events.iter().flat_map(|event| event.content.iter())
    }

    /// Tool calls appended so far that have no matching tool result yet.
    /// The backend rejects a context with unanswered calls, so the loop
    /// must drain this before the next model turn.
    pub fn unanswered_tool_calls(&self) -> Vec<String> {
        let answered: HashSet<&str> = self
            .content_items()
            .filter_map(|item| item.as_tool_result())
            .map(|result| result.tool_call_id.as_str())
            .collect();
        self.content_items()
            .filter_map(|item| item.as_tool_call())
            .filter(|call| !answered.contains(call.tool_call_id.as_str()))
            .map(|call| call.tool_call_id.clone())
            .collect()
    }

    /// Write a scratch value shared across tools in this run
    pub fn set_state<K: Into<String>>(&self, key: K, value: Value) {
        let mut state = self.state.lock().expect("context state lock");
        state.insert(key.into(), value);
    }

    /// Read a scratch value by key
    pub fn get_state(&self, key: &str) -> Option<Value> {
        let state = self.state.lock().expect("context state lock");
        state.get(key).cloned()
    }

    pub fn final_result(&self) -> Option<&FinalValue> {
        self.final_result.as_ref()
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Record the run's result and make the context read-only
    pub(crate) fn finalize_with(&mut self, result: FinalValue) {
        self.final_result = Some(result);
        self.finalized = true;
    }

    /// Make the context read-only without a result (budget exhaustion,
    /// model error)
    pub(crate) fn finalize(&mut self) {
        self.finalized = true;
    }
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new()
    }
}
