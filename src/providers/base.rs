use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::AgentResult;
use crate::models::message::ContentItem;
use crate::models::tool::Tool;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: Option<i32>,
    pub output_tokens: Option<i32>,
    pub total_tokens: Option<i32>,
}

impl Usage {
    pub fn new(
        input_tokens: Option<i32>,
        output_tokens: Option<i32>,
        total_tokens: Option<i32>,
    ) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens,
        }
    }

    /// Fold another turn's usage into a running total
    pub fn accumulate(&mut self, other: &Usage) {
        let add = |a: &mut Option<i32>, b: Option<i32>| {
            if let Some(b) = b {
                *a = Some(a.unwrap_or(0) + b);
            }
        };
        add(&mut self.input_tokens, other.input_tokens);
        add(&mut self.output_tokens, other.output_tokens);
        add(&mut self.total_tokens, other.total_tokens);
    }
}

/// Constraint on which tool the model must use this turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ToolChoice {
    Auto,
    Required,
    Tool(String),
}

/// A provider-agnostic completion request: system instructions, the
/// accumulated conversation, and the tools on offer this turn.
#[derive(Debug, Clone, Default)]
pub struct LlmRequest {
    pub instructions: Vec<String>,
    pub contents: Vec<ContentItem>,
    pub tools: Vec<Tool>,
    pub tool_choice: Option<ToolChoice>,
}

/// What came back from the backend, already translated to protocol
/// items. A transport or backend failure is carried in `error_message`
/// with empty content; the adapter never lets a raw transport error
/// escape.
#[derive(Debug, Clone, Default)]
pub struct LlmResponse {
    pub content: Vec<ContentItem>,
    pub usage: Usage,
    pub error_message: Option<String>,
}

impl LlmResponse {
    pub fn from_error<S: Into<String>>(message: S) -> Self {
        LlmResponse {
            content: Vec::new(),
            usage: Usage::default(),
            error_message: Some(message.into()),
        }
    }
}

/// Base trait for model backends (OpenAI-compatible, scripted mocks, …).
///
/// The only `Err` a generate call may return is a malformed backend
/// payload (`AgentError::MalformedResponse`); everything transport-level
/// is folded into `LlmResponse::error_message`.
#[async_trait]
pub trait Provider: Send + Sync {
    async fn generate(&self, request: &LlmRequest) -> AgentResult<LlmResponse>;
}
