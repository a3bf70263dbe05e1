use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::content::{Fragment, Role};

/// A text message in the conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

/// The model's request to execute a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub tool_call_id: String,
    pub name: String,
    pub arguments: Value,
}

impl ToolCall {
    pub fn new<I, N>(tool_call_id: I, name: N, arguments: Value) -> Self
    where
        I: Into<String>,
        N: Into<String>,
    {
        Self {
            tool_call_id: tool_call_id.into(),
            name: name.into(),
            arguments,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolStatus {
    Success,
    Error,
}

/// Result from executing one tool call. `tool_call_id` must match a
/// ToolCall appended earlier in the same context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub tool_call_id: String,
    pub name: String,
    pub status: ToolStatus,
    pub content: Vec<Fragment>,
}

/// Content passed to or from the model. A closed union: the run loop
/// matches exhaustively, so a new kind must be handled at every site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentItem {
    Message(ChatMessage),
    ToolCall(ToolCall),
    ToolResult(ToolResult),
}

impl ContentItem {
    pub fn message<S: Into<String>>(role: Role, content: S) -> Self {
        ContentItem::Message(ChatMessage {
            role,
            content: content.into(),
        })
    }

    pub fn tool_call<I, N>(tool_call_id: I, name: N, arguments: Value) -> Self
    where
        I: Into<String>,
        N: Into<String>,
    {
        ContentItem::ToolCall(ToolCall::new(tool_call_id, name, arguments))
    }

    pub fn tool_result<I, N>(
        tool_call_id: I,
        name: N,
        status: ToolStatus,
        content: Vec<Fragment>,
    ) -> Self
    where
        I: Into<String>,
        N: Into<String>,
    {
        ContentItem::ToolResult(ToolResult {
            tool_call_id: tool_call_id.into(),
            name: name.into(),
            status,
            content,
        })
    }

    /// Get the message text if this is an assistant message
    pub fn as_assistant_text(&self) -> Option<&str> {
        match self {
            ContentItem::Message(message) if message.role == Role::Assistant => {
                Some(&message.content)
            }
            _ => None,
        }
    }

    pub fn as_tool_call(&self) -> Option<&ToolCall> {
        match self {
            ContentItem::ToolCall(call) => Some(call),
            _ => None,
        }
    }

    pub fn as_tool_result(&self) -> Option<&ToolResult> {
        match self {
            ContentItem::ToolResult(result) => Some(result),
            _ => None,
        }
    }
}
