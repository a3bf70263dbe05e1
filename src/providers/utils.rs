use regex::Regex;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::errors::{AgentError, AgentResult};
use crate::models::content::fragments_to_text;
use crate::models::message::ContentItem;
use crate::models::tool::Tool;
use crate::providers::base::{LlmRequest, ToolChoice, Usage};

/// Convert an LlmRequest into the OpenAI chat message list.
///
/// Instructions become leading system messages. Consecutive ToolCall
/// items batch onto the open assistant message; when none is open a new
/// assistant message with empty text is started, so one model turn always
/// re-encodes as exactly one assistant entry.
pub fn request_to_openai_messages(request: &LlmRequest) -> Vec<Value> {
    let mut messages = Vec::new();

    for instruction in &request.instructions {
        messages.push(json!({
            "role": "system",
            "content": instruction,
        }));
    }

    for item in &request.contents {
        match item {
            ContentItem::Message(message) => {
                messages.push(json!({
                    "role": message.role,
                    "content": message.content,
                }));
            }
            ContentItem::ToolCall(call) => {
                let entry = json!({
                    "id": call.tool_call_id,
                    "type": "function",
                    "function": {
                        "name": sanitize_function_name(&call.name),
                        "arguments": call.arguments.to_string(),
                    }
                });

                let open_assistant = messages
                    .last_mut()
                    .filter(|message| message["role"] == "assistant");
                match open_assistant {
                    Some(assistant) => {
                        let calls = assistant
                            .as_object_mut()
                            .expect("assistant message is an object")
                            .entry("tool_calls")
                            .or_insert(json!([]));
                        calls.as_array_mut().expect("tool_calls is an array").push(entry);
                    }
                    None => {
                        messages.push(json!({
                            "role": "assistant",
                            "content": "",
                            "tool_calls": [entry],
                        }));
                    }
                }
            }
            ContentItem::ToolResult(result) => {
                messages.push(json!({
                    "role": "tool",
                    "tool_call_id": result.tool_call_id,
                    "content": fragments_to_text(&result.content),
                }));
            }
        }
    }

    messages
}

/// Convert tool descriptors to OpenAI's function-schema shape
pub fn tools_to_openai_spec(tools: &[Tool]) -> AgentResult<Vec<Value>> {
    let mut tool_names = std::collections::HashSet::new();
    let mut result = Vec::new();

    for tool in tools {
        if !tool_names.insert(&tool.name) {
            return Err(AgentError::InvalidParameters(format!(
                "duplicate tool name: {}",
                tool.name
            )));
        }

        result.push(json!({
            "type": "function",
            "function": {
                "name": sanitize_function_name(&tool.name),
                "description": tool.description,
                "parameters": tool.input_schema,
            }
        }));
    }

    Ok(result)
}

pub fn tool_choice_to_value(choice: &ToolChoice) -> Value {
    match choice {
        ToolChoice::Auto => json!("auto"),
        ToolChoice::Required => json!("required"),
        ToolChoice::Tool(name) => json!({
            "type": "function",
            "function": {"name": name},
        }),
    }
}

/// Convert the backend reply into protocol items, reading exactly the
/// first choice. Malformed tool-call argument JSON is fatal for the whole
/// response.
pub fn openai_response_to_items(response: &Value) -> AgentResult<Vec<ContentItem>> {
    let message = response
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|choices| choices.first())
        .and_then(|choice| choice.get("message"))
        .filter(|message| message.is_object())
        .ok_or_else(|| {
            AgentError::MalformedResponse(
                "response carries no message in its first choice".to_string(),
            )
        })?;
    let mut items = Vec::new();

    if let Some(text) = message.get("content").and_then(Value::as_str) {
        if !text.is_empty() {
            items.push(ContentItem::message(
                crate::models::content::Role::Assistant,
                text,
            ));
        }
    }

    if let Some(tool_calls) = message.get("tool_calls").and_then(Value::as_array) {
        for tool_call in tool_calls {
            let id = match tool_call["id"].as_str() {
                Some(id) if !id.is_empty() => id.to_string(),
                _ => Uuid::new_v4().to_string(),
            };
            let name = tool_call["function"]["name"]
                .as_str()
                .unwrap_or_default()
                .to_string();
            let arguments = tool_call["function"]["arguments"]
                .as_str()
                .unwrap_or_default();

            let parsed: Value = serde_json::from_str(arguments).map_err(|source| {
                AgentError::MalformedResponse(format!(
                    "could not interpret tool call arguments for id {id}: {source}"
                ))
            })?;
            items.push(ContentItem::tool_call(id, name, parsed));
        }
    }

    Ok(items)
}

pub fn openai_response_usage(response: &Value) -> Usage {
    let read = |key: &str| {
        response["usage"]
            .get(key)
            .and_then(Value::as_i64)
            .map(|v| v as i32)
    };
    Usage::new(
        read("prompt_tokens"),
        read("completion_tokens"),
        read("total_tokens"),
    )
}

fn sanitize_function_name(name: &str) -> String {
    let re = Regex::new(r"[^a-zA-Z0-9_-]").expect("valid regex");
    re.replace_all(name, "_").to_string()
}
