use async_trait::async_trait;
use reqwest::Client;
use reqwest::StatusCode;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use super::base::{LlmRequest, LlmResponse, Provider};
use super::configs::OpenAiProviderConfig;
use super::utils::{
    openai_response_to_items, openai_response_usage, request_to_openai_messages,
    tool_choice_to_value, tools_to_openai_spec,
};
use crate::errors::{AgentError, AgentResult};

pub struct OpenAiProvider {
    client: Client,
    config: OpenAiProviderConfig,
}

impl OpenAiProvider {
    pub fn new(config: OpenAiProviderConfig) -> AgentResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(600)) // 10 minutes timeout
            .build()
            .map_err(|source| AgentError::Internal(source.to_string()))?;

        Ok(Self { client, config })
    }

    fn build_payload(&self, request: &LlmRequest) -> AgentResult<Value> {
        let mut payload = json!({
            "model": self.config.model,
            "messages": request_to_openai_messages(request),
        });
        let body = payload.as_object_mut().expect("payload is an object");

        // An empty tool set means no tool-calling capability this turn
        if !request.tools.is_empty() {
            body.insert("tools".to_string(), json!(tools_to_openai_spec(&request.tools)?));
            if let Some(choice) = &request.tool_choice {
                body.insert("tool_choice".to_string(), tool_choice_to_value(choice));
            }
        }
        if let Some(temperature) = self.config.temperature {
            body.insert("temperature".to_string(), json!(temperature));
        }
        if let Some(max_tokens) = self.config.max_tokens {
            body.insert("max_tokens".to_string(), json!(max_tokens));
        }

        Ok(payload)
    }

    async fn post(&self, payload: &Value) -> Result<Value, String> {
        let url = format!(
            "{}/v1/chat/completions",
            self.config.host.trim_end_matches('/')
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .json(payload)
            .send()
            .await
            .map_err(|source| format!("request failed: {source}"))?;

        match response.status() {
            StatusCode::OK => response
                .json()
                .await
                .map_err(|source| format!("invalid response body: {source}")),
            status if status == StatusCode::TOO_MANY_REQUESTS || status.as_u16() >= 500 => {
                Err(format!("server error: {status}"))
            }
            status => Err(format!("request failed with status {status}")),
        }
    }
}

#[async_trait]
impl Provider for OpenAiProvider {
    async fn generate(&self, request: &LlmRequest) -> AgentResult<LlmResponse> {
        let payload = self.build_payload(request)?;

        let response = match self.post(&payload).await {
            Ok(response) => response,
            Err(message) => {
                debug!(model = %self.config.model, %message, "backend call failed");
                return Ok(LlmResponse::from_error(message));
            }
        };

        // Backend-side errors arrive in-band on a 200
        if let Some(error) = response.get("error") {
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown backend error");
            return Ok(LlmResponse::from_error(format!("backend error: {message}")));
        }

        let content = openai_response_to_items(&response)?;
        Ok(LlmResponse {
            content,
            usage: openai_response_usage(&response),
            error_message: None,
        })
    }
}
