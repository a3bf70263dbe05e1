use async_trait::async_trait;
use std::sync::Arc;
use std::sync::Mutex;

use crate::errors::AgentResult;
use crate::models::content::Role;
use crate::models::message::ContentItem;
use crate::providers::base::{LlmRequest, LlmResponse, Provider};

/// A scripted provider that returns pre-configured responses in order and
/// records every request it sees, for testing the run loop. Clones share
/// the same script and recording.
#[derive(Clone)]
pub struct MockProvider {
    responses: Arc<Mutex<Vec<LlmResponse>>>,
    requests: Arc<Mutex<Vec<LlmRequest>>>,
}

impl MockProvider {
    pub fn new(responses: Vec<LlmResponse>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses)),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Script plain content turns without spelling out full responses
    pub fn replying(turns: Vec<Vec<ContentItem>>) -> Self {
        Self::new(
            turns
                .into_iter()
                .map(|content| LlmResponse {
                    content,
                    ..Default::default()
                })
                .collect(),
        )
    }

    pub fn recorded_requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for MockProvider {
    async fn generate(&self, request: &LlmRequest) -> AgentResult<LlmResponse> {
        self.requests.lock().unwrap().push(request.clone());

        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            // Keep looping runs alive if the script runs dry
            Ok(LlmResponse {
                content: vec![ContentItem::message(Role::Assistant, "")],
                ..Default::default()
            })
        } else {
            Ok(responses.remove(0))
        }
    }
}
