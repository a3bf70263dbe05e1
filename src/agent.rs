use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::context::{Event, ExecutionContext, FinalValue};
use crate::errors::{AgentError, AgentResult};
use crate::models::content::{Fragment, Role};
use crate::models::message::{ContentItem, ToolCall, ToolStatus};
use crate::models::tool::Tool;
use crate::providers::base::{LlmRequest, Provider, Usage};
use crate::tools::AgentTool;

pub const DEFAULT_MAX_STEPS: usize = 10;

/// Reserved name of the synthetic tool the model calls to submit a
/// structured final answer.
const FINAL_ANSWER_TOOL: &str = "final_answer";

/// Why a run stopped
#[derive(Debug, Clone, PartialEq)]
pub enum Termination {
    FinalAnswer,
    StepBudgetExhausted,
    ModelError(String),
}

/// Result of an agent execution. The context is returned for inspection;
/// it is finalized (read-only) by the time the outcome is built.
#[derive(Debug)]
pub struct AgentOutcome {
    pub output: Option<FinalValue>,
    pub termination: Termination,
    pub usage: Usage,
    pub context: ExecutionContext,
}

/// The turn-by-turn run loop: send context to the model, execute any
/// requested tools, append results, repeat until a final answer or the
/// step budget runs out.
pub struct Agent {
    provider: Box<dyn Provider>,
    tools: HashMap<String, Arc<dyn AgentTool>>,
    tool_order: Vec<String>,
    instructions: Vec<String>,
    max_steps: usize,
    output_schema: Option<Value>,
}

impl Agent {
    pub fn new(provider: Box<dyn Provider>) -> Self {
        Agent {
            provider,
            tools: HashMap::new(),
            tool_order: Vec::new(),
            instructions: Vec::new(),
            max_steps: DEFAULT_MAX_STEPS,
            output_schema: None,
        }
    }

    pub fn with_instruction<S: Into<String>>(mut self, instruction: S) -> Self {
        self.instructions.push(instruction.into());
        self
    }

    /// Register a tool. Names must be unique within the agent, and the
    /// `final_answer` name is reserved for structured output.
    pub fn with_tool<T: AgentTool + 'static>(mut self, tool: T) -> AgentResult<Self> {
        let name = tool.name().to_string();
        if name == FINAL_ANSWER_TOOL {
            return Err(AgentError::InvalidParameters(format!(
                "tool name '{FINAL_ANSWER_TOOL}' is reserved"
            )));
        }
        if self.tools.contains_key(&name) {
            return Err(AgentError::InvalidParameters(format!(
                "duplicate tool name: {name}"
            )));
        }
        self.tool_order.push(name.clone());
        self.tools.insert(name, Arc::new(tool));
        Ok(self)
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// Require a structured final answer conforming to this JSON schema.
    /// A synthetic `final_answer` tool carrying exactly this schema is
    /// offered on every turn; plain-text replies then no longer end the
    /// run, so text and structured results can never mix.
    pub fn with_output_schema(mut self, schema: Value) -> Self {
        self.output_schema = Some(schema);
        self
    }

    fn tool_descriptors(&self) -> Vec<Tool> {
        let mut descriptors: Vec<Tool> = self
            .tool_order
            .iter()
            .map(|name| self.tools[name].descriptor().clone())
            .collect();
        if let Some(schema) = &self.output_schema {
            descriptors.push(Tool::new(
                FINAL_ANSWER_TOOL,
                "Return the final answer matching the required schema.",
                schema.clone(),
            ));
        }
        descriptors
    }

    fn build_request(&self, context: &ExecutionContext) -> LlmRequest {
        LlmRequest {
            instructions: self.instructions.clone(),
            contents: context.content_items().cloned().collect(),
            tools: self.tool_descriptors(),
            tool_choice: None,
        }
    }

    /// Drive the loop to completion. The only error returns are malformed
    /// backend payloads; every other ending is a Termination on the
    /// outcome.
    pub async fn run(&self, prompt: &str) -> AgentResult<AgentOutcome> {
        let mut context = ExecutionContext::new();
        let execution_id = context.execution_id().to_string();
        let mut usage = Usage::default();

        info!(execution_id = %execution_id, "agent run started");
        context.add_event(Event::new(
            &execution_id,
            "user",
            vec![ContentItem::message(Role::User, prompt)],
        ));

        loop {
            // Budget check comes first: a budget of k allows exactly k
            // model turns, and k = 0 allows none at all
            if context.current_step() >= self.max_steps {
                warn!(
                    execution_id = %execution_id,
                    max_steps = self.max_steps,
                    "agent exhausted its step budget"
                );
                context.finalize();
                return Ok(AgentOutcome {
                    output: None,
                    termination: Termination::StepBudgetExhausted,
                    usage,
                    context,
                });
            }

            let request = self.build_request(&context);
            debug!(
                execution_id = %execution_id,
                step = context.current_step(),
                tools = request.tools.len(),
                "submitting turn to model"
            );
            let response = self.provider.generate(&request).await?;
            usage.accumulate(&response.usage);

            if let Some(message) = response.error_message {
                warn!(execution_id = %execution_id, %message, "model call failed");
                context.finalize();
                return Ok(AgentOutcome {
                    output: None,
                    termination: Termination::ModelError(message),
                    usage,
                    context,
                });
            }

            context.add_event(Event::new(
                &execution_id,
                "assistant",
                response.content.clone(),
            ));

            // A final_answer call ends the run with a structured result
            if self.output_schema.is_some() {
                let final_call = response
                    .content
                    .iter()
                    .filter_map(ContentItem::as_tool_call)
                    .find(|call| call.name == FINAL_ANSWER_TOOL);
                if let Some(call) = final_call {
                    let value = call.arguments.clone();
                    context.add_event(Event::new(
                        &execution_id,
                        "tool",
                        vec![ContentItem::tool_result(
                            call.tool_call_id.clone(),
                            FINAL_ANSWER_TOOL,
                            ToolStatus::Success,
                            vec![Fragment::text("final answer recorded")],
                        )],
                    ));
                    context.increment_step();
                    context.finalize_with(FinalValue::Structured(value.clone()));
                    info!(execution_id = %execution_id, "agent produced structured final answer");
                    return Ok(AgentOutcome {
                        output: Some(FinalValue::Structured(value)),
                        termination: Termination::FinalAnswer,
                        usage,
                        context,
                    });
                }
            }

            let calls: Vec<ToolCall> = response
                .content
                .iter()
                .filter_map(ContentItem::as_tool_call)
                .cloned()
                .collect();

            if calls.is_empty() {
                if self.output_schema.is_none() {
                    let text = response
                        .content
                        .iter()
                        .filter_map(ContentItem::as_assistant_text)
                        .collect::<Vec<_>>()
                        .join("\n");
                    context.increment_step();
                    context.finalize_with(FinalValue::Text(text.clone()));
                    info!(execution_id = %execution_id, "agent produced final text answer");
                    return Ok(AgentOutcome {
                        output: Some(FinalValue::Text(text)),
                        termination: Termination::FinalAnswer,
                        usage,
                        context,
                    });
                }
                // A structured answer is required: plain text does not end
                // the run, the model gets another turn to call final_answer
                debug!(execution_id = %execution_id, "text reply while awaiting structured answer");
            } else {
                let results = self.dispatch_tool_calls(&context, &calls).await;
                context.add_event(Event::new(&execution_id, "tool", results));
            }

            context.increment_step();
        }
    }

    /// Dispatch one turn's tool calls concurrently and wait for all of
    /// them. Results come back in call order regardless of completion
    /// order, so the adapter's pairing rule holds on the next turn.
    async fn dispatch_tool_calls(
        &self,
        context: &ExecutionContext,
        calls: &[ToolCall],
    ) -> Vec<ContentItem> {
        let futures = calls.iter().map(|call| async move {
            let outcome = match self.tools.get(&call.name) {
                Some(tool) => tool.execute(context, call.arguments.clone()).await,
                None => Err(AgentError::ToolNotFound(call.name.clone())),
            };
            match outcome {
                Ok(value) => ContentItem::tool_result(
                    call.tool_call_id.clone(),
                    call.name.clone(),
                    ToolStatus::Success,
                    vec![Fragment::from_value(value)],
                ),
                Err(error) => {
                    warn!(tool = %call.name, %error, "tool execution failed");
                    ContentItem::tool_result(
                        call.tool_call_id.clone(),
                        call.name.clone(),
                        ToolStatus::Error,
                        vec![Fragment::text(error.to_string())],
                    )
                }
            }
        });

        join_all(futures).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::tool::ParamKind;
    use crate::providers::base::LlmResponse;
    use crate::providers::mock::MockProvider;
    use crate::tools::FunctionTool;
    use serde_json::json;
    use std::time::Duration;

    fn list_files_tool() -> FunctionTool {
        FunctionTool::new(
            Tool::builder("list_files", "List files under a directory")
                .param("path", ParamKind::String, "Directory to list")
                .build(),
            |_arguments| async move { Ok(json!("a.txt\nb.txt")) },
        )
    }

    fn sleepy_tool(name: &str, millis: u64) -> FunctionTool {
        let reply = name.to_string();
        FunctionTool::new(
            Tool::builder(name, "Sleeps then echoes its own name").build(),
            move |_arguments| {
                let reply = reply.clone();
                async move {
                    tokio::time::sleep(Duration::from_millis(millis)).await;
                    Ok(Value::String(reply))
                }
            },
        )
    }

    #[tokio::test]
    async fn test_plain_text_answer_terminates_in_one_step() {
        let provider = MockProvider::replying(vec![vec![ContentItem::message(
            Role::Assistant,
            "4",
        )]]);
        let agent = Agent::new(Box::new(provider));

        let outcome = agent.run("What is 2+2?").await.unwrap();

        assert_eq!(outcome.termination, Termination::FinalAnswer);
        assert_eq!(outcome.output.unwrap().as_text(), Some("4"));
        assert_eq!(outcome.context.current_step(), 1);
        assert_eq!(outcome.context.events().len(), 2);
        assert!(outcome.context.is_finalized());
    }

    #[tokio::test]
    async fn test_tool_call_then_answer() {
        let provider = MockProvider::replying(vec![
            vec![ContentItem::tool_call(
                "call_1",
                "list_files",
                json!({"path": "."}),
            )],
            vec![ContentItem::message(Role::Assistant, "Two files: a.txt and b.txt")],
        ]);
        let agent = Agent::new(Box::new(provider))
            .with_instruction("You are a file assistant.")
            .with_tool(list_files_tool())
            .unwrap();

        let outcome = agent.run("What files are here?").await.unwrap();

        assert_eq!(outcome.termination, Termination::FinalAnswer);
        assert_eq!(
            outcome.output.unwrap().as_text(),
            Some("Two files: a.txt and b.txt")
        );
        assert_eq!(outcome.context.current_step(), 2);

        // user message, assistant tool call, tool result, assistant final
        let events = outcome.context.events();
        assert_eq!(events.len(), 4);
        assert_eq!(events[0].author, "user");
        assert_eq!(events[1].author, "assistant");
        assert_eq!(events[2].author, "tool");
        assert_eq!(events[3].author, "assistant");

        let result = events[2].content[0].as_tool_result().unwrap();
        assert_eq!(result.tool_call_id, "call_1");
        assert_eq!(result.status, ToolStatus::Success);
        assert!(outcome.context.unanswered_tool_calls().is_empty());
    }

    #[tokio::test]
    async fn test_step_budget_exhaustion_is_exact() {
        let provider = MockProvider::replying(vec![vec![ContentItem::tool_call(
            "call_1",
            "list_files",
            json!({"path": "."}),
        )]]);
        let agent = Agent::new(Box::new(provider))
            .with_tool(list_files_tool())
            .unwrap()
            .with_max_steps(1);

        let outcome = agent.run("loop forever").await.unwrap();

        assert_eq!(outcome.termination, Termination::StepBudgetExhausted);
        assert!(outcome.output.is_none());
        assert!(outcome.context.final_result().is_none());
        assert_eq!(outcome.context.current_step(), 1);
    }

    #[tokio::test]
    async fn test_unknown_tool_becomes_error_result_and_run_continues() {
        let provider = MockProvider::replying(vec![
            vec![ContentItem::tool_call("call_1", "bogus", json!({}))],
            vec![ContentItem::message(Role::Assistant, "recovered")],
        ]);
        let agent = Agent::new(Box::new(provider));

        let outcome = agent.run("use a tool").await.unwrap();

        assert_eq!(outcome.termination, Termination::FinalAnswer);
        let result = outcome.context.events()[2].content[0].as_tool_result().unwrap();
        assert_eq!(result.status, ToolStatus::Error);
        assert!(result.content[0].as_text().unwrap().contains("bogus"));
    }

    #[tokio::test]
    async fn test_failing_tool_does_not_abort_the_run() {
        let failing = FunctionTool::new(
            Tool::builder("unzip", "Unpack an archive").build(),
            |_arguments| async move {
                Err(AgentError::ExecutionError("corrupt archive".to_string()))
            },
        );
        let provider = MockProvider::replying(vec![
            vec![ContentItem::tool_call("call_1", "unzip", json!({}))],
            vec![ContentItem::message(Role::Assistant, "could not unpack")],
        ]);
        let agent = Agent::new(Box::new(provider)).with_tool(failing).unwrap();

        let outcome = agent.run("unpack it").await.unwrap();

        assert_eq!(outcome.termination, Termination::FinalAnswer);
        let result = outcome.context.events()[2].content[0].as_tool_result().unwrap();
        assert_eq!(result.status, ToolStatus::Error);
        assert!(result.content[0].as_text().unwrap().contains("corrupt archive"));
    }

    #[tokio::test]
    async fn test_concurrent_results_keep_call_order() {
        let provider = MockProvider::replying(vec![
            vec![
                ContentItem::tool_call("call_a", "slow", json!({})),
                ContentItem::tool_call("call_b", "fast", json!({})),
                ContentItem::tool_call("call_c", "medium", json!({})),
            ],
            vec![ContentItem::message(Role::Assistant, "done")],
        ]);
        let agent = Agent::new(Box::new(provider))
            .with_tool(sleepy_tool("slow", 40)).unwrap()
            .with_tool(sleepy_tool("fast", 1)).unwrap()
            .with_tool(sleepy_tool("medium", 15)).unwrap();

        let outcome = agent.run("race").await.unwrap();

        let results: Vec<_> = outcome.context.events()[2]
            .content
            .iter()
            .map(|item| item.as_tool_result().unwrap().name.as_str())
            .collect();
        assert_eq!(results, vec!["slow", "fast", "medium"]);
        assert!(outcome.context.unanswered_tool_calls().is_empty());
    }

    #[tokio::test]
    async fn test_structured_output_via_final_answer_tool() {
        let schema = json!({
            "type": "object",
            "properties": {"sentiment": {"type": "string"}},
            "required": ["sentiment"]
        });
        let provider = MockProvider::replying(vec![
            // a plain-text reply must not end the run while a structured
            // answer is required
            vec![ContentItem::message(Role::Assistant, "thinking out loud")],
            vec![ContentItem::tool_call(
                "call_1",
                "final_answer",
                json!({"sentiment": "positive"}),
            )],
        ]);
        let provider_handle = provider.clone();
        let agent = Agent::new(Box::new(provider)).with_output_schema(schema.clone());

        let outcome = agent.run("rate this review").await.unwrap();

        assert_eq!(outcome.termination, Termination::FinalAnswer);
        assert_eq!(
            outcome.output.unwrap().as_structured(),
            Some(&json!({"sentiment": "positive"}))
        );
        assert_eq!(outcome.context.current_step(), 2);
        assert!(outcome.context.unanswered_tool_calls().is_empty());

        // every request offered the synthetic tool with exactly the schema
        let requests = provider_handle.recorded_requests();
        assert_eq!(requests.len(), 2);
        for request in requests {
            let synthetic = request
                .tools
                .iter()
                .find(|tool| tool.name == "final_answer")
                .unwrap();
            assert_eq!(synthetic.input_schema, schema);
        }
    }

    #[tokio::test]
    async fn test_model_error_terminates_without_retry() {
        let provider = MockProvider::new(vec![LlmResponse::from_error("connection reset")]);
        let provider_handle = provider.clone();
        let agent = Agent::new(Box::new(provider));

        let outcome = agent.run("hello").await.unwrap();

        assert_eq!(
            outcome.termination,
            Termination::ModelError("connection reset".to_string())
        );
        assert!(outcome.output.is_none());
        assert!(outcome.context.is_finalized());
        // only the seed user event: the failed turn appended nothing
        assert_eq!(outcome.context.events().len(), 1);
        assert_eq!(provider_handle.recorded_requests().len(), 1);
    }

    #[tokio::test]
    async fn test_usage_accumulates_across_turns() {
        let turn = |items, tokens| LlmResponse {
            content: items,
            usage: Usage::new(Some(tokens), Some(tokens), Some(tokens * 2)),
            ..Default::default()
        };
        let provider = MockProvider::new(vec![
            turn(
                vec![ContentItem::tool_call("call_1", "list_files", json!({"path": "."}))],
                10,
            ),
            turn(vec![ContentItem::message(Role::Assistant, "done")], 7),
        ]);
        let agent = Agent::new(Box::new(provider))
            .with_tool(list_files_tool())
            .unwrap();

        let outcome = agent.run("go").await.unwrap();
        assert_eq!(outcome.usage.input_tokens, Some(17));
        assert_eq!(outcome.usage.total_tokens, Some(34));
    }

    #[tokio::test]
    async fn test_zero_step_budget_never_calls_model() {
        let provider = MockProvider::replying(vec![vec![ContentItem::message(
            Role::Assistant,
            "never seen",
        )]]);
        let provider_handle = provider.clone();
        let agent = Agent::new(Box::new(provider)).with_max_steps(0);

        let outcome = agent.run("hi").await.unwrap();

        assert_eq!(outcome.termination, Termination::StepBudgetExhausted);
        assert!(outcome.output.is_none());
        assert!(provider_handle.recorded_requests().is_empty());
        // only the seed user event made it in
        assert_eq!(outcome.context.events().len(), 1);
    }

    #[test]
    fn test_reserved_and_duplicate_tool_names_are_rejected() {
        let agent = Agent::new(Box::new(MockProvider::new(vec![])));
        let reserved = agent.with_tool(FunctionTool::new(
            Tool::builder("final_answer", "nope").build(),
            |_| async move { Ok(Value::Null) },
        ));
        assert!(matches!(reserved, Err(AgentError::InvalidParameters(_))));

        let agent = Agent::new(Box::new(MockProvider::new(vec![])))
            .with_tool(list_files_tool())
            .unwrap();
        let duplicate = agent.with_tool(list_files_tool());
        assert!(matches!(duplicate, Err(AgentError::InvalidParameters(_))));
    }
}
