pub mod mcp;

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::Value;

use crate::context::ExecutionContext;
use crate::errors::AgentResult;
use crate::models::tool::Tool;

/// Core trait every callable tool satisfies. Implementations must be safe
/// for concurrent invocation with different arguments: a tool holds no
/// per-call state, shared scratch values live in the context.
#[async_trait]
pub trait AgentTool: Send + Sync {
    /// The tool's descriptor (name, description, invocation schema)
    fn descriptor(&self) -> &Tool;

    fn name(&self) -> &str {
        &self.descriptor().name
    }

    /// Execute with the model-supplied arguments. Failures are returned,
    /// never panicked; the run loop converts them into error results.
    async fn execute(&self, context: &ExecutionContext, arguments: Value) -> AgentResult<Value>;
}

type PlainHandler = dyn Fn(Value) -> BoxFuture<'static, AgentResult<Value>> + Send + Sync;
type ContextHandler =
    dyn for<'a> Fn(&'a ExecutionContext, Value) -> BoxFuture<'a, AgentResult<Value>> + Send + Sync;

enum Handler {
    Plain(Arc<PlainHandler>),
    WithContext(Arc<ContextHandler>),
}

/// Wraps an async closure as an AgentTool. The author chooses at
/// construction whether the closure receives the execution context; the
/// invocation schema comes from the descriptor, declared up front.
pub struct FunctionTool {
    descriptor: Tool,
    handler: Handler,
}

impl FunctionTool {
    /// Wrap a closure that only needs the model-supplied arguments
    pub fn new<F, Fut>(descriptor: Tool, handler: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = AgentResult<Value>> + Send + 'static,
    {
        FunctionTool {
            descriptor,
            handler: Handler::Plain(Arc::new(move |arguments| Box::pin(handler(arguments)))),
        }
    }

    /// Wrap a closure that also wants the execution context injected
    pub fn with_context<F>(descriptor: Tool, handler: F) -> Self
    where
        F: for<'a> Fn(&'a ExecutionContext, Value) -> BoxFuture<'a, AgentResult<Value>>
            + Send
            + Sync
            + 'static,
    {
        FunctionTool {
            descriptor,
            handler: Handler::WithContext(Arc::new(handler)),
        }
    }
}

#[async_trait]
impl AgentTool for FunctionTool {
    fn descriptor(&self) -> &Tool {
        &self.descriptor
    }

    async fn execute(&self, context: &ExecutionContext, arguments: Value) -> AgentResult<Value> {
        match &self.handler {
            Handler::Plain(handler) => handler(arguments).await,
            Handler::WithContext(handler) => handler(context, arguments).await,
        }
    }
}
