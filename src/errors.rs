use serde::{Deserialize, Serialize};
use thiserror::Error;

#[non_exhaustive]
#[derive(Error, Debug, Clone, Deserialize, Serialize)]
pub enum AgentError {
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Tool execution failed: {0}")]
    ExecutionError(String),

    /// The backend returned a payload we cannot interpret, e.g. tool-call
    /// arguments that are not valid JSON. Fatal for the whole response.
    #[error("Malformed model response: {0}")]
    MalformedResponse(String),

    /// A remote tool server could not be reached or listed at load time.
    /// Fatal: none of that server's tools are registered.
    #[error("Tool discovery failed: {0}")]
    Discovery(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type AgentResult<T> = Result<T, AgentError>;
