pub mod agent;
pub mod context;
pub mod errors;
pub mod models;
pub mod providers;
pub mod tools;

pub use agent::{Agent, AgentOutcome, Termination};
pub use context::{Event, ExecutionContext, FinalValue};
pub use errors::{AgentError, AgentResult};
