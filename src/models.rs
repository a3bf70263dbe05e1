//! These models represent the objects passed around by the agent
//!
//! There are two related formats we need to interact with:
//! - the provider-agnostic protocol items recorded in the execution
//!   context (messages, tool calls, tool results)
//! - the backend's native message/tool shapes, produced on demand by the
//!   provider adapters
//!
//! The internal structs below are the single source of truth; adapters
//! convert to and from the backend format with to/from helpers and never
//! store backend payloads in the context.
pub mod content;
pub mod message;
pub mod tool;
