//! Provider-agnostic conversation types and the model backend trait.

pub mod errors;
pub mod types;

pub use errors::ModelError;
pub use types::{ModelBackend, ModelReply, ModelRequest, ToolCall, ToolInvocation, Turn};
