//! Schema adapters: canonical tool schema to provider declarations and back.
//!
//! An adapter has exactly two jobs. [`SchemaAdapter::encode`] turns the
//! discovered [`ToolDefinition`]s into whatever the provider wants in its
//! request, and [`SchemaAdapter::decode`] turns a provider's native call
//! payload back into a canonical [`ToolInvocation`]. Nothing else in the
//! bridge knows which provider is in use.

mod gemini;
mod ollama;

pub use gemini::{
    FunctionCall, FunctionDeclaration, GeminiAdapter, GeminiSchema, GeminiType,
};
pub use ollama::{OllamaAdapter, OllamaFunction, OllamaFunctionCall, OllamaTool, OllamaToolCall};

use mcp::ToolDefinition;
use thiserror::Error;

use crate::model::ToolInvocation;

/// Errors raised while translating schemas or calls.
#[derive(Debug, Clone, PartialEq, Error)]
#[non_exhaustive]
pub enum AdapterError {
    /// A schema feature the provider cannot represent. Fatal when the
    /// conversation is built.
    #[error("tool {tool}: parameter {param}: {reason}")]
    UnsupportedSchema {
        tool: String,
        param: String,
        reason: String,
    },

    /// A call payload that cannot be read back into canonical arguments.
    #[error("malformed call to {name}: {reason}")]
    MalformedCall { name: String, reason: String },
}

impl AdapterError {
    /// Tool name of a malformed call, if this is one.
    pub fn call_name(&self) -> Option<&str> {
        match self {
            Self::MalformedCall { name, .. } => Some(name),
            Self::UnsupportedSchema { .. } => None,
        }
    }
}

/// Translation between the canonical tool schema and one provider's
/// function-calling format.
pub trait SchemaAdapter: Send + Sync {
    type Declaration;
    type Call;

    fn encode(&self, tools: &[ToolDefinition]) -> Result<Vec<Self::Declaration>, AdapterError>;

    fn decode(&self, call: &Self::Call) -> Result<ToolInvocation, AdapterError>;
}
