//! Tool host trait.

use std::future::Future;

use mcp::{CallToolResult, Session, ToolDefinition};
use serde_json::{Map, Value};

/// Where the conversation loop sends tool calls.
///
/// This is the boundary between the model loop and side effects. The
/// production host is an [`mcp::Session`]; tests may substitute their own.
pub trait ToolHost: Send + Sync {
    /// Tool definitions, fixed for the host's lifetime.
    fn definitions(&self) -> &[ToolDefinition];

    /// Execute a tool call. `Err` is a transport failure, not a tool error.
    fn call(
        &self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> impl Future<Output = mcp::Result<CallToolResult>> + Send;
}

impl ToolHost for Session {
    fn definitions(&self) -> &[ToolDefinition] {
        self.tools()
    }

    fn call(
        &self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> impl Future<Output = mcp::Result<CallToolResult>> + Send {
        self.call_tool(name, arguments)
    }
}
