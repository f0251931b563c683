//! Routes named calls to registered handlers.

use std::sync::Arc;

use catalog::Catalog;
use mcp::{CallToolResult, Implementation, ToolDefinition, ToolService};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::{Arguments, ToolError, ToolRegistry};

const SERVER_NAME: &str = "ganache";

/// Validates calls against the registry and runs them on the catalog.
///
/// Handler failures never escape as transport faults: [`ToolRouter::call`]
/// always produces a result, error-flagged when anything went wrong.
#[derive(Debug, Clone)]
pub struct ToolRouter {
    registry: Arc<ToolRegistry>,
    catalog: Arc<Catalog>,
}

impl ToolRouter {
    pub fn new(registry: ToolRegistry, catalog: Arc<Catalog>) -> Self {
        Self {
            registry: Arc::new(registry),
            catalog,
        }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Look up, validate and run a call, returning the handler's text.
    pub fn dispatch(&self, name: &str, arguments: &Map<String, Value>) -> Result<String, ToolError> {
        let tool = self
            .registry
            .get(name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;
        let args = Arguments::validate(&tool.definition, arguments)?;
        (tool.handler)(&self.catalog, &args)
    }

    /// Like [`dispatch`](Self::dispatch), with errors folded into content.
    pub fn call(&self, name: &str, arguments: &Map<String, Value>) -> CallToolResult {
        match self.dispatch(name, arguments) {
            Ok(text) => {
                debug!(tool = name, bytes = text.len(), "tool call succeeded");
                CallToolResult::text(text)
            }
            Err(e) => {
                warn!(tool = name, error = %e, "tool call failed");
                CallToolResult::error(format!("Error: {e}"))
            }
        }
    }
}

impl ToolService for ToolRouter {
    fn server_info(&self) -> Implementation {
        Implementation::new(SERVER_NAME, env!("CARGO_PKG_VERSION"))
    }

    fn instructions(&self) -> Option<String> {
        Some(format!(
            "Product catalog with {} unique SKUs. Use the tools to query by fat content or by chocolate type and moulding.",
            self.catalog.len()
        ))
    }

    fn list_tools(&self) -> Vec<ToolDefinition> {
        self.registry.definitions()
    }

    async fn call_tool(&self, name: &str, arguments: Map<String, Value>) -> CallToolResult {
        self.call(name, &arguments)
    }
}
