//! Tool registry: definitions bound to handlers.

use catalog::Catalog;
use mcp::ToolDefinition;

use crate::{Arguments, ToolError};

/// A handler runs against the catalog with already-validated arguments and
/// returns the text payload of a successful result.
pub type Handler = fn(&Catalog, &Arguments) -> Result<String, ToolError>;

/// A tool definition with its bound handler.
#[derive(Clone)]
pub struct RegisteredTool {
    pub definition: ToolDefinition,
    pub handler: Handler,
}

impl std::fmt::Debug for RegisteredTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredTool")
            .field("name", &self.definition.name)
            .finish_non_exhaustive()
    }
}

/// Ordered set of tools, keyed by unique name.
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<RegisteredTool>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The catalog tools served by `ganache serve`.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for (definition, handler) in crate::tools::builtin() {
            registry.register(definition, handler);
        }
        registry
    }

    /// Register a tool, replacing any existing one with the same name in
    /// place.
    pub fn register(&mut self, definition: ToolDefinition, handler: Handler) -> &mut Self {
        let tool = RegisteredTool {
            definition,
            handler,
        };
        match self
            .tools
            .iter_mut()
            .find(|t| t.definition.name == tool.definition.name)
        {
            Some(existing) => *existing = tool,
            None => self.tools.push(tool),
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&RegisteredTool> {
        self.tools.iter().find(|t| t.definition.name == name)
    }

    /// Definitions in registration order.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| t.definition.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
