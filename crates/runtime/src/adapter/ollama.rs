//! Pass-through adapter: Ollama takes the canonical schema as is.

use mcp::{InputSchema, ToolDefinition};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{AdapterError, SchemaAdapter};
use crate::model::ToolInvocation;

/// `{"type": "function", "function": {...}}` entry of the `tools` array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OllamaTool {
    #[serde(rename = "type")]
    pub kind: String,
    pub function: OllamaFunction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OllamaFunction {
    pub name: String,
    pub description: String,
    pub parameters: InputSchema,
}

/// An entry of `message.tool_calls` in a chat response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OllamaToolCall {
    pub function: OllamaFunctionCall,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OllamaFunctionCall {
    pub name: String,
    /// Normally an object; some models send it as a JSON-encoded string.
    #[serde(default)]
    pub arguments: Value,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct OllamaAdapter;

impl SchemaAdapter for OllamaAdapter {
    type Declaration = OllamaTool;
    type Call = OllamaToolCall;

    fn encode(&self, tools: &[ToolDefinition]) -> Result<Vec<OllamaTool>, AdapterError> {
        Ok(tools
            .iter()
            .map(|tool| OllamaTool {
                kind: "function".to_string(),
                function: OllamaFunction {
                    name: tool.name.clone(),
                    description: tool.description.clone(),
                    parameters: tool.input_schema.clone(),
                },
            })
            .collect())
    }

    fn decode(&self, call: &OllamaToolCall) -> Result<ToolInvocation, AdapterError> {
        let name = &call.function.name;
        let malformed = |reason: String| AdapterError::MalformedCall {
            name: name.clone(),
            reason,
        };

        let arguments = match &call.function.arguments {
            Value::Object(map) => map.clone(),
            Value::Null => Map::new(),
            Value::String(s) if s.trim().is_empty() => Map::new(),
            Value::String(s) => match serde_json::from_str::<Value>(s) {
                Ok(Value::Object(map)) => map,
                Ok(other) => return Err(malformed(format!("arguments decode to {other}, not an object"))),
                Err(e) => return Err(malformed(format!("arguments are not JSON: {e}"))),
            },
            other => return Err(malformed(format!("arguments must be an object, got {other}"))),
        };

        Ok(ToolInvocation::new(name.clone(), arguments))
    }
}
