use super::errors::ModelError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::future::Future;

/// A decoded tool call: which tool, with which arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub name: String,
    pub arguments: Map<String, Value>,
    /// Opaque provider token bound to this call. It must be sent back
    /// with the call when history is replayed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

impl ToolInvocation {
    pub fn new(name: impl Into<String>, arguments: Map<String, Value>) -> Self {
        Self {
            name: name.into(),
            arguments,
            signature: None,
        }
    }

    pub fn with_signature(mut self, signature: Option<String>) -> Self {
        self.signature = signature;
        self
    }
}

/// A tool call as recorded in history, with the id its result refers to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

/// One entry of conversation history. Append-only and ordered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Turn {
    User {
        text: String,
    },
    Model {
        text: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        calls: Vec<ToolCall>,
    },
    ToolResult {
        call_id: String,
        name: String,
        content: String,
        is_error: bool,
    },
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self::User { text: text.into() }
    }

    pub fn is_model(&self) -> bool {
        matches!(self, Self::Model { .. })
    }

    pub fn is_tool_result(&self) -> bool {
        matches!(self, Self::ToolResult { .. })
    }
}

/// Everything needed for a model request.
///
/// `D` is the provider's tool declaration type, produced by its schema
/// adapter.
#[derive(Debug)]
pub struct ModelRequest<'a, D> {
    pub system: Option<&'a str>,
    pub history: &'a [Turn],
    pub tools: &'a [D],
}

/// What the model produced: text, provider-native call payloads, or both.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelReply<C> {
    pub text: String,
    pub calls: Vec<C>,
}

impl<C> ModelReply<C> {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            calls: Vec::new(),
        }
    }

    pub fn wants_tools(&self) -> bool {
        !self.calls.is_empty()
    }
}

/// Trait for model provider backends.
///
/// A backend renders canonical [`Turn`] history into its provider's
/// message format and returns the provider's native tool calls untouched;
/// translating those is the schema adapter's job.
pub trait ModelBackend: Send + Sync {
    type Declaration: Send + Sync;
    type Call: Send;

    fn generate(
        &self,
        request: ModelRequest<'_, Self::Declaration>,
    ) -> impl Future<Output = Result<ModelReply<Self::Call>, ModelError>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn turn_wire_shape() {
        let turn = Turn::ToolResult {
            call_id: "call_0_0".into(),
            name: "query".into(),
            content: "ok".into(),
            is_error: false,
        };
        let json = serde_json::to_value(&turn).unwrap();
        assert_eq!(json["role"], "tool_result");

        let model = Turn::Model {
            text: "done".into(),
            calls: Vec::new(),
        };
        let json = serde_json::to_value(&model).unwrap();
        assert!(json.get("calls").is_none());
        assert!(model.is_model());
    }

    #[test]
    fn reply_wants_tools_only_with_calls() {
        let reply: ModelReply<()> = ModelReply::text("hi");
        assert!(!reply.wants_tools());
    }
}
