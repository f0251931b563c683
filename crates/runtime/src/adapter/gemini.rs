//! Typed adapter: Gemini function declarations use their own schema subset.

use std::collections::BTreeMap;

use mcp::{ParamKind, PropertySchema, ToolDefinition};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{AdapterError, SchemaAdapter};
use crate::model::ToolInvocation;

/// Gemini's closed set of schema type tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum GeminiType {
    String,
    Number,
    Integer,
    Object,
}

impl From<ParamKind> for GeminiType {
    fn from(kind: ParamKind) -> Self {
        match kind {
            ParamKind::String => Self::String,
            ParamKind::Number => Self::Number,
            ParamKind::Integer => Self::Integer,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeminiSchema {
    #[serde(rename = "type")]
    pub kind: GeminiType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "enum", default, skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<BTreeMap<String, GeminiSchema>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required: Option<Vec<String>>,
}

impl GeminiSchema {
    fn scalar(kind: GeminiType) -> Self {
        Self {
            kind,
            description: None,
            enum_values: None,
            minimum: None,
            properties: None,
            required: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDeclaration {
    pub name: String,
    pub description: String,
    /// Omitted for tools without parameters; Gemini rejects empty objects.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<GeminiSchema>,
}

/// A `functionCall` part of a Gemini response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<BTreeMap<String, Value>>,
    /// `thoughtSignature` of the enclosing part. It travels beside the
    /// call on the wire, not inside it.
    #[serde(skip)]
    pub thought_signature: Option<String>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GeminiAdapter;

impl GeminiAdapter {
    fn encode_tool(tool: &ToolDefinition) -> Result<FunctionDeclaration, AdapterError> {
        let mut properties = BTreeMap::new();
        for param in tool.parameters() {
            let schema = Self::encode_param(&tool.name, param.name, param.schema)?;
            properties.insert(param.name.to_string(), schema);
        }

        let parameters = (!properties.is_empty()).then(|| GeminiSchema {
            properties: Some(properties),
            required: Some(tool.input_schema.required.clone()).filter(|r| !r.is_empty()),
            ..GeminiSchema::scalar(GeminiType::Object)
        });

        Ok(FunctionDeclaration {
            name: tool.name.clone(),
            description: tool.description.clone(),
            parameters,
        })
    }

    fn encode_param(
        tool: &str,
        name: &str,
        schema: &PropertySchema,
    ) -> Result<GeminiSchema, AdapterError> {
        let unsupported = |reason: &str| AdapterError::UnsupportedSchema {
            tool: tool.to_string(),
            param: name.to_string(),
            reason: reason.to_string(),
        };

        let mut out = GeminiSchema::scalar(schema.kind.into());

        if let Some(allowed) = &schema.allowed {
            if schema.kind != ParamKind::String {
                return Err(unsupported("enum is only supported on string parameters"));
            }
            let values = allowed
                .iter()
                .map(|v| v.as_str().map(str::to_string))
                .collect::<Option<Vec<_>>>()
                .ok_or_else(|| unsupported("enum values must be strings"))?;
            out.enum_values = Some(values);
        }

        if let Some(minimum) = schema.minimum {
            if !schema.kind.is_numeric() {
                return Err(unsupported("minimum is only supported on numeric parameters"));
            }
            out.minimum = Some(minimum);
        }

        // No default field in Gemini schemas; keep it visible to the model
        out.description = match (&schema.description, &schema.default) {
            (Some(d), Some(default)) => Some(format!("{d} (default: {})", render(default))),
            (None, Some(default)) => Some(format!("Default: {}", render(default))),
            (d, None) => d.clone(),
        };

        Ok(out)
    }
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl SchemaAdapter for GeminiAdapter {
    type Declaration = FunctionDeclaration;
    type Call = FunctionCall;

    fn encode(&self, tools: &[ToolDefinition]) -> Result<Vec<FunctionDeclaration>, AdapterError> {
        tools.iter().map(Self::encode_tool).collect()
    }

    fn decode(&self, call: &FunctionCall) -> Result<ToolInvocation, AdapterError> {
        let arguments = call
            .args
            .iter()
            .flatten()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Ok(ToolInvocation::new(call.name.clone(), arguments)
            .with_signature(call.thought_signature.clone()))
    }
}
