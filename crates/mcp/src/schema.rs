//! Canonical tool schema shared by the serving side, the session and the
//! provider adapters.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A callable tool as advertised by `tools/list`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub input_schema: InputSchema,
}

impl ToolDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema: InputSchema::default(),
        }
    }

    /// Add a parameter.
    pub fn param(mut self, name: impl Into<String>, schema: PropertySchema, required: bool) -> Self {
        let name = name.into();
        if required && !self.input_schema.required.contains(&name) {
            self.input_schema.required.push(name.clone());
        }
        self.input_schema.properties.insert(name, schema);
        self
    }

    /// Parameters with their required flag, in name order.
    pub fn parameters(&self) -> impl Iterator<Item = Parameter<'_>> {
        self.input_schema
            .properties
            .iter()
            .map(|(name, schema)| Parameter {
                name,
                schema,
                required: self.input_schema.is_required(name),
            })
    }
}

/// One parameter of a tool, borrowed from its definition.
#[derive(Debug, Clone, Copy)]
pub struct Parameter<'a> {
    pub name: &'a str,
    pub schema: &'a PropertySchema,
    pub required: bool,
}

/// Object schema describing a tool's arguments.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct InputSchema {
    #[serde(rename = "type")]
    pub kind: ObjectKind,
    #[serde(default)]
    pub properties: BTreeMap<String, PropertySchema>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,
}

impl InputSchema {
    pub fn is_required(&self, name: &str) -> bool {
        self.required.iter().any(|r| r == name)
    }
}

/// The only schema root type tools may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectKind {
    #[default]
    Object,
}

/// Primitive type of a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamKind {
    String,
    Number,
    Integer,
}

impl ParamKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Integer => "integer",
        }
    }

    pub fn is_numeric(self) -> bool {
        matches!(self, Self::Number | Self::Integer)
    }
}

/// Schema of a single parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertySchema {
    #[serde(rename = "type")]
    pub kind: ParamKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "enum", default, skip_serializing_if = "Option::is_none")]
    pub allowed: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
}

impl PropertySchema {
    pub fn new(kind: ParamKind) -> Self {
        Self {
            kind,
            description: None,
            allowed: None,
            default: None,
            minimum: None,
        }
    }

    pub fn string() -> Self {
        Self::new(ParamKind::String)
    }

    pub fn number() -> Self {
        Self::new(ParamKind::Number)
    }

    pub fn integer() -> Self {
        Self::new(ParamKind::Integer)
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn one_of<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.allowed = Some(values.into_iter().map(Into::into).collect());
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn minimum(mut self, minimum: f64) -> Self {
        self.minimum = Some(minimum);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> ToolDefinition {
        ToolDefinition::new("query", "Query things")
            .param(
                "n",
                PropertySchema::integer().minimum(1.0).default_value(10),
                false,
            )
            .param(
                "operator",
                PropertySchema::string().one_of([">", "<"]).default_value(">"),
                false,
            )
            .param("value", PropertySchema::number().describe("Threshold"), true)
    }

    #[test]
    fn canonical_wire_shape() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["inputSchema"]["type"], "object");
        assert_eq!(json["inputSchema"]["required"], json!(["value"]));
        assert_eq!(json["inputSchema"]["properties"]["n"]["type"], "integer");
        assert_eq!(json["inputSchema"]["properties"]["n"]["minimum"], 1.0);
        assert_eq!(
            json["inputSchema"]["properties"]["operator"]["enum"],
            json!([">", "<"])
        );
        assert!(json["inputSchema"]["properties"]["value"].get("default").is_none());
    }

    #[test]
    fn parses_foreign_definition() {
        let json = r#"{
            "name": "query_skus_by_fat",
            "description": "Query SKUs",
            "inputSchema": {
                "type": "object",
                "properties": {"fat_value": {"type": "number"}},
                "required": ["fat_value"]
            }
        }"#;
        let tool: ToolDefinition = serde_json::from_str(json).unwrap();
        let params: Vec<_> = tool.parameters().collect();
        assert_eq!(params.len(), 1);
        assert_eq!(params[0].name, "fat_value");
        assert!(params[0].required);
        assert_eq!(params[0].schema.kind, ParamKind::Number);
    }

    #[test]
    fn rejects_unknown_parameter_types() {
        let json = r#"{"name":"t","inputSchema":{"type":"object","properties":{"x":{"type":"array"}}}}"#;
        assert!(serde_json::from_str::<ToolDefinition>(json).is_err());
    }

    #[test]
    fn required_is_not_duplicated() {
        let tool = ToolDefinition::new("t", "")
            .param("a", PropertySchema::string(), true)
            .param("a", PropertySchema::string(), true);
        assert_eq!(tool.input_schema.required, ["a"]);
    }
}
