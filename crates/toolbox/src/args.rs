//! Argument validation against a tool's declared parameters.

use std::collections::BTreeMap;

use mcp::{ParamKind, Parameter, PropertySchema, ToolDefinition};
use serde_json::{Map, Value};
use tracing::debug;

use crate::ToolError;

/// A single validated argument.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue {
    Text(String),
    Number(f64),
    Integer(i64),
}

/// Arguments after validation: declared parameters only, defaults filled
/// in, values coerced to their declared kind.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Arguments {
    values: BTreeMap<String, ArgValue>,
}

impl Arguments {
    /// Validate raw call arguments against a definition.
    ///
    /// Keys the definition does not declare are dropped. `null` counts as
    /// absent.
    pub fn validate(definition: &ToolDefinition, raw: &Map<String, Value>) -> Result<Self, ToolError> {
        for key in raw.keys() {
            if !definition.input_schema.properties.contains_key(key) {
                debug!(tool = %definition.name, param = %key, "ignoring undeclared argument");
            }
        }

        let mut values = BTreeMap::new();
        for param in definition.parameters() {
            let supplied = raw.get(param.name).filter(|v| !v.is_null());
            let value = match (supplied, &param.schema.default) {
                (Some(value), _) => value,
                (None, Some(default)) => default,
                (None, None) if param.required => {
                    return Err(ToolError::MissingParameter(param.name.to_string()));
                }
                (None, None) => continue,
            };
            values.insert(param.name.to_string(), coerce(&param, value)?);
        }
        Ok(Self { values })
    }

    pub fn get(&self, name: &str) -> Option<&ArgValue> {
        self.values.get(name)
    }

    pub fn text(&self, name: &str) -> Result<&str, ToolError> {
        match self.require(name)? {
            ArgValue::Text(s) => Ok(s),
            other => Err(mismatch(name, "a string", other)),
        }
    }

    pub fn number(&self, name: &str) -> Result<f64, ToolError> {
        match self.require(name)? {
            ArgValue::Number(n) => Ok(*n),
            ArgValue::Integer(n) => Ok(*n as f64),
            other => Err(mismatch(name, "a number", other)),
        }
    }

    pub fn integer(&self, name: &str) -> Result<i64, ToolError> {
        match self.require(name)? {
            ArgValue::Integer(n) => Ok(*n),
            other => Err(mismatch(name, "an integer", other)),
        }
    }

    /// An integer parameter used as a result count.
    pub fn count(&self, name: &str) -> Result<usize, ToolError> {
        let n = self.integer(name)?;
        usize::try_from(n).map_err(|_| ToolError::OutOfRange {
            param: name.to_string(),
            value: n as f64,
            minimum: 0.0,
        })
    }

    fn require(&self, name: &str) -> Result<&ArgValue, ToolError> {
        self.values
            .get(name)
            .ok_or_else(|| ToolError::MissingParameter(name.to_string()))
    }
}

fn mismatch(name: &str, expected: &'static str, found: &ArgValue) -> ToolError {
    ToolError::InvalidType {
        param: name.to_string(),
        expected,
        found: format!("{found:?}"),
    }
}

fn coerce(param: &Parameter<'_>, value: &Value) -> Result<ArgValue, ToolError> {
    let schema = param.schema;
    let invalid = |expected| ToolError::InvalidType {
        param: param.name.to_string(),
        expected,
        found: value.to_string(),
    };

    let coerced = match schema.kind {
        ParamKind::String => match value {
            Value::String(s) => ArgValue::Text(s.clone()),
            _ => return Err(invalid("a string")),
        },
        ParamKind::Number => match as_f64(value) {
            Some(n) => ArgValue::Number(n),
            None => return Err(invalid("a number")),
        },
        ParamKind::Integer => match as_f64(value) {
            Some(n) if n.fract() == 0.0 && n.is_finite() => ArgValue::Integer(n as i64),
            _ => return Err(invalid("an integer")),
        },
    };

    check_minimum(param.name, schema, &coerced)?;
    check_allowed(param.name, schema, coerced)
}

/// Numbers, or strings that parse as numbers.
fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        _ => None,
    }
}

fn check_minimum(name: &str, schema: &PropertySchema, value: &ArgValue) -> Result<(), ToolError> {
    let (Some(minimum), Some(n)) = (schema.minimum, numeric(value)) else {
        return Ok(());
    };
    if n < minimum {
        return Err(ToolError::OutOfRange {
            param: name.to_string(),
            value: n,
            minimum,
        });
    }
    Ok(())
}

/// Enum check. Strings match case-insensitively and take the declared
/// spelling.
fn check_allowed(name: &str, schema: &PropertySchema, value: ArgValue) -> Result<ArgValue, ToolError> {
    let Some(allowed) = &schema.allowed else {
        return Ok(value);
    };

    let found = match &value {
        ArgValue::Text(s) => allowed
            .iter()
            .filter_map(Value::as_str)
            .find(|candidate| candidate.eq_ignore_ascii_case(s.trim()))
            .map(|candidate| ArgValue::Text(candidate.to_string())),
        other => {
            let n = numeric(other);
            allowed
                .iter()
                .any(|candidate| candidate.as_f64() == n)
                .then(|| other.clone())
        }
    };

    found.ok_or_else(|| ToolError::NotAllowed {
        param: name.to_string(),
        value: match &value {
            ArgValue::Text(s) => s.clone(),
            ArgValue::Number(n) => n.to_string(),
            ArgValue::Integer(n) => n.to_string(),
        },
        allowed: allowed
            .iter()
            .map(|v| v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string()))
            .collect::<Vec<_>>()
            .join(", "),
    })
}

fn numeric(value: &ArgValue) -> Option<f64> {
    match value {
        ArgValue::Number(n) => Some(*n),
        ArgValue::Integer(n) => Some(*n as f64),
        ArgValue::Text(_) => None,
    }
}
