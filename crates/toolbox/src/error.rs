use thiserror::Error;

/// Errors that can occur while routing or executing a tool call.
///
/// None of these cross the transport as protocol errors: the router turns
/// every one into an error-flagged text result.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ToolError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("missing required parameter: {0}")]
    MissingParameter(String),

    #[error("parameter {param} must be {expected}, got {found}")]
    InvalidType {
        param: String,
        expected: &'static str,
        found: String,
    },

    #[error("parameter {param} must be at least {minimum}, got {value}")]
    OutOfRange {
        param: String,
        value: f64,
        minimum: f64,
    },

    #[error("parameter {param} must be one of {allowed}, got {value}")]
    NotAllowed {
        param: String,
        value: String,
        allowed: String,
    },

    #[error("execution failed: {0}")]
    Execution(#[source] catalog::Error),
}

impl From<catalog::Error> for ToolError {
    fn from(err: catalog::Error) -> Self {
        match err {
            catalog::Error::MissingParameter(param) => Self::MissingParameter(param.to_string()),
            other => Self::Execution(other),
        }
    }
}
