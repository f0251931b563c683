use serde_json::Value;
use thiserror::Error;

/// Errors from a model backend call. `backend` names the provider
/// (`"ollama"`, `"gemini"`).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ModelError {
    /// The endpoint could not be reached, or the request timed out.
    #[error("cannot reach {backend}: {reason}")]
    Unreachable { backend: &'static str, reason: String },

    /// The endpoint answered with a non-success HTTP status.
    ///
    /// `message` is the provider's own error text when the body carries
    /// one, otherwise the raw body.
    #[error("{backend} returned HTTP {status}: {message}")]
    Status {
        backend: &'static str,
        status: u16,
        message: String,
    },

    /// The call succeeded but produced nothing to continue with, such as a
    /// blocked Gemini prompt or an Ollama reply without a message.
    #[error("{backend} produced no reply: {reason}")]
    NoReply { backend: &'static str, reason: String },

    /// The response body did not decode.
    #[error("invalid {backend} response: {reason}")]
    InvalidResponse { backend: &'static str, reason: String },
}

impl ModelError {
    /// Build a [`ModelError::Status`] from a failed response body.
    ///
    /// Ollama reports `{"error": "..."}`; Gemini reports
    /// `{"error": {"code": .., "message": "...", "status": "..."}}`.
    pub fn status(backend: &'static str, status: u16, body: &str) -> Self {
        let message = serde_json::from_str::<Value>(body)
            .ok()
            .and_then(|value| match value.get("error")? {
                Value::String(message) => Some(message.clone()),
                error => error.get("message")?.as_str().map(str::to_string),
            })
            .unwrap_or_else(|| body.trim().to_string());
        Self::Status {
            backend,
            status,
            message,
        }
    }

    /// Rate limits, server-side failures and unreachable endpoints may
    /// succeed on a later turn.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Unreachable { .. } => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}
