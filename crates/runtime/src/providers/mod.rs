//! Model provider backends.
//!
//! Each provider implements [`ModelBackend`](crate::model::ModelBackend)
//! for its HTTP API and pairs with one schema adapter.

mod gemini;
mod ollama;

use std::time::Duration;

pub use gemini::{DEFAULT_GEMINI_ENDPOINT, GeminiBackend, GeminiBackendBuilder};
pub use ollama::{DEFAULT_OLLAMA_ENDPOINT, OllamaBackend, OllamaBackendBuilder};

/// Upper bound on a single model request.
pub const DEFAULT_MODEL_TIMEOUT: Duration = Duration::from_secs(120);
