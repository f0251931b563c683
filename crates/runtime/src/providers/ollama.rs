//! Ollama chat API backend.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::adapter::{OllamaFunctionCall, OllamaTool, OllamaToolCall};
use crate::model::{ModelBackend, ModelError, ModelReply, ModelRequest, Turn};

pub const DEFAULT_OLLAMA_ENDPOINT: &str = "http://localhost:11434";

// ─────────────────────────────────────────────────────────────────────────────
// API Wire Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ApiRequest<'a> {
    model: &'a str,
    messages: Vec<ApiMessage>,
    #[serde(skip_serializing_if = "<[_]>::is_empty")]
    tools: &'a [OllamaTool],
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<ApiOptions>,
}

#[derive(Debug, Serialize)]
struct ApiOptions {
    temperature: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
struct ApiMessage {
    role: &'static str,
    content: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<OllamaToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_name: Option<String>,
}

impl ApiMessage {
    fn plain(role: &'static str, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_name: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    message: Option<ApiResponseMessage>,
}

#[derive(Debug, Deserialize)]
struct ApiResponseMessage {
    #[serde(default)]
    content: String,
    #[serde(default)]
    tool_calls: Vec<OllamaToolCall>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Backend Implementation
// ─────────────────────────────────────────────────────────────────────────────

/// Builder for creating an Ollama backend.
#[derive(Debug, Clone)]
pub struct OllamaBackendBuilder {
    endpoint: String,
    model: String,
    temperature: Option<f32>,
    timeout: Duration,
}

impl OllamaBackendBuilder {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            endpoint: DEFAULT_OLLAMA_ENDPOINT.to_string(),
            model: model.into(),
            temperature: None,
            timeout: super::DEFAULT_MODEL_TIMEOUT,
        }
    }

    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn build(self) -> OllamaBackend {
        OllamaBackend {
            client: reqwest::Client::new(),
            url: format!("{}/api/chat", self.endpoint.trim_end_matches('/')),
            model: self.model,
            temperature: self.temperature,
            timeout: self.timeout,
        }
    }
}

/// Ollama `/api/chat` backend, non-streaming.
pub struct OllamaBackend {
    client: reqwest::Client,
    url: String,
    model: String,
    temperature: Option<f32>,
    timeout: Duration,
}

impl OllamaBackend {
    pub fn builder(model: impl Into<String>) -> OllamaBackendBuilder {
        OllamaBackendBuilder::new(model)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn render(system: Option<&str>, history: &[Turn]) -> Vec<ApiMessage> {
        let mut messages = Vec::with_capacity(history.len() + 1);
        if let Some(system) = system {
            messages.push(ApiMessage::plain("system", system));
        }

        for turn in history {
            messages.push(match turn {
                Turn::User { text } => ApiMessage::plain("user", text.clone()),
                Turn::Model { text, calls } => ApiMessage {
                    tool_calls: calls
                        .iter()
                        .map(|call| OllamaToolCall {
                            function: OllamaFunctionCall {
                                name: call.name.clone(),
                                arguments: Value::Object(call.arguments.clone()),
                            },
                        })
                        .collect(),
                    ..ApiMessage::plain("assistant", text.clone())
                },
                Turn::ToolResult { name, content, .. } => ApiMessage {
                    tool_name: Some(name.clone()),
                    ..ApiMessage::plain("tool", content.clone())
                },
            });
        }
        messages
    }
}

impl std::fmt::Display for OllamaBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ollama({})", self.model)
    }
}

impl ModelBackend for OllamaBackend {
    type Declaration = OllamaTool;
    type Call = OllamaToolCall;

    async fn generate(
        &self,
        request: ModelRequest<'_, OllamaTool>,
    ) -> Result<ModelReply<OllamaToolCall>, ModelError> {
        let api_request = ApiRequest {
            model: &self.model,
            messages: Self::render(request.system, request.history),
            tools: request.tools,
            stream: false,
            options: self.temperature.map(|temperature| ApiOptions { temperature }),
        };

        info!(
            model = %self.model,
            turns = request.history.len(),
            tools = request.tools.len(),
            "sending request to ollama"
        );

        let response = self
            .client
            .post(&self.url)
            .timeout(self.timeout)
            .json(&api_request)
            .send()
            .await
            .map_err(|e| ModelError::Unreachable {
                backend: "ollama",
                reason: e.to_string(),
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::status("ollama", status, &body));
        }

        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| ModelError::InvalidResponse {
                backend: "ollama",
                reason: e.to_string(),
            })?;

        let message = api_response
            .message
            .ok_or_else(|| ModelError::NoReply {
                backend: "ollama",
                reason: "missing message".into(),
            })?;
        debug!(calls = message.tool_calls.len(), "ollama replied");

        Ok(ModelReply {
            text: message.content,
            calls: message.tool_calls,
        })
    }
}
