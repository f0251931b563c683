//! Gemini `generateContent` backend.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::adapter::{FunctionCall, FunctionDeclaration};
use crate::model::{ModelBackend, ModelError, ModelReply, ModelRequest, Turn};

pub const DEFAULT_GEMINI_ENDPOINT: &str = "https://generativelanguage.googleapis.com";

// ─────────────────────────────────────────────────────────────────────────────
// API Wire Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ApiRequest<'a> {
    contents: Vec<ApiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<ApiContent>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ApiTools<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<ApiGenerationConfig>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ApiTools<'a> {
    function_declarations: &'a [FunctionDeclaration],
}

#[derive(Debug, Serialize)]
struct ApiGenerationConfig {
    temperature: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ApiContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<ApiPart>,
}

/// One part of a content. Gemini sets exactly one payload field. A
/// `thoughtSignature` beside a `functionCall` must be echoed back with it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiPart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_call: Option<FunctionCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_response: Option<ApiFunctionResponse>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    thought_signature: Option<String>,
}

impl ApiPart {
    fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ApiFunctionResponse {
    name: String,
    response: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiResponse {
    #[serde(default)]
    candidates: Vec<ApiCandidate>,
    #[serde(default)]
    prompt_feedback: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ApiCandidate {
    content: Option<ApiContent>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Backend Implementation
// ─────────────────────────────────────────────────────────────────────────────

/// Builder for creating a Gemini backend.
#[derive(Debug, Clone)]
pub struct GeminiBackendBuilder {
    api_key: String,
    endpoint: String,
    model: String,
    temperature: Option<f32>,
    timeout: Duration,
}

impl GeminiBackendBuilder {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            endpoint: DEFAULT_GEMINI_ENDPOINT.to_string(),
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

    pub fn build(self) -> GeminiBackend {
        let base = self.endpoint.trim_end_matches('/');
        GeminiBackend {
            client: reqwest::Client::new(),
            url: format!("{base}/v1beta/models/{}:generateContent", self.model),
            api_key: self.api_key,
            model: self.model,
            temperature: self.temperature,
            timeout: self.timeout,
        }
    }
}

/// Gemini API backend.
pub struct GeminiBackend {
    client: reqwest::Client,
    url: String,
    api_key: String,
    model: String,
    temperature: Option<f32>,
    timeout: Duration,
}

impl GeminiBackend {
    pub fn builder(api_key: impl Into<String>, model: impl Into<String>) -> GeminiBackendBuilder {
        GeminiBackendBuilder::new(api_key, model)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Render history as `contents`. Consecutive tool results share one
    /// user content, answering the model content before them.
    fn render(history: &[Turn]) -> Vec<ApiContent> {
        let mut contents: Vec<ApiContent> = Vec::with_capacity(history.len());

        for turn in history {
            match turn {
                Turn::User { text } => contents.push(ApiContent {
                    role: Some("user".into()),
                    parts: vec![ApiPart::text(text.clone())],
                }),
                Turn::Model { text, calls } => {
                    let mut parts = Vec::with_capacity(calls.len() + 1);
                    if !text.is_empty() {
                        parts.push(ApiPart::text(text.clone()));
                    }
                    parts.extend(calls.iter().map(|call| ApiPart {
                        function_call: Some(FunctionCall {
                            name: call.name.clone(),
                            args: Some(
                                call.arguments
                                    .iter()
                                    .map(|(k, v)| (k.clone(), v.clone()))
                                    .collect::<BTreeMap<_, _>>(),
                            ),
                            thought_signature: None,
                        }),
                        thought_signature: call.signature.clone(),
                        ..ApiPart::default()
                    }));
                    contents.push(ApiContent {
                        role: Some("model".into()),
                        parts,
                    });
                }
                Turn::ToolResult {
                    name,
                    content,
                    is_error,
                    ..
                } => {
                    let response = if *is_error {
                        json!({ "error": content })
                    } else {
                        json!({ "content": content })
                    };
                    let part = ApiPart {
                        function_response: Some(ApiFunctionResponse {
                            name: name.clone(),
                            response,
                        }),
                        ..ApiPart::default()
                    };
                    match contents.last_mut() {
                        Some(last)
                            if last.role.as_deref() == Some("user")
                                && last
                                    .parts
                                    .iter()
                                    .all(|p| p.function_response.is_some()) =>
                        {
                            last.parts.push(part)
                        }
                        _ => contents.push(ApiContent {
                            role: Some("user".into()),
                            parts: vec![part],
                        }),
                    }
                }
            }
        }
        contents
    }

    fn into_reply(response: ApiResponse) -> Result<ModelReply<FunctionCall>, ModelError> {
        let Some(content) = response.candidates.into_iter().find_map(|c| c.content) else {
            let reason = response
                .prompt_feedback
                .map(|f| f.to_string())
                .unwrap_or_else(|| "no candidates".into());
            return Err(ModelError::NoReply {
                backend: "gemini",
                reason,
            });
        };

        let mut reply = ModelReply::text(String::new());
        for part in content.parts {
            if let Some(text) = part.text {
                reply.text.push_str(&text);
            }
            if let Some(mut call) = part.function_call {
                call.thought_signature = part.thought_signature;
                reply.calls.push(call);
            }
        }
        Ok(reply)
    }
}

impl std::fmt::Display for GeminiBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "gemini({})", self.model)
    }
}

impl ModelBackend for GeminiBackend {
    type Declaration = FunctionDeclaration;
    type Call = FunctionCall;

    async fn generate(
        &self,
        request: ModelRequest<'_, FunctionDeclaration>,
    ) -> Result<ModelReply<FunctionCall>, ModelError> {
        let api_request = ApiRequest {
            contents: Self::render(request.history),
            system_instruction: request.system.map(|s| ApiContent {
                role: None,
                parts: vec![ApiPart::text(s)],
            }),
            tools: if request.tools.is_empty() {
                Vec::new()
            } else {
                vec![ApiTools {
                    function_declarations: request.tools,
                }]
            },
            generation_config: self
                .temperature
                .map(|temperature| ApiGenerationConfig { temperature }),
        };

        info!(
            model = %self.model,
            turns = request.history.len(),
            tools = request.tools.len(),
            "sending request to gemini"
        );

        let response = self
            .client
            .post(&self.url)
            .header("x-goog-api-key", &self.api_key)
            .timeout(self.timeout)
            .json(&api_request)
            .send()
            .await
            .map_err(|e| ModelError::Unreachable {
                backend: "gemini",
                reason: e.to_string(),
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::status("gemini", status, &body));
        }

        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| ModelError::InvalidResponse {
                backend: "gemini",
                reason: e.to_string(),
            })?;

        let reply = Self::into_reply(api_response)?;
        debug!(calls = reply.calls.len(), "gemini replied");
        Ok(reply)
    }
}
