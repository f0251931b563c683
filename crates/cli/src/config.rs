//! Configuration loading from ganache.toml.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use mcp::{ServerConfig, SessionOptions};
use runtime::ConversationConfig;
use serde::Deserialize;

pub const CONFIG_FILE: &str = "ganache.toml";

const GEMINI_KEY_VAR: &str = "GEMINI_API_KEY";

const DEFAULT_SYSTEM_PROMPT: &str = "You answer questions about a chocolate product catalog. \
Use the tools to look up products; never invent SKUs or values. Be concise.";

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerSection,
    pub provider: ProviderSection,
    pub conversation: ConversationSection,
}

/// How to launch the tool server.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    /// Executable to spawn. Defaults to this binary running `serve`.
    pub command: Option<PathBuf>,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    pub handshake_timeout_secs: Option<u64>,
    pub request_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    Ollama,
    Gemini,
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Ollama => "ollama",
            Self::Gemini => "gemini",
        })
    }
}

/// Model provider selection.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ProviderSection {
    pub kind: ProviderKind,
    /// Model name. Defaults per provider.
    pub model: Option<String>,
    pub endpoint: Option<String>,
    /// Gemini API key. Falls back to `GEMINI_API_KEY`.
    pub api_key: Option<String>,
    pub temperature: Option<f32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ConversationSection {
    pub max_round_trips: Option<usize>,
    pub max_result_chars: Option<usize>,
    pub system_prompt: Option<String>,
}

impl Config {
    /// Load configuration from a TOML file. A missing file means defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(content) => Self::parse(&content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(ConfigError::Io(e)),
        }
    }

    /// Parse configuration from TOML string.
    pub fn parse(toml: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Server launch configuration; `current_exe` is used when no command
    /// is configured.
    pub fn server(&self, current_exe: &Path) -> ServerConfig {
        let (command, args) = match &self.server.command {
            Some(command) => (command.clone(), self.server.args.clone()),
            None => (current_exe.to_path_buf(), vec!["serve".to_string()]),
        };
        ServerConfig {
            name: "ganache".to_string(),
            command: command.display().to_string(),
            args,
            env: self.server.env.clone(),
        }
    }

    pub fn session_options(&self) -> SessionOptions {
        let defaults = SessionOptions::default();
        SessionOptions {
            handshake_timeout: self
                .server
                .handshake_timeout_secs
                .map_or(defaults.handshake_timeout, Duration::from_secs),
            request_timeout: self
                .server
                .request_timeout_secs
                .map_or(defaults.request_timeout, Duration::from_secs),
            ..defaults
        }
    }

    pub fn conversation(&self) -> ConversationConfig {
        let defaults = ConversationConfig::default();
        ConversationConfig {
            max_round_trips: self
                .conversation
                .max_round_trips
                .unwrap_or(defaults.max_round_trips),
            max_result_chars: self
                .conversation
                .max_result_chars
                .unwrap_or(defaults.max_result_chars),
            system_prompt: Some(
                self.conversation
                    .system_prompt
                    .clone()
                    .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            ),
        }
    }

    pub fn model(&self) -> String {
        self.provider
            .model
            .clone()
            .unwrap_or_else(|| match self.provider.kind {
                ProviderKind::Ollama => "llama3.2".to_string(),
                ProviderKind::Gemini => "gemini-2.0-flash".to_string(),
            })
    }

    /// Gemini API key from the config, else from the environment.
    pub fn api_key(&self) -> Result<String, ConfigError> {
        self.provider
            .api_key
            .clone()
            .or_else(|| std::env::var(GEMINI_KEY_VAR).ok())
            .filter(|key| !key.trim().is_empty())
            .ok_or(ConfigError::MissingApiKey)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("gemini api key not configured: set provider.api_key or GEMINI_API_KEY")]
    MissingApiKey,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_is_all_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.provider.kind, ProviderKind::Ollama);
        assert_eq!(config.model(), "llama3.2");

        let conversation = config.conversation();
        assert_eq!(conversation.max_round_trips, runtime::DEFAULT_MAX_ROUND_TRIPS);
        assert_eq!(conversation.max_result_chars, runtime::DEFAULT_MAX_RESULT_CHARS);
        assert!(conversation.system_prompt.is_some());

        let options = config.session_options();
        assert_eq!(options.request_timeout, mcp::DEFAULT_REQUEST_TIMEOUT);
    }

    #[test]
    fn missing_file_is_all_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(dir.path().join(CONFIG_FILE)).unwrap();
        assert!(config.server.command.is_none());
    }

    #[test]
    fn parses_all_sections() {
        let config = Config::parse(
            r#"
[server]
command = "/usr/local/bin/ganache"
args = ["serve", "--data", "skus.jsonl"]
request_timeout_secs = 5

[server.env]
GANACHE_REGION = "US"

[provider]
kind = "gemini"
model = "gemini-1.5-pro"
api_key = "k"
temperature = 0.2

[conversation]
max_round_trips = 3
system_prompt = "be brief"
"#,
        )
        .unwrap();

        assert_eq!(config.provider.kind, ProviderKind::Gemini);
        assert_eq!(config.model(), "gemini-1.5-pro");
        assert_eq!(config.api_key().unwrap(), "k");
        assert_eq!(config.session_options().request_timeout, Duration::from_secs(5));

        let server = config.server(Path::new("/ignored"));
        assert_eq!(server.command, "/usr/local/bin/ganache");
        assert_eq!(server.args, ["serve", "--data", "skus.jsonl"]);
        assert_eq!(server.env["GANACHE_REGION"], "US");

        let conversation = config.conversation();
        assert_eq!(conversation.max_round_trips, 3);
        assert_eq!(conversation.system_prompt.as_deref(), Some("be brief"));
    }

    #[test]
    fn default_server_is_current_exe() {
        let server = Config::default().server(Path::new("/opt/ganache"));
        assert_eq!(server.command, "/opt/ganache");
        assert_eq!(server.args, ["serve"]);
    }

    #[test]
    fn unknown_provider_is_rejected() {
        let err = Config::parse("[provider]\nkind = \"openai\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
