//! Ganache runtime: the model side of the tool bridge.
//!
//! The runtime connects a model provider to a tool host and runs the
//! conversation loop between them.
//!
//! # Overview
//!
//! - **ModelBackend**: one provider's HTTP API (Ollama, Gemini), speaking
//!   canonical [`Turn`] history and returning provider-native tool calls.
//! - **SchemaAdapter**: translates canonical tool definitions into the
//!   provider's declaration format and native calls back into
//!   [`ToolInvocation`]s.
//! - **ToolHost**: where tool calls go; in production an [`mcp::Session`].
//! - **Conversation**: the loop. It alternates model turns with
//!   concurrent tool execution until the model answers or the round-trip
//!   bound is reached.
//!
//! # Example
//!
//! ```ignore
//! use mcp::{ServerConfig, Session, SessionOptions};
//! use runtime::{Conversation, ConversationConfig, OllamaAdapter, OllamaBackend};
//!
//! # async fn example() -> runtime::Result<()> {
//! let config = ServerConfig {
//!     name: "ganache".to_string(),
//!     command: "ganache".to_string(),
//!     args: vec!["serve".to_string()],
//!     env: Default::default(),
//! };
//! let session = Session::spawn(config, SessionOptions::default())
//!     .await
//!     .map_err(runtime::Error::ToolService)?;
//! let backend = OllamaBackend::builder("llama3.2").build();
//! let mut conversation =
//!     Conversation::new(backend, OllamaAdapter, session, ConversationConfig::default())?;
//! let reply = conversation.send("Which SKUs have more than 30g fat?").await?;
//! println!("{}", reply.text);
//! # Ok(())
//! # }
//! ```

pub mod adapter;
mod conversation;
mod error;
pub mod model;
pub mod providers;
mod tools;

pub use adapter::{
    AdapterError, FunctionCall, FunctionDeclaration, GeminiAdapter, OllamaAdapter, OllamaTool,
    OllamaToolCall, SchemaAdapter,
};
pub use conversation::{
    Conversation, ConversationConfig, DEFAULT_MAX_RESULT_CHARS, DEFAULT_MAX_ROUND_TRIPS, Phase,
    Reply,
};
pub use error::{Error, Result};
pub use model::{ModelBackend, ModelError, ModelReply, ModelRequest, ToolCall, ToolInvocation, Turn};
pub use providers::{
    DEFAULT_GEMINI_ENDPOINT, DEFAULT_OLLAMA_ENDPOINT, GeminiBackend, GeminiBackendBuilder,
    OllamaBackend, OllamaBackendBuilder,
};
pub use tools::ToolHost;
