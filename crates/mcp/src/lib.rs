//! MCP (Model Context Protocol) over newline-delimited stdio.
//!
//! Both ends of the bridge live here:
//!
//! - [`Session`] is the calling side. It spawns a server, performs the
//!   `initialize` handshake under a timeout, discovers tools once, and then
//!   issues `tools/call` requests that may overlap freely. Responses are
//!   matched to callers by request id, never by arrival order.
//! - [`serve`] is the serving side. It drives any [`ToolService`] over a
//!   byte stream, running tool calls concurrently.
//!
//! Tool definitions use one canonical schema, [`ToolDefinition`], which the
//! provider adapters translate into model-specific declarations.
//!
//! # Example
//!
//! ```no_run
//! use mcp::{ServerConfig, Session, SessionOptions};
//! use std::collections::HashMap;
//!
//! # async fn example() -> mcp::Result<()> {
//! let config = ServerConfig {
//!     name: "ganache".to_string(),
//!     command: "ganache".to_string(),
//!     args: vec!["serve".to_string()],
//!     env: HashMap::new(),
//! };
//!
//! let session = Session::spawn(config, SessionOptions::default()).await?;
//! for tool in session.tools() {
//!     println!("Tool: {}", tool.name);
//! }
//!
//! let mut args = serde_json::Map::new();
//! args.insert("fat_value".into(), 30.into());
//! let result = session.call_tool("query_skus_by_fat", args).await?;
//! println!("{}", result.joined_text());
//!
//! session.close().await;
//! # Ok(())
//! # }
//! ```

mod client;
mod error;
mod frame;
mod protocol;
mod schema;
mod serve;

pub use client::{
    DEFAULT_HANDSHAKE_TIMEOUT, DEFAULT_REQUEST_TIMEOUT, MAX_FRAME_SIZE, ServerConfig, Session,
    SessionOptions,
};
pub use error::{Error, Result};
pub use protocol::{
    CallToolParams, CallToolResult, ClientCapabilities, Implementation, InitializeParams,
    InitializeResult, JsonRpcError, JsonRpcRequest, JsonRpcResponse, ListToolsResult, Message,
    PROTOCOL_VERSION, RequestId, SUPPORTED_PROTOCOL_VERSIONS, ServerCapabilities, ToolContent,
    ToolsCapability, is_supported_version,
};
pub use schema::{InputSchema, ObjectKind, ParamKind, Parameter, PropertySchema, ToolDefinition};
pub use serve::{ToolService, serve, serve_stdio};
