//! MCP error types.

use std::time::Duration;

use crate::protocol::JsonRpcError;
use thiserror::Error;

/// Transport-level failures.
///
/// Tool failures never show up here: they travel as error-flagged
/// [`CallToolResult`](crate::CallToolResult) content. Everything in this enum
/// is a hard failure of the request or of the whole session.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("failed to spawn server {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("handshake did not complete within {0:?}")]
    HandshakeTimeout(Duration),

    #[error("handshake failed: {0}")]
    Handshake(String),

    #[error("session closed")]
    SessionClosed,

    #[error("timeout waiting for {method} response after {after:?}")]
    Timeout { method: String, after: Duration },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to serialize message: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("JSON-RPC error: {0}")]
    JsonRpc(#[from] JsonRpcError),

    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },
}

impl Error {
    /// Whether the session can no longer be used after this error.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Spawn { .. } | Self::HandshakeTimeout(_) | Self::Handshake(_) | Self::SessionClosed
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
