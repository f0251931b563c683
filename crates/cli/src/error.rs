//! CLI error types.

use std::path::PathBuf;
use thiserror::Error;

use crate::config::ConfigError;

/// CLI errors.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The journal file does not exist.
    ///
    /// This typically means no chat has been started yet.
    #[error("journal not found at {path}. Run 'ganache chat' first")]
    JournalNotFound { path: PathBuf },

    /// `serve` was started without a dataset.
    #[error("no dataset configured: pass --data or set GANACHE_DATA")]
    NoDataset,

    /// The dataset could not be loaded; nothing is served.
    #[error("cannot load dataset: {0}")]
    Catalog(#[from] catalog::Error),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// The tool server could not be started or stopped answering.
    #[error("cannot reach tool service: {0}")]
    ToolService(#[from] mcp::Error),

    #[error(transparent)]
    Runtime(#[from] runtime::Error),

    #[error(transparent)]
    Journal(#[from] journal::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
