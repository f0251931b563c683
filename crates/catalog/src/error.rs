//! Catalog error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading or querying the catalog.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The catalog has no loaded record set.
    #[error("dataset not loaded")]
    NotReady,

    /// The source could not be read.
    #[error("failed to read dataset {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The source was read but produced no usable rows.
    #[error("dataset is empty")]
    Empty,

    /// A row in the source is not valid JSON.
    #[error("invalid row at line {line}: {source}")]
    Parse {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("missing required parameter: {0}")]
    MissingParameter(&'static str),

    #[error("invalid operator: {0}")]
    InvalidOperator(String),

    #[error("unknown chocolate type: {0}")]
    UnknownBaseType(String),

    #[error("limit must be a positive integer")]
    InvalidLimit,
}

pub type Result<T> = std::result::Result<T, Error>;
