use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("no conversation matches {0}")]
    NotFound(String),

    #[error("{prefix} matches {count} conversations")]
    Ambiguous { prefix: String, count: usize },

    #[error("corrupt journal row: {0}")]
    Corrupt(String),
}

pub type Result<T> = std::result::Result<T, Error>;
