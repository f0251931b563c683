use thiserror::Error;

use crate::adapter::AdapterError;
use crate::model::ModelError;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Adapter(#[from] AdapterError),

    #[error(transparent)]
    Model(#[from] ModelError),

    /// The tool session is gone; a new one is needed.
    #[error("cannot reach tool service: {0}")]
    ToolService(#[source] mcp::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
