//! In-memory backend error types

use nimbus_cloud::CloudError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MemoryError {
    #[error("Scope '{0}' is poisoned by a panicked transaction")]
    Poisoned(String),

    #[error("Corrupt record {table}/{key}: {source}")]
    Codec {
        table: String,
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, MemoryError>;

impl From<MemoryError> for CloudError {
    fn from(err: MemoryError) -> Self {
        match err {
            MemoryError::Json(e) => CloudError::Json(e),
            other => CloudError::ApiError(other.to_string()),
        }
    }
}
