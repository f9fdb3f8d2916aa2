//! Error types for manypress-core.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise from the collection store and validation.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying I/O failure, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization error (write/save path).
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// JSON parse error on load — includes the file path for context.
    #[error("failed to parse record at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// No record stored under the requested key.
    #[error("record not found: {key}")]
    NotFound { key: String },

    /// The candidate domain is not a bare hostname.
    #[error("invalid hostname '{domain}': leave out the port and protocol specifiers (e.g. no https://)")]
    InvalidHostname { domain: String },
}

/// Convenience constructor for [`StoreError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.into(),
        source,
    }
}
