//! Error types for protocol backends.

use std::path::PathBuf;

use thiserror::Error;

/// All errors a protocol backend can surface.
///
/// `NotLoaded` and `DaemonFailed` are fatal programming/process errors and
/// must not be retried; the rest are transient per-protocol failures — the
/// whole-site `sync` is idempotent, so the caller may safely re-invoke it.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// A protocol call was made before `load()` completed.
    #[error("{backend} backend called before load()")]
    NotLoaded { backend: &'static str },

    /// A managed daemon could not be started, or crashed twice in a row.
    /// The process must not continue serving this backend.
    #[error("{backend} daemon failed: {reason}")]
    DaemonFailed {
        backend: &'static str,
        reason: String,
    },

    /// Daemon RPC transport failure (connect, timeout, body read).
    #[error("{backend} rpc error: {source}")]
    Rpc {
        backend: &'static str,
        #[source]
        source: reqwest::Error,
    },

    /// The daemon answered with an application-level error.
    #[error("{backend} daemon rejected {operation}: {message}")]
    Daemon {
        backend: &'static str,
        operation: &'static str,
        message: String,
    },

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON decode failure on a daemon response.
    #[error("failed to decode daemon response: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Convenience constructor for [`ProtocolError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> ProtocolError {
    ProtocolError::Io {
        path: path.into(),
        source,
    }
}

/// Convenience constructor for [`ProtocolError::Rpc`].
pub(crate) fn rpc_err(backend: &'static str, source: reqwest::Error) -> ProtocolError {
    ProtocolError::Rpc { backend, source }
}
