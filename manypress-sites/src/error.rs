use manypress_core::{ProtocolKind, StoreError};

/// One backend's failure within a fan-out operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncFailure {
    pub kind: ProtocolKind,
    pub reason: String,
}

impl std::fmt::Display for SyncFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.reason)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SiteError {
    #[error(transparent)]
    Store(#[from] StoreError),

    /// One or more backends failed during a sync fan-out. Nothing was
    /// persisted; the side effects of the backends that did succeed remain
    /// on their networks until a retry reconciles them.
    #[error("sync failed on {} backend(s): {}", .failures.len(), format_failures(.failures))]
    Sync { failures: Vec<SyncFailure> },

    #[error("{kind} backend failed: {reason}")]
    Protocol { kind: ProtocolKind, reason: String },
}

fn format_failures(failures: &[SyncFailure]) -> String {
    failures
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}
