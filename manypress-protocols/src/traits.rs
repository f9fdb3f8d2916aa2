//! The protocol capability contract.

use std::path::Path;

use async_trait::async_trait;

use manypress_core::types::{ProtocolStats, SiteId};

use crate::error::ProtocolError;

/// One unit of publish work, implemented independently per backend.
///
/// `load()` must be awaited once before any other call; it is idempotent.
/// `unload()` releases everything `load()` acquired and is best-effort.
/// Operations are network-bound and may take seconds to minutes. Calls for
/// *different* site ids may run concurrently; callers must not issue
/// concurrent calls for the same id.
#[async_trait]
pub trait Protocol: Send + Sync {
    /// Canonical addressing metadata returned by a successful sync.
    type Link: Clone + Send + Sync;

    /// Acquire or start any long-lived daemon or SDK handle.
    async fn load(&self) -> Result<(), ProtocolError>;

    /// Release all resources acquired by `load`. Called at most once; must
    /// not fail hard on partial cleanup.
    async fn unload(&self) -> Result<(), ProtocolError>;

    /// Publish the directory at `folder` under `id`.
    async fn sync(&self, id: &SiteId, folder: &Path) -> Result<Self::Link, ProtocolError>;

    /// Retract the publication described by `prior`.
    async fn unsync(&self, id: &SiteId, prior: &Self::Link) -> Result<(), ProtocolError>;

    /// Lightweight liveness probe. No side effects beyond opening handles.
    async fn stats(&self, id: &SiteId) -> Result<ProtocolStats, ProtocolError>;
}

/// Subdomain encoding shared by the gateway URL builders:
/// `-` becomes `--`, `.` becomes `-`, so `my-site.example.com` stays
/// reversible as a single DNS label.
pub(crate) fn gateway_subdomain(id: &SiteId) -> String {
    id.as_str().replace('-', "--").replace('.', "-")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subdomain_encoding_escapes_hyphens_then_dots() {
        assert_eq!(
            gateway_subdomain(&SiteId::from("my-site.example.com")),
            "my--site-example-com"
        );
        assert_eq!(gateway_subdomain(&SiteId::from("example.com")), "example-com");
    }
}
