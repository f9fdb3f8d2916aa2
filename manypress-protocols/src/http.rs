//! Plain-HTTPS backend.
//!
//! Stateless: a site's canonical URL is a pure function of its id. There is
//! no daemon to manage, nothing to retract, and no peer concept.

use std::path::Path;

use async_trait::async_trait;

use manypress_core::types::{HttpLink, ProtocolStats, SiteId};

use crate::error::ProtocolError;
use crate::traits::Protocol;

#[derive(Debug, Clone, Default)]
pub struct HttpProtocol;

impl HttpProtocol {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Protocol for HttpProtocol {
    type Link = HttpLink;

    async fn load(&self) -> Result<(), ProtocolError> {
        Ok(())
    }

    async fn unload(&self) -> Result<(), ProtocolError> {
        Ok(())
    }

    async fn sync(&self, id: &SiteId, _folder: &Path) -> Result<HttpLink, ProtocolError> {
        Ok(HttpLink {
            enabled: true,
            link: format!("https://{id}"),
        })
    }

    async fn unsync(&self, _id: &SiteId, _prior: &HttpLink) -> Result<(), ProtocolError> {
        Ok(())
    }

    async fn stats(&self, _id: &SiteId) -> Result<ProtocolStats, ProtocolError> {
        Ok(ProtocolStats { peer_count: 0 })
    }
}
