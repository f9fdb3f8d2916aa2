//! Wires configuration into the concrete protocol stack and site store.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use manypress_core::types::{Links, SiteId};
use manypress_core::StoreError;
use manypress_dns::SiteLookup;
use manypress_protocols::{
    BitTorrentOptions, BitTorrentProtocol, HttpProtocol, HyperOptions, HyperProtocol, IpfsOptions,
    IpfsProtocol, IpfsProvider, ProtocolManager,
};
use manypress_sites::{SiteConfigStore, SiteError};

use crate::config::{Config, IpfsProviderConfig};

/// The production store: every backend is the real one.
pub type AppStore =
    SiteConfigStore<HttpProtocol, IpfsProtocol, HyperProtocol, BitTorrentProtocol>;

pub fn build_store(config: &Config) -> anyhow::Result<AppStore> {
    let provider = match config.ipfs.provider {
        IpfsProviderConfig::Builtin => IpfsProvider::Builtin {
            repo: config.data_dir.join("ipfs"),
            binary: config.ipfs.binary.clone(),
            api_port: config.ipfs.api_port,
        },
        IpfsProviderConfig::Remote => IpfsProvider::Remote {
            rpc_url: config.ipfs.rpc_url.clone(),
        },
    };

    let manager = ProtocolManager::new(
        HttpProtocol::new(),
        IpfsProtocol::new(IpfsOptions {
            provider,
            mfs_root: config.ipfs.mfs_root.clone(),
            gateway_domain: config.gateway_domain.clone(),
        }),
        HyperProtocol::new(HyperOptions {
            storage: config.data_dir.join("hyper"),
            gateway_url: config.hyper.gateway_url.clone(),
            gateway_domain: config.gateway_domain.clone(),
        }),
        BitTorrentProtocol::new(BitTorrentOptions {
            storage: config.data_dir.join("bittorrent"),
            seeder_url: config.bittorrent.seeder_url.clone(),
            gateway_domain: config.gateway_domain.clone(),
        }),
    );

    let store = SiteConfigStore::open(&config.data_dir, manager)?
        .with_sync_timeout(Duration::from_secs(config.sync_timeout_secs));
    Ok(store)
}

/// Adapts the site store to the DNS responder's lookup interface.
pub struct StoreLookup(pub Arc<AppStore>);

#[async_trait]
impl SiteLookup for StoreLookup {
    async fn lookup(&self, domain: &str) -> Option<Links> {
        match self.0.get(&SiteId::from(domain)) {
            Ok(site) => Some(site.links),
            Err(SiteError::Store(StoreError::NotFound { .. })) => None,
            Err(err) => {
                tracing::warn!(domain, error = %err, "site lookup failed");
                None
            }
        }
    }
}
