//! Site records and per-site publish orchestration.
//!
//! [`SiteConfigStore`] owns the `sites` collection and fans each site's
//! `sync`/`unsync` out to the backends it has enabled. The fan-out is
//! all-or-nothing on the persistence side: every backend settles first,
//! then the link record is written once. A failed fan-out persists
//! nothing — the succeeding backends' network side effects stand until a
//! retried sync reconciles the record (each backend's sync is idempotent).

use std::path::Path;
use std::time::Duration;

use manypress_core::types::{
    BitTorrentLink, HttpLink, HyperLink, IpfsLink, Links, NewSite, ProtocolKind, Site, SiteId,
    SiteStats, UpdateSite,
};
use manypress_core::{hostname, Collection};
use manypress_protocols::traits::Protocol;
use manypress_protocols::ProtocolManager;

use crate::error::{SiteError, SyncFailure};

/// Upper bound on one backend's publish. IPNS and DHT publishes are slow
/// but bounded; a hung daemon must not stall the whole sync forever.
pub const DEFAULT_SYNC_TIMEOUT: Duration = Duration::from_secs(300);

pub struct SiteConfigStore<H, I, Y, B>
where
    H: Protocol<Link = HttpLink>,
    I: Protocol<Link = IpfsLink>,
    Y: Protocol<Link = HyperLink>,
    B: Protocol<Link = BitTorrentLink>,
{
    sites: Collection<Site>,
    manager: ProtocolManager<H, I, Y, B>,
    sync_timeout: Duration,
}

impl<H, I, Y, B> SiteConfigStore<H, I, Y, B>
where
    H: Protocol<Link = HttpLink>,
    I: Protocol<Link = IpfsLink>,
    Y: Protocol<Link = HyperLink>,
    B: Protocol<Link = BitTorrentLink>,
{
    /// Open the `sites` collection under `data_root`.
    pub fn open(
        data_root: &Path,
        manager: ProtocolManager<H, I, Y, B>,
    ) -> Result<Self, SiteError> {
        Ok(Self {
            sites: Collection::open(data_root, "sites")?,
            manager,
            sync_timeout: DEFAULT_SYNC_TIMEOUT,
        })
    }

    pub fn with_sync_timeout(mut self, timeout: Duration) -> Self {
        self.sync_timeout = timeout;
        self
    }

    pub fn manager(&self) -> &ProtocolManager<H, I, Y, B> {
        &self.manager
    }

    /// Create a site record. The candidate domain must be a bare hostname:
    /// no scheme, no port.
    pub fn create(&self, new_site: NewSite) -> Result<Site, SiteError> {
        hostname::validate(&new_site.domain)?;
        let site = Site {
            id: SiteId::from(new_site.domain.clone()),
            domain: new_site.domain,
            public: new_site.public.unwrap_or(false),
            protocols: new_site.protocols,
            links: Links::default(),
        };
        self.sites.put(site.id.as_str(), &site)?;
        tracing::info!(site = %site.id, public = site.public, "site created");
        Ok(site)
    }

    pub fn get(&self, id: &SiteId) -> Result<Site, SiteError> {
        Ok(self.sites.get(id.as_str())?)
    }

    /// Apply a partial update. Link records are never touched here.
    pub fn update(&self, id: &SiteId, update: UpdateSite) -> Result<(), SiteError> {
        let mut site = self.sites.get(id.as_str())?;
        if let Some(protocols) = update.protocols {
            site.protocols = protocols;
        }
        if let Some(public) = update.public {
            site.public = public;
        }
        self.sites.put(id.as_str(), &site)?;
        Ok(())
    }

    /// Site ids, sorted. With `hide_private`, only `public: true` sites.
    pub fn list_all(&self, hide_private: bool) -> Result<Vec<SiteId>, SiteError> {
        let keys = self.sites.keys()?;
        if !hide_private {
            return Ok(keys.into_iter().map(SiteId::from).collect());
        }
        let mut ids = Vec::new();
        for key in keys {
            let site = self.sites.get(&key)?;
            if site.public {
                ids.push(site.id);
            }
        }
        Ok(ids)
    }

    /// Publish `folder` over every enabled protocol, concurrently, then
    /// persist the merged link record in a single write. After a
    /// successful sync, a link is present if and only if its protocol
    /// was flagged at the start of the call.
    pub async fn sync(&self, id: &SiteId, folder: &Path) -> Result<(), SiteError> {
        let mut site = self.sites.get(id.as_str())?;
        let flags = site.protocols;
        tracing::info!(site = %id, folder = %folder.display(), "sync start");

        let (http, ipfs, hyper, bittorrent) = tokio::join!(
            self.run_sync(&self.manager.http, flags.http, ProtocolKind::Http, id, folder),
            self.run_sync(&self.manager.ipfs, flags.ipfs, ProtocolKind::Ipfs, id, folder),
            self.run_sync(&self.manager.hyper, flags.hyper, ProtocolKind::Hyper, id, folder),
            self.run_sync(
                &self.manager.bittorrent,
                flags.bittorrent,
                ProtocolKind::Bittorrent,
                id,
                folder
            ),
        );

        let mut links = Links::default();
        let mut failures = Vec::new();
        match http {
            Ok(link) => links.http = link,
            Err(failure) => failures.push(failure),
        }
        match ipfs {
            Ok(link) => links.ipfs = link,
            Err(failure) => failures.push(failure),
        }
        match hyper {
            Ok(link) => links.hyper = link,
            Err(failure) => failures.push(failure),
        }
        match bittorrent {
            Ok(link) => links.bittorrent = link,
            Err(failure) => failures.push(failure),
        }

        if !failures.is_empty() {
            for failure in &failures {
                tracing::error!(site = %id, backend = %failure.kind, reason = %failure.reason, "sync failed");
            }
            return Err(SiteError::Sync { failures });
        }

        site.links = links;
        self.sites.put(id.as_str(), &site)?;
        tracing::info!(site = %id, "sync complete");
        Ok(())
    }

    /// Retract the site from every protocol present in `links` (not in
    /// `protocols`: a synced-then-disabled protocol must still be
    /// retracted), then remove the record. Retraction failures are
    /// logged, not propagated — the record is being destroyed regardless.
    pub async fn delete(&self, id: &SiteId) -> Result<(), SiteError> {
        let site = self.sites.get(id.as_str())?;
        tracing::info!(site = %id, "delete start");

        tokio::join!(
            run_unsync(&self.manager.http, ProtocolKind::Http, id, site.links.http.as_ref()),
            run_unsync(&self.manager.ipfs, ProtocolKind::Ipfs, id, site.links.ipfs.as_ref()),
            run_unsync(&self.manager.hyper, ProtocolKind::Hyper, id, site.links.hyper.as_ref()),
            run_unsync(
                &self.manager.bittorrent,
                ProtocolKind::Bittorrent,
                id,
                site.links.bittorrent.as_ref()
            ),
        );

        self.sites.del(id.as_str())?;
        tracing::info!(site = %id, "site deleted");
        Ok(())
    }

    /// Peer counts for the protocols that have a peer concept.
    pub async fn stats(&self, id: &SiteId) -> Result<SiteStats, SiteError> {
        // Record must exist, even though the probes only need the id.
        let _site = self.sites.get(id.as_str())?;

        let (ipfs, hyper) = tokio::join!(
            self.manager.ipfs.stats(id),
            self.manager.hyper.stats(id),
        );
        Ok(SiteStats {
            ipfs: ipfs.map_err(|e| SiteError::Protocol {
                kind: ProtocolKind::Ipfs,
                reason: e.to_string(),
            })?,
            hyper: hyper.map_err(|e| SiteError::Protocol {
                kind: ProtocolKind::Hyper,
                reason: e.to_string(),
            })?,
        })
    }

    async fn run_sync<P: Protocol>(
        &self,
        protocol: &P,
        enabled: bool,
        kind: ProtocolKind,
        id: &SiteId,
        folder: &Path,
    ) -> Result<Option<P::Link>, SyncFailure> {
        if !enabled {
            return Ok(None);
        }
        match tokio::time::timeout(self.sync_timeout, protocol.sync(id, folder)).await {
            Ok(Ok(link)) => Ok(Some(link)),
            Ok(Err(err)) => Err(SyncFailure {
                kind,
                reason: err.to_string(),
            }),
            Err(_) => Err(SyncFailure {
                kind,
                reason: format!("timed out after {}s", self.sync_timeout.as_secs()),
            }),
        }
    }
}

async fn run_unsync<P: Protocol>(
    protocol: &P,
    kind: ProtocolKind,
    id: &SiteId,
    prior: Option<&P::Link>,
) {
    let Some(prior) = prior else {
        return;
    };
    if let Err(err) = protocol.unsync(id, prior).await {
        tracing::warn!(site = %id, backend = %kind, error = %err, "unsync failed during delete");
    }
}
