//! Owns one instance of every backend and drives their lifecycles together.

use manypress_core::types::{BitTorrentLink, HttpLink, HyperLink, IpfsLink};

use crate::error::ProtocolError;
use crate::traits::Protocol;

/// The full set of publishing backends.
///
/// Generic over the concrete backend types so tests can substitute mock
/// implementations; production code uses
/// [`HttpProtocol`](crate::HttpProtocol), [`IpfsProtocol`](crate::IpfsProtocol),
/// [`HyperProtocol`](crate::HyperProtocol) and
/// [`BitTorrentProtocol`](crate::BitTorrentProtocol).
pub struct ProtocolManager<H, I, Y, B>
where
    H: Protocol<Link = HttpLink>,
    I: Protocol<Link = IpfsLink>,
    Y: Protocol<Link = HyperLink>,
    B: Protocol<Link = BitTorrentLink>,
{
    pub http: H,
    pub ipfs: I,
    pub hyper: Y,
    pub bittorrent: B,
}

impl<H, I, Y, B> ProtocolManager<H, I, Y, B>
where
    H: Protocol<Link = HttpLink>,
    I: Protocol<Link = IpfsLink>,
    Y: Protocol<Link = HyperLink>,
    B: Protocol<Link = BitTorrentLink>,
{
    pub fn new(http: H, ipfs: I, hyper: Y, bittorrent: B) -> Self {
        Self {
            http,
            ipfs,
            hyper,
            bittorrent,
        }
    }

    /// Load every backend concurrently. Fails as a whole if any backend
    /// fails: a partially loaded manager would publish to some networks
    /// and silently skip others.
    pub async fn load(&self) -> Result<(), ProtocolError> {
        tokio::try_join!(
            self.http.load(),
            self.ipfs.load(),
            self.hyper.load(),
            self.bittorrent.load(),
        )?;
        tracing::info!("all protocol backends loaded");
        Ok(())
    }

    /// Unload every backend, best-effort. Failures are logged, not
    /// propagated: one stuck daemon must not block shutdown of the rest.
    pub async fn unload(&self) {
        let (http, ipfs, hyper, bittorrent) = tokio::join!(
            self.http.unload(),
            self.ipfs.unload(),
            self.hyper.unload(),
            self.bittorrent.unload(),
        );
        for (backend, result) in [
            ("http", http),
            ("ipfs", ipfs),
            ("hyper", hyper),
            ("bittorrent", bittorrent),
        ] {
            if let Err(err) = result {
                tracing::warn!(backend, error = %err, "backend failed to unload");
            }
        }
    }
}
