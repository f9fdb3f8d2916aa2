//! BitTorrent backend: seeds site content as a BEP 46 mutable torrent.
//!
//! Key material is derived, not stored per site: a single master seed at
//! `<storage>/seed.bin` (created on first load, mode 0600) plus the site id
//! yields the site's ed25519 keypair, so the public key in the magnet link
//! survives restarts and republishes.
//!
//! Actual seeding happens in an external seeder daemon controlled over HTTP:
//!
//! ```text
//! PUT    /v1/torrents/<pubkey>        {"metainfo", "seq", "signature", "path"}
//! DELETE /v1/torrents/<pubkey>        stop seeding
//! GET    /v1/torrents/<pubkey>/stats  → {"peers": n}
//! ```
//!
//! Content is snapshotted into `<storage>/data/<pubkey>/` before each
//! publish so the daemon never seeds a half-written build output. Each
//! publish stops the previous seed first: BEP 46 clients follow the
//! mutable record, they must not briefly see two live torrents under one
//! public key.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use ed25519_dalek::SigningKey;
use rand::RngCore;
use tokio::sync::RwLock;

use manypress_core::types::{BitTorrentLink, ProtocolStats, SiteId};

use crate::error::{io_err, rpc_err, ProtocolError};
use crate::torrent::{build_metainfo, derive_site_key, magnet_link, Metainfo, MutableRecord};
use crate::traits::{gateway_subdomain, Protocol};

const BACKEND: &str = "bittorrent";
const SEED_FILE: &str = "seed.bin";
const SEED_LEN: usize = 32;

#[derive(Debug, Clone)]
pub struct BitTorrentOptions {
    /// Local storage root: master seed and per-site content snapshots.
    pub storage: PathBuf,
    /// Control endpoint of the seeder daemon.
    pub seeder_url: String,
    /// Public gateway domain used in browser-facing URLs.
    pub gateway_domain: String,
}

/// Client for the seeder daemon's control API.
#[derive(Debug, Clone)]
struct SeederClient {
    base: String,
    http: reqwest::Client,
}

#[derive(Debug, serde::Serialize)]
struct SeedRequest<'a> {
    metainfo: String,
    seq: i64,
    signature: String,
    path: &'a str,
}

#[derive(Debug, serde::Deserialize)]
struct TorrentStats {
    #[serde(default)]
    peers: u64,
}

impl SeederClient {
    fn new(base: impl Into<String>) -> Self {
        Self {
            base: base.into().trim_end_matches('/').to_owned(),
            http: reqwest::Client::new(),
        }
    }

    async fn seed(&self, public_key: &str, request: &SeedRequest<'_>) -> Result<(), ProtocolError> {
        let response = self
            .http
            .put(format!("{}/v1/torrents/{public_key}", self.base))
            .json(request)
            .send()
            .await
            .map_err(|e| rpc_err(BACKEND, e))?;
        check(response, "seed").await.map(|_| ())
    }

    /// Stop seeding. A 404 means nothing was being seeded, which is fine.
    async fn stop(&self, public_key: &str) -> Result<(), ProtocolError> {
        let response = self
            .http
            .delete(format!("{}/v1/torrents/{public_key}", self.base))
            .send()
            .await
            .map_err(|e| rpc_err(BACKEND, e))?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(());
        }
        check(response, "stop").await.map(|_| ())
    }

    /// Peer count for an active torrent; 0 when nothing is being seeded.
    async fn stats(&self, public_key: &str) -> Result<u64, ProtocolError> {
        let response = self
            .http
            .get(format!("{}/v1/torrents/{public_key}/stats", self.base))
            .send()
            .await
            .map_err(|e| rpc_err(BACKEND, e))?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(0);
        }
        let response = check(response, "stats").await?;
        let stats: TorrentStats = response.json().await.map_err(|e| rpc_err(BACKEND, e))?;
        Ok(stats.peers)
    }
}

async fn check(
    response: reqwest::Response,
    operation: &'static str,
) -> Result<reqwest::Response, ProtocolError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response
        .text()
        .await
        .unwrap_or_else(|_| status.to_string());
    Err(ProtocolError::Daemon {
        backend: BACKEND,
        operation,
        message,
    })
}

pub struct BitTorrentProtocol {
    options: BitTorrentOptions,
    state: RwLock<Option<SeederState>>,
}

struct SeederState {
    client: SeederClient,
    master_seed: [u8; SEED_LEN],
}

impl BitTorrentProtocol {
    pub fn new(options: BitTorrentOptions) -> Self {
        Self {
            options,
            state: RwLock::new(None),
        }
    }

    /// Load the master seed, generating it on first use.
    fn load_or_create_seed(&self) -> Result<[u8; SEED_LEN], ProtocolError> {
        let path = self.options.storage.join(SEED_FILE);
        if path.exists() {
            let bytes = std::fs::read(&path).map_err(|e| io_err(&path, e))?;
            let seed: [u8; SEED_LEN] = bytes.try_into().map_err(|_| {
                io_err(&path, std::io::Error::other("master seed has wrong length"))
            })?;
            return Ok(seed);
        }

        std::fs::create_dir_all(&self.options.storage)
            .map_err(|e| io_err(&self.options.storage, e))?;
        let mut seed = [0u8; SEED_LEN];
        rand::thread_rng().fill_bytes(&mut seed);
        std::fs::write(&path, seed).map_err(|e| io_err(&path, e))?;
        restrict_file(&path)?;
        tracing::info!(path = %path.display(), "generated torrent master seed");
        Ok(seed)
    }

    async fn site_key(&self, id: &SiteId) -> Result<(SigningKey, SeederClient), ProtocolError> {
        let guard = self.state.read().await;
        let state = guard
            .as_ref()
            .ok_or(ProtocolError::NotLoaded { backend: BACKEND })?;
        let key = derive_site_key(&state.master_seed, id.as_str());
        Ok((key, state.client.clone()))
    }

    fn data_dir(&self, public_key_hex: &str) -> PathBuf {
        self.options.storage.join("data").join(public_key_hex)
    }

    /// Addressing metadata for a published torrent. `info_hash` and
    /// `pub_key` are `bittorrent://` URIs, not bare hex.
    fn make_link(&self, id: &SiteId, torrent: &Metainfo, public_key: &[u8; 32]) -> BitTorrentLink {
        let public_key_hex = hex::encode(public_key);
        BitTorrentLink {
            enabled: true,
            link: format!("bittorrent://{id}/"),
            gateway: format!(
                "https://{}.bt.{}/",
                gateway_subdomain(id),
                self.options.gateway_domain
            ),
            info_hash: format!("bittorrent://{}/", torrent.info_hash_hex()),
            pub_key: format!("bittorrent://{public_key_hex}/"),
            magnet: magnet_link(&torrent.info_hash, public_key),
            dnslink: format!("/bittorrent/{public_key_hex}"),
        }
    }
}

#[async_trait]
impl Protocol for BitTorrentProtocol {
    type Link = BitTorrentLink;

    async fn load(&self) -> Result<(), ProtocolError> {
        let mut guard = self.state.write().await;
        if guard.is_none() {
            *guard = Some(SeederState {
                client: SeederClient::new(self.options.seeder_url.clone()),
                master_seed: self.load_or_create_seed()?,
            });
        }
        Ok(())
    }

    async fn unload(&self) -> Result<(), ProtocolError> {
        self.state.write().await.take();
        Ok(())
    }

    async fn sync(&self, id: &SiteId, folder: &Path) -> Result<BitTorrentLink, ProtocolError> {
        tracing::info!(site = %id, "bittorrent sync start");
        let (key, client) = self.site_key(id).await?;
        let public_key = key.verifying_key().to_bytes();
        let public_key_hex = hex::encode(public_key);

        // Snapshot the content so the daemon seeds a stable tree.
        let data_dir = self.data_dir(&public_key_hex);
        replace_dir(folder, &data_dir)?;

        let torrent = build_metainfo(&data_dir, id.as_str())?.ok_or_else(|| {
            ProtocolError::Daemon {
                backend: BACKEND,
                operation: "seed",
                message: format!("nothing to seed for {id}: folder is empty"),
            }
        })?;

        // Sequence numbers only need to increase per key; wall-clock
        // seconds satisfy that across restarts.
        let seq = chrono::Utc::now().timestamp();
        let record = MutableRecord::sign(&key, seq, &torrent.info_hash);

        client.stop(&public_key_hex).await?;
        let data_path = data_dir.to_string_lossy();
        client
            .seed(
                &public_key_hex,
                &SeedRequest {
                    metainfo: hex::encode(torrent.encode()),
                    seq,
                    signature: record.signature_hex(),
                    path: data_path.as_ref(),
                },
            )
            .await?;

        tracing::info!(site = %id, info_hash = %torrent.info_hash_hex(), "bittorrent published");
        Ok(self.make_link(id, &torrent, &public_key))
    }

    async fn unsync(&self, id: &SiteId, _prior: &BitTorrentLink) -> Result<(), ProtocolError> {
        let (key, client) = self.site_key(id).await?;
        let public_key_hex = hex::encode(key.verifying_key().to_bytes());

        client.stop(&public_key_hex).await?;

        let data_dir = self.data_dir(&public_key_hex);
        if data_dir.exists() {
            std::fs::remove_dir_all(&data_dir).map_err(|e| io_err(&data_dir, e))?;
        }
        Ok(())
    }

    async fn stats(&self, id: &SiteId) -> Result<ProtocolStats, ProtocolError> {
        let (key, client) = self.site_key(id).await?;
        let public_key_hex = hex::encode(key.verifying_key().to_bytes());
        let peer_count = client.stats(&public_key_hex).await?;
        Ok(ProtocolStats { peer_count })
    }
}

/// Replace `dst` with a copy of `src`. `src` absent or empty leaves an
/// empty `dst`.
fn replace_dir(src: &Path, dst: &Path) -> Result<(), ProtocolError> {
    if dst.exists() {
        std::fs::remove_dir_all(dst).map_err(|e| io_err(dst, e))?;
    }
    std::fs::create_dir_all(dst).map_err(|e| io_err(dst, e))?;
    if !src.exists() {
        return Ok(());
    }

    let mut pending = vec![src.to_path_buf()];
    while let Some(dir) = pending.pop() {
        for entry in std::fs::read_dir(&dir).map_err(|e| io_err(&dir, e))? {
            let entry = entry.map_err(|e| io_err(&dir, e))?;
            let path = entry.path();
            let target = dst.join(path.strip_prefix(src).unwrap_or(&path));
            let ty = entry.file_type().map_err(|e| io_err(&path, e))?;
            if ty.is_dir() {
                std::fs::create_dir_all(&target).map_err(|e| io_err(&target, e))?;
                pending.push(path);
            } else if ty.is_file() {
                std::fs::copy(&path, &target).map_err(|e| io_err(&target, e))?;
            }
        }
    }
    Ok(())
}

#[cfg(unix)]
fn restrict_file(path: &Path) -> Result<(), ProtocolError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .map_err(|e| io_err(path, e))
}

#[cfg(not(unix))]
fn restrict_file(_path: &Path) -> Result<(), ProtocolError> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn protocol(storage: &Path) -> BitTorrentProtocol {
        BitTorrentProtocol::new(BitTorrentOptions {
            storage: storage.to_path_buf(),
            seeder_url: "http://127.0.0.1:4838".into(),
            gateway_domain: "gateway.test".into(),
        })
    }

    #[tokio::test]
    async fn load_creates_the_master_seed_once() {
        let storage = TempDir::new().expect("tempdir");
        let bt = protocol(storage.path());

        bt.load().await.expect("load");
        let seed_path = storage.path().join(SEED_FILE);
        let first = std::fs::read(&seed_path).expect("seed");
        assert_eq!(first.len(), SEED_LEN);

        // A second load keeps the existing seed.
        bt.unload().await.expect("unload");
        bt.load().await.expect("reload");
        assert_eq!(std::fs::read(&seed_path).expect("seed"), first);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn master_seed_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let storage = TempDir::new().expect("tempdir");
        let bt = protocol(storage.path());
        bt.load().await.expect("load");

        let meta = std::fs::metadata(storage.path().join(SEED_FILE)).expect("meta");
        assert_eq!(meta.permissions().mode() & 0o777, 0o600);
    }

    #[tokio::test]
    async fn sync_before_load_is_a_programming_error() {
        let storage = TempDir::new().expect("tempdir");
        let bt = protocol(storage.path());
        let err = bt
            .sync(&SiteId::from("example.com"), Path::new("/tmp/site"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProtocolError::NotLoaded { backend: "bittorrent" }));
    }

    #[test]
    fn link_record_uses_bittorrent_uris_for_info_hash_and_pub_key() {
        let storage = TempDir::new().expect("tempdir");
        let content = TempDir::new().expect("tempdir");
        std::fs::write(content.path().join("index.html"), "<html>").expect("write");

        let bt = protocol(storage.path());
        let id = SiteId::from("example.com");
        let torrent = build_metainfo(content.path(), id.as_str())
            .expect("metainfo")
            .expect("non-empty folder");
        let key = derive_site_key(&[7u8; SEED_LEN], id.as_str());
        let public_key = key.verifying_key().to_bytes();

        let link = bt.make_link(&id, &torrent, &public_key);
        assert_eq!(link.link, "bittorrent://example.com/");
        assert_eq!(
            link.info_hash,
            format!("bittorrent://{}/", torrent.info_hash_hex())
        );
        assert_eq!(
            link.pub_key,
            format!("bittorrent://{}/", hex::encode(public_key))
        );
        assert_eq!(link.dnslink, format!("/bittorrent/{}", hex::encode(public_key)));
        assert!(link.magnet.starts_with("magnet:?"));
        assert_eq!(link.gateway, "https://example-com.bt.gateway.test/");
    }

    #[test]
    fn replace_dir_mirrors_nested_content() {
        let src = TempDir::new().expect("tempdir");
        let dst = TempDir::new().expect("tempdir");
        std::fs::create_dir_all(src.path().join("css")).expect("mkdir");
        std::fs::write(src.path().join("index.html"), "<html>").expect("write");
        std::fs::write(src.path().join("css/site.css"), "body{}").expect("write");
        std::fs::write(dst.path().join("stale.txt"), "old").expect("write");

        replace_dir(src.path(), dst.path()).expect("replace");
        assert!(dst.path().join("index.html").exists());
        assert!(dst.path().join("css/site.css").exists());
        assert!(!dst.path().join("stale.txt").exists(), "stale files removed");
    }
}
