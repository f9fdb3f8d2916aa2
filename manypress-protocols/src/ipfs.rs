//! IPFS backend: content-addressed publishing under a stable IPNS key.
//!
//! Each site owns one subtree of a virtual MFS root (`/manypress/<id>` by
//! default) and one deterministically-named ed25519 key
//! (`manypress-site-<id>`) in the node's keystore. A sync replaces the
//! subtree and republishes its root CID under the key; the key's public
//! half is the site's permanent IPFS address and is never deleted.
//!
//! Two providers:
//! - `builtin` — a Kubo daemon spawned and owned by this process. A failed
//!   start is retried once after clearing the repo's stale `repo.lock` and
//!   `api` marker files; a second failure surfaces as a load error. A crash
//!   mid-run triggers one automatic reload; a second consecutive crash is
//!   fatal.
//! - `remote` — an already-running Kubo RPC endpoint.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::{Child, Command};
use tokio::sync::RwLock;

use manypress_core::types::{IpfsLink, ProtocolStats, SiteId};

use crate::error::{io_err, ProtocolError};
use crate::kubo::{IpnsKey, KuboClient};
use crate::traits::Protocol;

const BACKEND: &str = "ipfs";

/// Canonical inline empty-directory CID: published when a site has no
/// content, so an empty input is never an error.
const EMPTY_DIR: &str = "/ipfs/bafyaabakaieac/";

/// Keystore name prefix for per-site IPNS keys.
const KEY_PREFIX: &str = "manypress-site-";

/// How long a spawned daemon gets to answer `/api/v0/id` before startup
/// counts as failed.
const STARTUP_TIMEOUT: Duration = Duration::from_secs(30);
const STARTUP_POLL: Duration = Duration::from_millis(250);

/// Where the IPFS node comes from.
#[derive(Debug, Clone)]
pub enum IpfsProvider {
    /// Spawn and own a Kubo daemon bound to `repo`.
    Builtin {
        repo: PathBuf,
        /// Path to the `ipfs` binary.
        binary: PathBuf,
        /// RPC port for the managed daemon. 4737 == IPFS on a dialpad.
        api_port: u16,
    },
    /// Connect to an existing Kubo RPC endpoint.
    Remote { rpc_url: String },
}

#[derive(Debug, Clone)]
pub struct IpfsOptions {
    pub provider: IpfsProvider,
    /// Virtual MFS root under which every site gets its own subtree.
    pub mfs_root: String,
    /// Public gateway domain used in browser-facing URLs.
    pub gateway_domain: String,
}

/// A live node handle: RPC client plus the owned daemon, if builtin.
struct IpfsNode {
    client: KuboClient,
    daemon: Option<Child>,
    /// Set after an automatic reload, cleared once the daemon is seen
    /// alive again. Two crashes with no healthy check between are fatal.
    reloaded: bool,
}

pub struct IpfsProtocol {
    options: IpfsOptions,
    node: RwLock<Option<IpfsNode>>,
    /// Site id → resolved keystore key, filled lazily on first publish.
    keys: RwLock<HashMap<SiteId, IpnsKey>>,
}

impl IpfsProtocol {
    pub fn new(options: IpfsOptions) -> Self {
        Self {
            options,
            node: RwLock::new(None),
            keys: RwLock::new(HashMap::new()),
        }
    }

    fn mfs_location(&self, id: &SiteId) -> String {
        format!("{}/{}", self.options.mfs_root.trim_end_matches('/'), id)
    }

    /// Clone out the RPC client, verifying a builtin daemon is still alive.
    ///
    /// A dead daemon gets one automatic reload; if that reload fails, or if
    /// the reloaded daemon dies again before a healthy check, the error is
    /// fatal. Seeing the daemon alive clears the reload mark, so only
    /// consecutive crashes count.
    async fn ensure_alive(&self) -> Result<KuboClient, ProtocolError> {
        {
            let mut guard = self.node.write().await;
            let node = guard.as_mut().ok_or(ProtocolError::NotLoaded { backend: BACKEND })?;

            let crashed = match node.daemon.as_mut() {
                Some(child) => child.try_wait().map_err(|e| io_err("ipfs daemon", e))?.is_some(),
                None => false,
            };
            if !crashed {
                node.reloaded = false;
                return Ok(node.client.clone());
            }

            if node.reloaded {
                return Err(ProtocolError::DaemonFailed {
                    backend: BACKEND,
                    reason: "daemon exited again after automatic reload".into(),
                });
            }
            tracing::warn!("ipfs daemon exited unexpectedly, attempting reload");
            *guard = None;
        }

        self.load().await.map_err(|err| ProtocolError::DaemonFailed {
            backend: BACKEND,
            reason: format!("automatic reload failed: {err}"),
        })?;

        let mut guard = self.node.write().await;
        let node = guard.as_mut().ok_or(ProtocolError::NotLoaded { backend: BACKEND })?;
        node.reloaded = true;
        Ok(node.client.clone())
    }

    /// Resolve (or lazily create) the site's deterministically-named key.
    async fn make_or_get_key(
        &self,
        client: &KuboClient,
        id: &SiteId,
    ) -> Result<IpnsKey, ProtocolError> {
        if let Some(key) = self.keys.read().await.get(id) {
            return Ok(key.clone());
        }

        let name = format!("{KEY_PREFIX}{id}");
        let existing = client
            .key_list()
            .await?
            .into_iter()
            .find(|key| key.name == name);
        let key = match existing {
            Some(key) => key,
            None => client.key_gen(&name).await?,
        };

        self.keys.write().await.insert(id.clone(), key.clone());
        Ok(key)
    }

    /// Stat the site's MFS subtree and republish its root CID under the
    /// site key. The IPNS publish is the slow step (seconds to minutes).
    async fn publish_site(
        &self,
        client: &KuboClient,
        id: &SiteId,
    ) -> Result<(String, String), ProtocolError> {
        let mfs_location = self.mfs_location(id);
        let key = self.make_or_get_key(client, id).await?;
        tracing::info!(site = %id, key = %key.id, "resolved site key");

        let cid = client.files_stat_hash(&mfs_location).await?;
        tracing::info!(site = %id, cid = %cid, "got root CID, performing IPNS publish (this may take a while)");

        let published = client.name_publish(&format!("/ipfs/{cid}"), &key.name).await?;
        tracing::info!(site = %id, name = %published.name, value = %published.value, "published to IPFS");

        Ok((published.name, cid))
    }
}

#[async_trait]
impl Protocol for IpfsProtocol {
    type Link = IpfsLink;

    async fn load(&self) -> Result<(), ProtocolError> {
        let mut guard = self.node.write().await;
        if guard.is_some() {
            return Ok(());
        }

        let node = match &self.options.provider {
            IpfsProvider::Remote { rpc_url } => IpfsNode {
                client: KuboClient::new(rpc_url.clone()),
                daemon: None,
                reloaded: false,
            },
            IpfsProvider::Builtin {
                repo,
                binary,
                api_port,
            } => start_builtin(repo, binary, *api_port).await?,
        };

        *guard = Some(node);
        Ok(())
    }

    async fn unload(&self) -> Result<(), ProtocolError> {
        let mut guard = self.node.write().await;
        if let Some(mut node) = guard.take() {
            if let Some(mut child) = node.daemon.take() {
                if let Err(err) = child.kill().await {
                    tracing::warn!(error = %err, "failed to stop ipfs daemon");
                }
            }
        }
        self.keys.write().await.clear();
        Ok(())
    }

    async fn sync(&self, id: &SiteId, folder: &Path) -> Result<IpfsLink, ProtocolError> {
        tracing::info!(site = %id, "ipfs sync start");
        let client = self.ensure_alive().await?;
        let mfs_location = self.mfs_location(id);

        let to_publish = match client.add_dir(folder).await? {
            Some(cid) => format!("/ipfs/{cid}/"),
            None => EMPTY_DIR.to_owned(),
        };
        tracing::debug!(site = %id, root = %to_publish, "added content tree");

        // Atomically replace the site's subtree: rm the old (tolerating
        // absence), then link the new root in.
        client.files_rm_tolerant(&mfs_location).await?;
        client.files_cp(&to_publish, &mfs_location).await?;

        let (publish_key, cid) = self.publish_site(&client, id).await?;

        Ok(IpfsLink {
            enabled: true,
            link: format!("ipns://{id}/"),
            gateway: format!("https://{publish_key}.ipns.{}/", self.options.gateway_domain),
            cid,
            pub_key: format!("ipns://{publish_key}/"),
            dnslink: format!("/ipns/{publish_key}/"),
        })
    }

    async fn unsync(&self, id: &SiteId, _prior: &IpfsLink) -> Result<(), ProtocolError> {
        let client = self.ensure_alive().await?;
        let mfs_location = self.mfs_location(id);

        // Swap the subtree for the canonical empty directory and republish,
        // so the key points at the removed state instead of stale content.
        // The key itself is never deleted.
        client.files_rm_tolerant(&mfs_location).await?;
        client.files_cp(EMPTY_DIR, &mfs_location).await?;
        self.publish_site(&client, id).await?;
        Ok(())
    }

    async fn stats(&self, _id: &SiteId) -> Result<ProtocolStats, ProtocolError> {
        let client = self.ensure_alive().await?;
        let peer_count = client.swarm_peer_count().await?;
        Ok(ProtocolStats { peer_count })
    }
}

/// Spawn and own a Kubo daemon, retrying once after clearing stale lock
/// and API marker files left behind by a previous crash.
async fn start_builtin(
    repo: &Path,
    binary: &Path,
    api_port: u16,
) -> Result<IpfsNode, ProtocolError> {
    match try_start(repo, binary, api_port).await {
        Ok(node) => Ok(node),
        Err(first) => {
            tracing::warn!(error = %first, "ipfs daemon failed to start, clearing stale repo files and retrying");
            for stale in [repo.join("repo.lock"), repo.join("api")] {
                match std::fs::remove_file(&stale) {
                    Ok(()) => {}
                    Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                    Err(err) => return Err(io_err(&stale, err)),
                }
            }
            try_start(repo, binary, api_port)
                .await
                .map_err(|second| ProtocolError::DaemonFailed {
                    backend: BACKEND,
                    reason: format!("unable to start IPFS daemon: {second}"),
                })
        }
    }
}

async fn try_start(
    repo: &Path,
    binary: &Path,
    api_port: u16,
) -> Result<IpfsNode, ProtocolError> {
    if !repo.join("config").exists() {
        run_ipfs(binary, repo, &["init", "--profile", "server"]).await?;
    }
    let api_addr = format!("/ip4/127.0.0.1/tcp/{api_port}");
    run_ipfs(binary, repo, &["config", "Addresses.API", &api_addr]).await?;

    let mut child = Command::new(binary)
        .arg("daemon")
        .env("IPFS_PATH", repo)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| io_err(binary, e))?;

    let client = KuboClient::new(format!("http://127.0.0.1:{api_port}"));

    let deadline = tokio::time::Instant::now() + STARTUP_TIMEOUT;
    loop {
        if client.id().await.is_ok() {
            return Ok(IpfsNode {
                client,
                daemon: Some(child),
                reloaded: false,
            });
        }
        if let Some(status) = child.try_wait().map_err(|e| io_err("ipfs daemon", e))? {
            return Err(ProtocolError::DaemonFailed {
                backend: BACKEND,
                reason: format!("daemon exited during startup: {status}"),
            });
        }
        if tokio::time::Instant::now() >= deadline {
            let _ = child.kill().await;
            return Err(ProtocolError::DaemonFailed {
                backend: BACKEND,
                reason: "daemon did not answer /api/v0/id before timeout".into(),
            });
        }
        tokio::time::sleep(STARTUP_POLL).await;
    }
}

async fn run_ipfs(binary: &Path, repo: &Path, args: &[&str]) -> Result<(), ProtocolError> {
    let output = Command::new(binary)
        .args(args)
        .env("IPFS_PATH", repo)
        .output()
        .await
        .map_err(|e| io_err(binary, e))?;
    if output.status.success() {
        return Ok(());
    }
    Err(ProtocolError::DaemonFailed {
        backend: BACKEND,
        reason: format!(
            "`ipfs {}` failed: {}",
            args.join(" "),
            String::from_utf8_lossy(&output.stderr).trim()
        ),
    })
}
