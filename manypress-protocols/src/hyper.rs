//! Hyper backend: mirrors a local folder onto a mutable drive.
//!
//! The drive itself lives in an external hyper gateway daemon; this backend
//! is the orchestration layer around its control API:
//!
//! ```text
//! POST   /v1/drives                      {"name": <id>} → {"key", "url"}
//! PUT    /v1/drives/<key>/files/<path>   file bytes
//! DELETE /v1/drives/<key>/files/<path>
//! DELETE /v1/drives/<key>                close the drive handle
//! GET    /v1/drives/<key>/stats          → {"peers": n}
//! ```
//!
//! Drive identity is stable per site id: the key resolved on first access
//! is persisted in `<storage>/drives.json` and reused forever after.
//! Content is mirrored, not rewritten — see [`crate::mirror`] for the
//! manifest diff that produces the minimal change stream.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use manypress_core::types::{HyperLink, ProtocolStats, SiteId};

use crate::error::{io_err, rpc_err, ProtocolError};
use crate::mirror::{self, MirrorChange};
use crate::traits::{gateway_subdomain, Protocol};

const BACKEND: &str = "hyper";

#[derive(Debug, Clone)]
pub struct HyperOptions {
    /// Local storage root: drive key registry and mirror manifests.
    pub storage: PathBuf,
    /// Control endpoint of the hyper gateway daemon,
    /// e.g. `http://127.0.0.1:4973` (HYPE on a dialpad).
    pub gateway_url: String,
    /// Public gateway domain used in browser-facing URLs.
    pub gateway_domain: String,
}

/// An open mutable drive as reported by the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Drive {
    pub key: String,
    pub url: String,
}

#[derive(Debug, Deserialize)]
struct DriveStats {
    #[serde(default)]
    peers: u64,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct DriveRegistry {
    drives: HashMap<String, String>,
}

/// Thin client for the gateway daemon's control API.
#[derive(Debug, Clone)]
struct GatewayClient {
    base: String,
    http: reqwest::Client,
}

impl GatewayClient {
    fn new(base: impl Into<String>) -> Self {
        Self {
            base: base.into().trim_end_matches('/').to_owned(),
            http: reqwest::Client::new(),
        }
    }

    async fn open_drive(&self, name: &str) -> Result<Drive, ProtocolError> {
        let response = self
            .http
            .post(format!("{}/v1/drives", self.base))
            .json(&serde_json::json!({ "name": name }))
            .send()
            .await
            .map_err(|e| rpc_err(BACKEND, e))?;
        let response = check(response, "open drive").await?;
        response.json().await.map_err(|e| rpc_err(BACKEND, e))
    }

    async fn put_file(&self, key: &str, rel: &str, bytes: Vec<u8>) -> Result<(), ProtocolError> {
        let response = self
            .http
            .put(format!("{}/v1/drives/{key}/files/{rel}", self.base))
            .body(bytes)
            .send()
            .await
            .map_err(|e| rpc_err(BACKEND, e))?;
        check(response, "put file").await.map(|_| ())
    }

    async fn delete_file(&self, key: &str, rel: &str) -> Result<(), ProtocolError> {
        let response = self
            .http
            .delete(format!("{}/v1/drives/{key}/files/{rel}", self.base))
            .send()
            .await
            .map_err(|e| rpc_err(BACKEND, e))?;
        check(response, "delete file").await.map(|_| ())
    }

    async fn close_drive(&self, key: &str) -> Result<(), ProtocolError> {
        let response = self
            .http
            .delete(format!("{}/v1/drives/{key}", self.base))
            .send()
            .await
            .map_err(|e| rpc_err(BACKEND, e))?;
        check(response, "close drive").await.map(|_| ())
    }

    async fn drive_stats(&self, key: &str) -> Result<DriveStats, ProtocolError> {
        let response = self
            .http
            .get(format!("{}/v1/drives/{key}/stats", self.base))
            .send()
            .await
            .map_err(|e| rpc_err(BACKEND, e))?;
        let response = check(response, "drive stats").await?;
        response.json().await.map_err(|e| rpc_err(BACKEND, e))
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

pub struct HyperProtocol {
    options: HyperOptions,
    sdk: RwLock<Option<GatewayClient>>,
    /// Open-drive cache, keyed by site id; entries are evicted on close.
    drives: RwLock<HashMap<SiteId, Drive>>,
}

impl HyperProtocol {
    pub fn new(options: HyperOptions) -> Self {
        Self {
            options,
            sdk: RwLock::new(None),
            drives: RwLock::new(HashMap::new()),
        }
    }

    fn registry_path(&self) -> PathBuf {
        self.options.storage.join("drives.json")
    }

    fn load_registry(&self) -> Result<DriveRegistry, ProtocolError> {
        let path = self.registry_path();
        if !path.exists() {
            return Ok(DriveRegistry::default());
        }
        let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
        Ok(serde_json::from_str(&contents)?)
    }

    fn save_registry(&self, registry: &DriveRegistry) -> Result<(), ProtocolError> {
        let path = self.registry_path();
        let Some(dir) = path.parent() else {
            return Err(io_err(path, std::io::Error::other("invalid registry path")));
        };
        std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
        let json = serde_json::to_string_pretty(registry)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(|e| io_err(&tmp, e))?;
        std::fs::rename(&tmp, &path).map_err(|e| io_err(&path, e))?;
        Ok(())
    }

    async fn client(&self) -> Result<GatewayClient, ProtocolError> {
        self.sdk
            .read()
            .await
            .clone()
            .ok_or(ProtocolError::NotLoaded { backend: BACKEND })
    }

    /// Resolve-or-open the drive for `id`, caching the handle and
    /// persisting the key on first access.
    async fn get_drive(&self, id: &SiteId) -> Result<Drive, ProtocolError> {
        if let Some(drive) = self.drives.read().await.get(id) {
            return Ok(drive.clone());
        }

        let client = self.client().await?;
        let drive = client.open_drive(id.as_str()).await?;

        let mut registry = self.load_registry()?;
        if registry.drives.get(id.as_str()) != Some(&drive.key) {
            registry.drives.insert(id.to_string(), drive.key.clone());
            self.save_registry(&registry)?;
        }

        self.drives.write().await.insert(id.clone(), drive.clone());
        Ok(drive)
    }
}

#[async_trait]
impl Protocol for HyperProtocol {
    type Link = HyperLink;

    async fn load(&self) -> Result<(), ProtocolError> {
        let mut guard = self.sdk.write().await;
        if guard.is_none() {
            *guard = Some(GatewayClient::new(self.options.gateway_url.clone()));
        }
        Ok(())
    }

    async fn unload(&self) -> Result<(), ProtocolError> {
        let client = { self.sdk.write().await.take() };
        if let Some(client) = client {
            // Close every cached drive; best-effort.
            let drives: Vec<Drive> = self.drives.write().await.drain().map(|(_, d)| d).collect();
            for drive in drives {
                if let Err(err) = client.close_drive(&drive.key).await {
                    tracing::warn!(key = %drive.key, error = %err, "failed to close drive on unload");
                }
            }
        }
        Ok(())
    }

    async fn sync(&self, id: &SiteId, folder: &Path) -> Result<HyperLink, ProtocolError> {
        tracing::info!(site = %id, "hyper sync start");
        let client = self.client().await?;
        let drive = self.get_drive(id).await?;

        let mut manifest = mirror::load_at(&self.options.storage, id.as_str())?;
        let plan = mirror::plan(folder, &manifest.files)?;

        // Apply the change stream as it is produced, logging each record.
        for change in plan {
            match change? {
                MirrorChange::Put { key, source, digest } => {
                    tracing::debug!(site = %id, op = "put", key = %key);
                    let bytes = tokio::fs::read(&source)
                        .await
                        .map_err(|e| io_err(&source, e))?;
                    client.put_file(&drive.key, &key, bytes).await?;
                    manifest.files.insert(key, digest);
                }
                MirrorChange::Delete { key } => {
                    tracing::debug!(site = %id, op = "delete", key = %key);
                    client.delete_file(&drive.key, &key).await?;
                    manifest.files.remove(&key);
                }
            }
        }

        manifest.synced_at = Utc::now();
        mirror::save_at(&self.options.storage, id.as_str(), &manifest)?;

        let raw = drive.url.clone();
        let key = raw.strip_prefix("hyper://").unwrap_or(&raw).to_owned();
        let link = format!("hyper://{id}");
        let gateway = format!(
            "https://{}.hyper.{}/",
            gateway_subdomain(id),
            self.options.gateway_domain
        );
        tracing::info!(site = %id, link = %link, "hyper published");

        Ok(HyperLink {
            enabled: true,
            link,
            gateway,
            raw,
            dnslink: format!("/hyper/{key}"),
        })
    }

    async fn unsync(&self, id: &SiteId, _prior: &HyperLink) -> Result<(), ProtocolError> {
        let client = self.client().await?;
        let drive = self.get_drive(id).await?;

        // Close the handle and evict it; the drive's storage is kept so a
        // later sync republishes under the same key.
        client.close_drive(&drive.key).await?;
        self.drives.write().await.remove(id);
        Ok(())
    }

    async fn stats(&self, id: &SiteId) -> Result<ProtocolStats, ProtocolError> {
        let client = self.client().await?;
        let drive = self.get_drive(id).await?;
        let stats = client.drive_stats(&drive.key).await?;
        Ok(ProtocolStats {
            peer_count: stats.peers,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn protocol(storage: &Path) -> HyperProtocol {
        HyperProtocol::new(HyperOptions {
            storage: storage.to_path_buf(),
            gateway_url: "http://127.0.0.1:4973".into(),
            gateway_domain: "gateway.test".into(),
        })
    }

    #[tokio::test]
    async fn sync_before_load_is_a_programming_error() {
        let storage = TempDir::new().expect("tempdir");
        let hyper = protocol(storage.path());
        let err = hyper
            .sync(&SiteId::from("example.com"), Path::new("/tmp/site"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProtocolError::NotLoaded { backend: "hyper" }));
    }

    #[test]
    fn drive_registry_roundtrip() {
        let storage = TempDir::new().expect("tempdir");
        let hyper = protocol(storage.path());

        let mut registry = hyper.load_registry().expect("load empty");
        assert!(registry.drives.is_empty());

        registry
            .drives
            .insert("example.com".into(), "abcd1234".into());
        hyper.save_registry(&registry).expect("save");

        let reloaded = hyper.load_registry().expect("reload");
        assert_eq!(reloaded.drives.get("example.com"), Some(&"abcd1234".to_string()));
    }
}
