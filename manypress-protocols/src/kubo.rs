//! Minimal Kubo (go-ipfs) RPC client.
//!
//! Covers the slice of `/api/v0` the IPFS backend needs: recursive adds,
//! MFS manipulation, keystore lookups, and IPNS publishes. Every endpoint
//! is a POST; errors come back as a JSON body with a `Message` field.

use std::path::{Path, PathBuf};

use reqwest::multipart::{Form, Part};
use serde::Deserialize;

use crate::error::{io_err, rpc_err, ProtocolError};

const BACKEND: &str = "ipfs";

/// An IPNS key as reported by the Kubo keystore.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct IpnsKey {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Id")]
    pub id: String,
}

#[derive(Debug, Deserialize)]
struct KeyListResponse {
    #[serde(rename = "Keys", default)]
    keys: Vec<IpnsKey>,
}

#[derive(Debug, Deserialize)]
struct AddedEntry {
    #[serde(rename = "Hash")]
    hash: String,
}

#[derive(Debug, Deserialize)]
struct FilesStatResponse {
    #[serde(rename = "Hash")]
    hash: String,
}

/// Result of an IPNS publish: the key's public name and the published value.
#[derive(Debug, Clone, Deserialize)]
pub struct PublishResponse {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Value")]
    pub value: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(rename = "Message", default)]
    message: String,
}

/// HTTP client for one Kubo RPC endpoint.
#[derive(Debug, Clone)]
pub struct KuboClient {
    base: String,
    http: reqwest::Client,
}

impl KuboClient {
    /// `base` is the RPC address, e.g. `http://127.0.0.1:4737`.
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            base: base.into().trim_end_matches('/').to_owned(),
            http: reqwest::Client::new(),
        }
    }

    /// `POST /api/v0/id` — cheap readiness probe.
    pub async fn id(&self) -> Result<(), ProtocolError> {
        self.call("id", &[]).await.map(|_| ())
    }

    /// Recursively add every regular file under `folder`, unpinned,
    /// wrapped in a directory, CIDv1. Returns the wrapping root CID, or
    /// `None` when the folder holds no files.
    pub async fn add_dir(&self, folder: &Path) -> Result<Option<String>, ProtocolError> {
        let files = collect_files(folder)?;
        if files.is_empty() {
            return Ok(None);
        }

        let mut form = Form::new();
        for (abs, rel) in &files {
            let bytes = tokio::fs::read(abs).await.map_err(|e| io_err(abs, e))?;
            let part = Part::bytes(bytes)
                .file_name(rel.clone())
                .mime_str("application/octet-stream")
                .map_err(|e| rpc_err(BACKEND, e))?;
            form = form.part("file", part);
        }

        let url = format!(
            "{}/api/v0/add?pin=false&wrap-with-directory=true&cid-version=1",
            self.base
        );
        let response = self
            .http
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| rpc_err(BACKEND, e))?;
        let body = Self::check("add", response).await?;

        // NDJSON, one entry per added path; the wrapping directory is last.
        let mut root = None;
        for line in body.lines().filter(|l| !l.trim().is_empty()) {
            let entry: AddedEntry = serde_json::from_str(line)?;
            root = Some(entry.hash);
        }
        Ok(root)
    }

    /// `files/rm -r` on an MFS path. "file does not exist" is tolerated.
    pub async fn files_rm_tolerant(&self, mfs_path: &str) -> Result<(), ProtocolError> {
        let result = self
            .call("files/rm", &[("arg", mfs_path), ("recursive", "true")])
            .await;
        match result {
            Ok(_) => Ok(()),
            Err(ProtocolError::Daemon { message, .. })
                if message.contains("file does not exist") =>
            {
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    /// `files/cp` — link an immutable `/ipfs/<cid>/` path into MFS.
    pub async fn files_cp(&self, src: &str, dst: &str) -> Result<(), ProtocolError> {
        self.call(
            "files/cp",
            &[("arg", src), ("arg", dst), ("parents", "true"), ("flush", "true")],
        )
        .await
        .map(|_| ())
    }

    /// `files/stat --hash` — the root CID of an MFS subtree.
    pub async fn files_stat_hash(&self, mfs_path: &str) -> Result<String, ProtocolError> {
        let body = self
            .call("files/stat", &[("arg", mfs_path), ("hash", "true")])
            .await?;
        let stat: FilesStatResponse = serde_json::from_str(&body)?;
        Ok(stat.hash)
    }

    /// All keys in the keystore.
    pub async fn key_list(&self) -> Result<Vec<IpnsKey>, ProtocolError> {
        let body = self.call("key/list", &[]).await?;
        let list: KeyListResponse = serde_json::from_str(&body)?;
        Ok(list.keys)
    }

    /// Generate a named ed25519 key.
    pub async fn key_gen(&self, name: &str) -> Result<IpnsKey, ProtocolError> {
        let body = self
            .call("key/gen", &[("arg", name), ("type", "ed25519")])
            .await?;
        let key: IpnsKey = serde_json::from_str(&body)?;
        Ok(key)
    }

    /// IPNS publish of `/ipfs/<cid>` under the named key. Slow: the DHT
    /// put can take many seconds.
    pub async fn name_publish(
        &self,
        ipfs_path: &str,
        key_name: &str,
    ) -> Result<PublishResponse, ProtocolError> {
        let body = self
            .call(
                "name/publish",
                &[("arg", ipfs_path), ("key", key_name), ("allow-offline", "true")],
            )
            .await?;
        let published: PublishResponse = serde_json::from_str(&body)?;
        Ok(published)
    }

    /// Currently connected swarm peer count.
    pub async fn swarm_peer_count(&self) -> Result<u64, ProtocolError> {
        #[derive(Debug, Deserialize)]
        struct SwarmPeers {
            #[serde(rename = "Peers", default)]
            peers: Vec<serde_json::Value>,
        }
        let body = self.call("swarm/peers", &[]).await?;
        let peers: SwarmPeers = serde_json::from_str(&body)?;
        Ok(peers.peers.len() as u64)
    }

    async fn call(
        &self,
        endpoint: &'static str,
        query: &[(&str, &str)],
    ) -> Result<String, ProtocolError> {
        let url = format!("{}/api/v0/{endpoint}", self.base);
        let response = self
            .http
            .post(&url)
            .query(query)
            .send()
            .await
            .map_err(|e| rpc_err(BACKEND, e))?;
        Self::check(endpoint, response).await
    }

    async fn check(
        operation: &'static str,
        response: reqwest::Response,
    ) -> Result<String, ProtocolError> {
        let status = response.status();
        let body = response.text().await.map_err(|e| rpc_err(BACKEND, e))?;
        if status.is_success() {
            return Ok(body);
        }
        let message = serde_json::from_str::<ErrorBody>(&body)
            .map(|e| e.message)
            .unwrap_or(body);
        Err(ProtocolError::Daemon {
            backend: BACKEND,
            operation,
            message,
        })
    }
}

/// Walk `folder` and return `(absolute, relative)` paths of every regular
/// file, sorted by relative path for deterministic adds.
fn collect_files(folder: &Path) -> Result<Vec<(PathBuf, String)>, ProtocolError> {
    let mut files = Vec::new();
    if !folder.exists() {
        return Ok(files);
    }

    let mut pending = vec![folder.to_path_buf()];
    while let Some(dir) = pending.pop() {
        for entry in std::fs::read_dir(&dir).map_err(|e| io_err(&dir, e))? {
            let entry = entry.map_err(|e| io_err(&dir, e))?;
            let path = entry.path();
            let ty = entry.file_type().map_err(|e| io_err(&path, e))?;
            if ty.is_dir() {
                pending.push(path);
            } else if ty.is_file() {
                let rel = path
                    .strip_prefix(folder)
                    .unwrap_or(&path)
                    .to_string_lossy()
                    .replace(std::path::MAIN_SEPARATOR, "/");
                files.push((path, rel));
            }
        }
    }

    files.sort_by(|a, b| a.1.cmp(&b.1));
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn collect_files_walks_recursively_and_sorts() {
        let dir = TempDir::new().expect("tempdir");
        std::fs::create_dir_all(dir.path().join("css")).expect("mkdir");
        std::fs::write(dir.path().join("index.html"), "<html>").expect("write");
        std::fs::write(dir.path().join("css/site.css"), "body{}").expect("write");

        let files = collect_files(dir.path()).expect("collect");
        let rels: Vec<&str> = files.iter().map(|(_, rel)| rel.as_str()).collect();
        assert_eq!(rels, vec!["css/site.css", "index.html"]);
    }

    #[test]
    fn collect_files_empty_and_missing_folders() {
        let dir = TempDir::new().expect("tempdir");
        assert!(collect_files(dir.path()).expect("collect").is_empty());
        assert!(collect_files(&dir.path().join("absent"))
            .expect("collect")
            .is_empty());
    }

    #[test]
    fn base_url_trailing_slash_is_normalized() {
        let client = KuboClient::new("http://127.0.0.1:4737/");
        assert_eq!(client.base, "http://127.0.0.1:4737");
    }
}
