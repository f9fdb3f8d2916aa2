//! YAML configuration for the `manypress` binary.
//!
//! Every field has a default, so a missing config file means "run with
//! defaults"; a present file only needs the keys it wants to override.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Root for all persisted state: site records, manifests, keys.
    pub data_dir: PathBuf,
    /// Public gateway domain used in browser-facing URLs.
    pub gateway_domain: String,
    /// Per-backend publish timeout in seconds.
    pub sync_timeout_secs: u64,
    pub dns: DnsConfig,
    pub ipfs: IpfsConfig,
    pub hyper: HyperConfig,
    pub bittorrent: BitTorrentConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DnsConfig {
    /// Bind address for the UDP+TCP responder.
    pub listen: SocketAddr,
    /// This service's own hostname, answered in NS records.
    pub host: String,
    pub ttl: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IpfsConfig {
    /// `builtin` spawns and owns a Kubo daemon; `remote` connects to one.
    pub provider: IpfsProviderConfig,
    /// Kubo RPC endpoint, used when `provider: remote`.
    pub rpc_url: String,
    /// `ipfs` binary path, used when `provider: builtin`.
    pub binary: PathBuf,
    /// RPC port for the managed daemon, used when `provider: builtin`.
    pub api_port: u16,
    /// Virtual MFS root under which every site gets its own subtree.
    pub mfs_root: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IpfsProviderConfig {
    Builtin,
    Remote,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HyperConfig {
    /// Control endpoint of the hyper gateway daemon.
    pub gateway_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BitTorrentConfig {
    /// Control endpoint of the torrent seeder daemon.
    pub seeder_url: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            gateway_domain: "localhost".into(),
            sync_timeout_secs: 300,
            dns: DnsConfig::default(),
            ipfs: IpfsConfig::default(),
            hyper: HyperConfig::default(),
            bittorrent: BitTorrentConfig::default(),
        }
    }
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:5353".parse().expect("static address"),
            host: "localhost".into(),
            ttl: manypress_dns::DEFAULT_TTL,
        }
    }
}

impl Default for IpfsConfig {
    fn default() -> Self {
        Self {
            provider: IpfsProviderConfig::Builtin,
            rpc_url: "http://127.0.0.1:5001".into(),
            binary: PathBuf::from("ipfs"),
            api_port: 4737,
            mfs_root: "/manypress".into(),
        }
    }
}

impl Default for HyperConfig {
    fn default() -> Self {
        Self {
            gateway_url: "http://127.0.0.1:4973".into(),
        }
    }
}

impl Default for BitTorrentConfig {
    fn default() -> Self {
        Self {
            seeder_url: "http://127.0.0.1:4838".into(),
        }
    }
}

/// `~/.manypress`, falling back to a relative directory when the home
/// directory cannot be determined.
pub fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".manypress"))
        .unwrap_or_else(|| PathBuf::from(".manypress"))
}

pub fn default_config_path() -> PathBuf {
    default_data_dir().join("config.yml")
}

impl Config {
    /// Load from `path` if given, otherwise from the default location.
    /// A missing file yields the defaults.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config at {}", path.display()))?;
        serde_yaml::from_str(&contents)
            .with_context(|| format!("parsing config at {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = TempDir::new().expect("tempdir");
        let config = Config::load(Some(&dir.path().join("absent.yml"))).expect("load");
        assert_eq!(config.sync_timeout_secs, 300);
        assert_eq!(config.ipfs.mfs_root, "/manypress");
    }

    #[test]
    fn partial_file_overrides_only_named_keys() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("config.yml");
        std::fs::write(
            &path,
            "gateway_domain: gateway.example.com\nipfs:\n  provider: remote\n",
        )
        .expect("write");

        let config = Config::load(Some(&path)).expect("load");
        assert_eq!(config.gateway_domain, "gateway.example.com");
        assert_eq!(config.ipfs.provider, IpfsProviderConfig::Remote);
        assert_eq!(config.dns.ttl, manypress_dns::DEFAULT_TTL);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("config.yml");
        std::fs::write(&path, "gatway_domain: typo.example.com\n").expect("write");
        assert!(Config::load(Some(&path)).is_err());
    }
}
