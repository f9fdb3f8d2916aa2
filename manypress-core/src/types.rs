//! Domain types for sites and their per-protocol link records.
//!
//! Protocol selection is a fixed struct of four booleans ([`ProtocolFlags`])
//! dispatched through [`ProtocolKind`] — never a string-keyed map.

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// A strongly-typed site identifier. Equals the site's domain and is
/// immutable once created: it is the lookup key in the store, in every
/// protocol backend's identity material, and in the DNS responder.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SiteId(pub String);

impl SiteId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SiteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for SiteId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SiteId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// The four transports a site can be published over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolKind {
    Http,
    Ipfs,
    Hyper,
    Bittorrent,
}

impl ProtocolKind {
    /// All variants, in the order backends are fanned out.
    pub fn all() -> [ProtocolKind; 4] {
        [
            ProtocolKind::Http,
            ProtocolKind::Ipfs,
            ProtocolKind::Hyper,
            ProtocolKind::Bittorrent,
        ]
    }
}

impl fmt::Display for ProtocolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolKind::Http => write!(f, "http"),
            ProtocolKind::Ipfs => write!(f, "ipfs"),
            ProtocolKind::Hyper => write!(f, "hyper"),
            ProtocolKind::Bittorrent => write!(f, "bittorrent"),
        }
    }
}

/// Which protocols a site wants published.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ProtocolFlags {
    #[serde(default)]
    pub http: bool,
    #[serde(default)]
    pub ipfs: bool,
    #[serde(default)]
    pub hyper: bool,
    #[serde(default)]
    pub bittorrent: bool,
}

impl ProtocolFlags {
    pub fn enabled(&self, kind: ProtocolKind) -> bool {
        match kind {
            ProtocolKind::Http => self.http,
            ProtocolKind::Ipfs => self.ipfs,
            ProtocolKind::Hyper => self.hyper,
            ProtocolKind::Bittorrent => self.bittorrent,
        }
    }
}

// ---------------------------------------------------------------------------
// Link records — one shape per backend
// ---------------------------------------------------------------------------

/// Canonical HTTPS address. No gateway, no dnslink: plain HTTP needs neither.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpLink {
    pub enabled: bool,
    pub link: String,
}

/// IPFS publication metadata. `pub_key` is the site's permanent IPNS
/// address; only `cid` changes across re-publishes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpfsLink {
    pub enabled: bool,
    pub link: String,
    pub gateway: String,
    pub cid: String,
    pub pub_key: String,
    pub dnslink: String,
}

/// Hyper drive metadata. `raw` is the drive's stable key-addressed URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HyperLink {
    pub enabled: bool,
    pub link: String,
    pub gateway: String,
    pub raw: String,
    pub dnslink: String,
}

/// BitTorrent publication metadata. `pub_key` is a `bittorrent://` URI for
/// the BEP46 mutable address; `info_hash` is a `bittorrent://` URI for the
/// current torrent and changes on every re-publish.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BitTorrentLink {
    pub enabled: bool,
    pub link: String,
    pub gateway: String,
    pub info_hash: String,
    pub pub_key: String,
    pub magnet: String,
    pub dnslink: String,
}

/// Per-protocol link records. A field is `Some` if and only if that protocol
/// has been successfully synced at least once and not since unsynced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Links {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http: Option<HttpLink>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ipfs: Option<IpfsLink>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hyper: Option<HyperLink>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bittorrent: Option<BitTorrentLink>,
}

impl Links {
    /// `dnslink=` TXT values in protocol order, for records that carry one.
    pub fn dnslinks(&self) -> Vec<&str> {
        let mut out = Vec::new();
        if let Some(ipfs) = &self.ipfs {
            out.push(ipfs.dnslink.as_str());
        }
        if let Some(hyper) = &self.hyper {
            out.push(hyper.dnslink.as_str());
        }
        if let Some(bt) = &self.bittorrent {
            out.push(bt.dnslink.as_str());
        }
        out
    }

    /// Which protocols currently hold live published state.
    pub fn present(&self) -> Vec<ProtocolKind> {
        let mut out = Vec::new();
        if self.http.is_some() {
            out.push(ProtocolKind::Http);
        }
        if self.ipfs.is_some() {
            out.push(ProtocolKind::Ipfs);
        }
        if self.hyper.is_some() {
            out.push(ProtocolKind::Hyper);
        }
        if self.bittorrent.is_some() {
            out.push(ProtocolKind::Bittorrent);
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Domain structs
// ---------------------------------------------------------------------------

/// A published site. `links` is a cache of "last successful publish", not a
/// liveness guarantee — peers may evict data between syncs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Site {
    pub id: SiteId,
    pub domain: String,
    #[serde(default)]
    pub public: bool,
    pub protocols: ProtocolFlags,
    #[serde(default)]
    pub links: Links,
}

/// Candidate for site creation. `public` defaults to false when absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSite {
    pub domain: String,
    pub protocols: ProtocolFlags,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public: Option<bool>,
}

/// Partial site update: only protocol flags and visibility are mutable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct UpdateSite {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocols: Option<ProtocolFlags>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public: Option<bool>,
}

/// Lightweight per-protocol liveness probe result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ProtocolStats {
    pub peer_count: u64,
}

/// Aggregated stats for the protocols that have a peer concept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SiteStats {
    pub ipfs: ProtocolStats,
    pub hyper: ProtocolStats,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn site_id_display_and_equality() {
        assert_eq!(SiteId::from("example.com").to_string(), "example.com");
        assert_eq!(
            SiteId::from("x.com"),
            SiteId::from(String::from("x.com"))
        );
    }

    #[test]
    fn protocol_kind_display() {
        assert_eq!(ProtocolKind::Bittorrent.to_string(), "bittorrent");
        assert_eq!(ProtocolKind::Hyper.to_string(), "hyper");
    }

    #[test]
    fn links_dnslinks_skip_http_and_absent_protocols() {
        let links = Links {
            http: Some(HttpLink {
                enabled: true,
                link: "https://example.com".into(),
            }),
            ipfs: Some(IpfsLink {
                enabled: true,
                link: "ipns://example.com/".into(),
                gateway: "https://k51...ipns.gateway.test/".into(),
                cid: "bafy...".into(),
                pub_key: "ipns://k51.../".into(),
                dnslink: "/ipns/k51.../".into(),
            }),
            hyper: None,
            bittorrent: None,
        };
        assert_eq!(links.dnslinks(), vec!["/ipns/k51.../"]);
        assert_eq!(links.present(), vec![ProtocolKind::Http, ProtocolKind::Ipfs]);
    }

    #[test]
    fn site_serde_roundtrip_omits_empty_links() {
        let site = Site {
            id: SiteId::from("example.com"),
            domain: "example.com".into(),
            public: false,
            protocols: ProtocolFlags {
                http: true,
                ..Default::default()
            },
            links: Links::default(),
        };
        let json = serde_json::to_string(&site).expect("serialize");
        // The flags object always carries every protocol; only the links
        // object drops absent entries.
        let value: serde_json::Value = serde_json::from_str(&json).expect("parse");
        let links = value["links"].as_object().expect("links object");
        assert!(links.is_empty(), "absent links must be omitted: {links:?}");
        let back: Site = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, site);
    }

    #[test]
    fn protocol_flags_enabled_lookup() {
        let flags = ProtocolFlags {
            http: false,
            ipfs: true,
            hyper: true,
            bittorrent: false,
        };
        assert!(!flags.enabled(ProtocolKind::Http));
        assert!(flags.enabled(ProtocolKind::Ipfs));
        assert!(flags.enabled(ProtocolKind::Hyper));
        assert!(!flags.enabled(ProtocolKind::Bittorrent));
    }
}
