//! # manypress-protocols
//!
//! The protocol abstraction and the four backends that fan one site's
//! static content out to independent transports:
//!
//! - [`traits`] — the [`Protocol`] capability contract
//! - [`http`] — stateless canonical-URL backend
//! - [`ipfs`] — Kubo-backed content-addressed publishing under an IPNS key
//! - [`hyper`] — mutable-drive mirroring through a hyper gateway daemon
//! - [`bittorrent`] — BEP44/46 mutable torrents through a seeding daemon
//! - [`manager`] — [`ProtocolManager`], concurrent load/unload of all four
//!
//! Support modules: [`kubo`] (Kubo RPC client), [`mirror`] (manifest-based
//! folder diffing), [`torrent`] (bencode, metainfo, infohashes, BEP44
//! signing).

pub mod bittorrent;
pub mod error;
pub mod http;
pub mod hyper;
pub mod ipfs;
pub mod kubo;
pub mod manager;
pub mod mirror;
pub mod torrent;
pub mod traits;

pub use bittorrent::{BitTorrentOptions, BitTorrentProtocol};
pub use error::ProtocolError;
pub use http::HttpProtocol;
pub use hyper::{HyperOptions, HyperProtocol};
pub use ipfs::{IpfsOptions, IpfsProtocol, IpfsProvider};
pub use manager::ProtocolManager;
pub use traits::Protocol;
