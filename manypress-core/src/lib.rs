//! # manypress-core
//!
//! Domain types and persistence shared by every manypress crate:
//! - [`types`] — newtypes and domain structs (sites, protocol flags, links)
//! - [`hostname`] — bare-hostname validation for site ids
//! - [`store`] — flat-file JSON collection store (get / put / del / keys)
//! - [`error`] — [`StoreError`]

pub mod error;
pub mod hostname;
pub mod store;
pub mod types;

pub use error::StoreError;
pub use store::Collection;
pub use types::{
    BitTorrentLink, HttpLink, HyperLink, IpfsLink, Links, NewSite, ProtocolFlags, ProtocolKind,
    ProtocolStats, Site, SiteId, SiteStats, UpdateSite,
};
