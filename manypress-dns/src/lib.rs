//! # manypress-dns
//!
//! Answers `TXT` queries for `_dnslink.<domain>` from persisted link
//! records, so resolvers and gateways can discover where a site's content
//! lives on each network:
//! - [`responder`] — pure query-to-response logic ([`DnsResponder`])
//! - [`server`] — UDP + TCP listeners ([`DnsServer`])
//! - [`error`] — [`DnsError`]

pub mod error;
pub mod responder;
pub mod server;

pub use error::DnsError;
pub use responder::{DnsResponder, SiteLookup, DEFAULT_TTL};
pub use server::DnsServer;
