//! Pure DNS query handling: one request message in, one response out.
//!
//! For a `TXT` query on `_dnslink.<domain>` the responder looks the domain
//! up, emits one `TXT` answer per protocol link that carries a `dnslink`
//! value, and always attaches one authoritative `NS` record naming this
//! service's own host. Lookup failures are logged and answered as "no
//! data" — the responder never returns a hard error to a DNS client.

use async_trait::async_trait;
use hickory_proto::op::{Message, MessageType, OpCode, ResponseCode};
use hickory_proto::rr::rdata::{NS, TXT};
use hickory_proto::rr::{Name, RData, Record, RecordType};

use manypress_core::types::Links;

use crate::error::DnsError;

/// Fixed TTL for every answer. Link records change on every sync, so
/// cached answers go stale quickly; 60s keeps resolvers close behind.
pub const DEFAULT_TTL: u32 = 60;

const DNSLINK_LABEL: &str = "_dnslink.";

/// Resolves a domain to its persisted link record.
#[async_trait]
pub trait SiteLookup: Send + Sync {
    /// `None` for unknown domains and for lookup failures (log those).
    async fn lookup(&self, domain: &str) -> Option<Links>;
}

pub struct DnsResponder<L> {
    lookup: L,
    /// This service's own hostname, used in the `NS` authority record.
    host: Name,
    ttl: u32,
}

impl<L: SiteLookup> DnsResponder<L> {
    pub fn new(lookup: L, host: Name) -> Self {
        Self {
            lookup,
            host,
            ttl: DEFAULT_TTL,
        }
    }

    pub fn with_ttl(mut self, ttl: u32) -> Self {
        self.ttl = ttl;
        self
    }

    /// Decode a wire-format request, respond, re-encode.
    pub async fn respond_bytes(&self, request: &[u8]) -> Result<Vec<u8>, DnsError> {
        let request = Message::from_vec(request)?;
        let response = self.respond(&request).await;
        Ok(response.to_vec()?)
    }

    /// Build the response for a parsed request.
    pub async fn respond(&self, request: &Message) -> Message {
        let mut response = Message::new();
        response
            .set_id(request.id())
            .set_message_type(MessageType::Response)
            .set_op_code(OpCode::Query)
            .set_authoritative(true)
            .set_recursion_desired(request.recursion_desired())
            .set_response_code(ResponseCode::NoError);

        for query in request.queries() {
            tracing::debug!(name = %query.name(), query_type = %query.query_type(), "dns query");
            response.add_query(query.clone());

            let name = query.name().clone();
            if query.query_type() == RecordType::TXT {
                for value in self.dnslink_values(&name).await {
                    response.add_answer(Record::from_rdata(
                        name.clone(),
                        self.ttl,
                        RData::TXT(TXT::new(vec![format!("dnslink={value}")])),
                    ));
                }
            }

            // Authority over the queried zone, data or not.
            response.add_name_server(Record::from_rdata(
                name,
                self.ttl,
                RData::NS(NS(self.host.clone())),
            ));
        }

        response
    }

    async fn dnslink_values(&self, name: &Name) -> Vec<String> {
        let queried = name.to_utf8();
        let Some(domain) = strip_dnslink(&queried) else {
            tracing::debug!(name = %queried, "TXT query without _dnslink label");
            return Vec::new();
        };

        match self.lookup.lookup(domain).await {
            Some(links) => {
                let values: Vec<String> =
                    links.dnslinks().into_iter().map(str::to_owned).collect();
                tracing::debug!(domain, answers = values.len(), "dnslink lookup hit");
                values
            }
            None => {
                tracing::debug!(domain, "dnslink lookup miss");
                Vec::new()
            }
        }
    }
}

/// Strip a leading `_dnslink.` label (case-insensitively) and any trailing
/// root dot. `None` when the label is absent. Queried names may carry
/// multibyte UTF-8 labels, so the prefix check must stay on char
/// boundaries.
fn strip_dnslink(name: &str) -> Option<&str> {
    let prefix = name.get(..DNSLINK_LABEL.len())?;
    if !prefix.eq_ignore_ascii_case(DNSLINK_LABEL) {
        return None;
    }
    Some(name[DNSLINK_LABEL.len()..].trim_end_matches('.'))
}
