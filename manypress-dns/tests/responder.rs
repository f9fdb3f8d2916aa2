//! Responder behavior against an in-memory site lookup.

use std::collections::HashMap;
use std::str::FromStr;

use async_trait::async_trait;
use hickory_proto::op::{Message, MessageType, OpCode, Query, ResponseCode};
use hickory_proto::rr::{Name, RData, RecordType};

use manypress_core::types::{HyperLink, IpfsLink, Links};
use manypress_dns::{DnsResponder, SiteLookup};

struct MapLookup(HashMap<String, Links>);

#[async_trait]
impl SiteLookup for MapLookup {
    async fn lookup(&self, domain: &str) -> Option<Links> {
        self.0.get(domain).cloned()
    }
}

fn ipfs_hyper_links() -> Links {
    Links {
        http: None,
        ipfs: Some(IpfsLink {
            enabled: true,
            link: "ipfs://bafytest/".into(),
            gateway: "https://k51test.ipns.gateway.test/".into(),
            cid: "bafytest".into(),
            pub_key: "ipns://k51test/".into(),
            dnslink: "/ipns/k51test/".into(),
        }),
        hyper: Some(HyperLink {
            enabled: true,
            link: "hyper://example.com".into(),
            gateway: "https://example-com.hyper.gateway.test/".into(),
            raw: "hyper://deadbeef".into(),
            dnslink: "/hyper/deadbeef".into(),
        }),
        bittorrent: None,
    }
}

fn responder(sites: &[(&str, Links)]) -> DnsResponder<MapLookup> {
    let map = sites
        .iter()
        .map(|(domain, links)| (domain.to_string(), links.clone()))
        .collect();
    DnsResponder::new(
        MapLookup(map),
        Name::from_str("dns.manypress.test.").expect("host name"),
    )
}

fn txt_query(name: &str) -> Message {
    let mut request = Message::new();
    request
        .set_id(42)
        .set_message_type(MessageType::Query)
        .set_op_code(OpCode::Query)
        .set_recursion_desired(true);
    request.add_query(Query::query(
        Name::from_str(name).expect("query name"),
        RecordType::TXT,
    ));
    request
}

fn txt_values(response: &Message) -> Vec<String> {
    response
        .answers()
        .iter()
        .filter_map(|record| match record.data() {
            Some(RData::TXT(txt)) => Some(
                txt.txt_data()
                    .iter()
                    .map(|part| String::from_utf8_lossy(part))
                    .collect::<String>(),
            ),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn known_site_gets_one_txt_per_dnslink_plus_one_ns() {
    let responder = responder(&[("example.com", ipfs_hyper_links())]);
    let response = responder.respond(&txt_query("_dnslink.example.com.")).await;

    assert_eq!(response.response_code(), ResponseCode::NoError);
    assert_eq!(response.id(), 42);

    let txts = txt_values(&response);
    assert_eq!(txts.len(), 2);
    assert!(txts.iter().any(|t| t == "dnslink=/ipns/k51test/"));
    assert!(txts.iter().any(|t| t == "dnslink=/hyper/deadbeef"));

    // Every answer is a TXT; authority holds exactly one NS.
    assert_eq!(response.answers().len(), 2);
    assert_eq!(response.name_servers().len(), 1);
    assert!(matches!(
        response.name_servers()[0].data(),
        Some(RData::NS(_))
    ));
    assert!(response.additionals().is_empty());
}

#[tokio::test]
async fn unknown_domain_gets_authority_but_no_data() {
    let responder = responder(&[]);
    let response = responder.respond(&txt_query("_dnslink.unknown.test.")).await;

    assert_eq!(
        response.response_code(),
        ResponseCode::NoError,
        "lookup misses are no-data, never an error"
    );
    assert!(response.answers().is_empty());
    assert_eq!(response.name_servers().len(), 1);
}

#[tokio::test]
async fn dnslink_label_matches_case_insensitively() {
    let responder = responder(&[("example.com", ipfs_hyper_links())]);
    let response = responder.respond(&txt_query("_DNSLINK.example.com.")).await;
    assert_eq!(txt_values(&response).len(), 2);
}

#[tokio::test]
async fn txt_query_without_dnslink_label_gets_no_data() {
    let responder = responder(&[("example.com", ipfs_hyper_links())]);
    let response = responder.respond(&txt_query("example.com.")).await;
    assert!(response.answers().is_empty());
    assert_eq!(response.name_servers().len(), 1);
}

#[tokio::test]
async fn multibyte_query_names_get_no_data_instead_of_a_crash() {
    let responder = responder(&[("example.com", ipfs_hyper_links())]);
    // '€' straddles the byte offset where the `_dnslink.` label would end.
    let response = responder
        .respond(&txt_query("abcdefgh€.example.com."))
        .await;

    assert_eq!(response.response_code(), ResponseCode::NoError);
    assert!(response.answers().is_empty());
    assert_eq!(response.name_servers().len(), 1);
}

#[tokio::test]
async fn non_txt_queries_get_authority_only() {
    let responder = responder(&[("example.com", ipfs_hyper_links())]);

    let mut request = Message::new();
    request
        .set_id(7)
        .set_message_type(MessageType::Query)
        .set_op_code(OpCode::Query);
    request.add_query(Query::query(
        Name::from_str("_dnslink.example.com.").expect("name"),
        RecordType::A,
    ));

    let response = responder.respond(&request).await;
    assert!(response.answers().is_empty());
    assert_eq!(response.name_servers().len(), 1);
}

#[tokio::test]
async fn wire_roundtrip_preserves_the_response() {
    let responder = responder(&[("example.com", ipfs_hyper_links())]);
    let request = txt_query("_dnslink.example.com.");
    let bytes = responder
        .respond_bytes(&request.to_vec().expect("encode"))
        .await
        .expect("respond");

    let decoded = Message::from_vec(&bytes).expect("decode");
    assert_eq!(decoded.id(), 42);
    assert_eq!(txt_values(&decoded).len(), 2);
}
