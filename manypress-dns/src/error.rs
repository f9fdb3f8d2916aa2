#[derive(Debug, thiserror::Error)]
pub enum DnsError {
    #[error("socket error on {addr}: {source}")]
    Socket {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("DNS wire format error: {0}")]
    Proto(#[from] hickory_proto::error::ProtoError),
}

pub(crate) fn socket_err(addr: impl std::fmt::Display, source: std::io::Error) -> DnsError {
    DnsError::Socket {
        addr: addr.to_string(),
        source,
    }
}
