//! UDP and TCP DNS listeners.
//!
//! Both transports share one [`DnsResponder`]. UDP handles one datagram per
//! request; TCP uses the standard 2-byte big-endian length framing and
//! serves frames until the peer closes. Malformed packets are logged and
//! dropped — a bad client must not take the listener down.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::sync::broadcast;

use crate::error::{socket_err, DnsError};
use crate::responder::{DnsResponder, SiteLookup};

const MAX_UDP_PACKET: usize = 4096;

pub struct DnsServer<L: SiteLookup + 'static> {
    responder: Arc<DnsResponder<L>>,
}

impl<L: SiteLookup + 'static> DnsServer<L> {
    pub fn new(responder: DnsResponder<L>) -> Self {
        Self {
            responder: Arc::new(responder),
        }
    }

    /// Bind both transports on `addr` and serve until a shutdown signal
    /// arrives on `shutdown`.
    pub async fn run(
        &self,
        addr: SocketAddr,
        shutdown: broadcast::Sender<()>,
    ) -> Result<(), DnsError> {
        let udp = UdpSocket::bind(addr).await.map_err(|e| socket_err(addr, e))?;
        let tcp = TcpListener::bind(addr).await.map_err(|e| socket_err(addr, e))?;
        tracing::info!(%addr, "DNS responder listening (udp + tcp)");

        let udp_handle = {
            let responder = self.responder.clone();
            let shutdown = shutdown.subscribe();
            tokio::spawn(udp_task(udp, responder, shutdown))
        };
        let tcp_handle = {
            let responder = self.responder.clone();
            let shutdown = shutdown.subscribe();
            tokio::spawn(tcp_task(tcp, responder, shutdown))
        };

        let (udp_result, tcp_result) = tokio::join!(udp_handle, tcp_handle);
        for result in [udp_result, tcp_result] {
            match result {
                Ok(inner) => inner?,
                Err(join_err) => {
                    tracing::error!(error = %join_err, "DNS listener task panicked");
                }
            }
        }
        Ok(())
    }
}

async fn udp_task<L: SiteLookup>(
    socket: UdpSocket,
    responder: Arc<DnsResponder<L>>,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<(), DnsError> {
    let mut buf = [0u8; MAX_UDP_PACKET];
    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                tracing::debug!("udp listener shutting down");
                return Ok(());
            }
            received = socket.recv_from(&mut buf) => {
                let (len, peer) = match received {
                    Ok(pair) => pair,
                    Err(err) => {
                        tracing::warn!(error = %err, "udp recv failed");
                        continue;
                    }
                };
                tracing::debug!(%peer, bytes = len, "udp query received");
                match responder.respond_bytes(&buf[..len]).await {
                    Ok(response) => {
                        if let Err(err) = socket.send_to(&response, peer).await {
                            tracing::warn!(%peer, error = %err, "udp send failed");
                        }
                    }
                    Err(err) => {
                        tracing::warn!(%peer, error = %err, "dropping malformed udp query");
                    }
                }
            }
        }
    }
}

async fn tcp_task<L: SiteLookup + 'static>(
    listener: TcpListener,
    responder: Arc<DnsResponder<L>>,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<(), DnsError> {
    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                tracing::debug!("tcp listener shutting down");
                return Ok(());
            }
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(pair) => pair,
                    Err(err) => {
                        tracing::warn!(error = %err, "tcp accept failed");
                        continue;
                    }
                };
                let responder = responder.clone();
                tokio::spawn(async move {
                    if let Err(err) = serve_tcp_connection(stream, responder).await {
                        tracing::debug!(%peer, error = %err, "tcp connection closed with error");
                    }
                });
            }
        }
    }
}

/// Serve length-prefixed frames until the peer closes the connection.
async fn serve_tcp_connection<L: SiteLookup>(
    mut stream: TcpStream,
    responder: Arc<DnsResponder<L>>,
) -> Result<(), DnsError> {
    loop {
        let len = match stream.read_u16().await {
            Ok(len) => len as usize,
            // Clean EOF between frames.
            Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(()),
            Err(err) => return Err(socket_err("tcp", err)),
        };

        let mut request = vec![0u8; len];
        stream
            .read_exact(&mut request)
            .await
            .map_err(|e| socket_err("tcp", e))?;

        let response = responder.respond_bytes(&request).await?;
        let Some(frame_len) = frame_len(&response) else {
            tracing::warn!(bytes = response.len(), "dropping response too large for tcp framing");
            continue;
        };
        stream
            .write_u16(frame_len)
            .await
            .map_err(|e| socket_err("tcp", e))?;
        stream
            .write_all(&response)
            .await
            .map_err(|e| socket_err("tcp", e))?;
    }
}

/// The TCP transport prefixes each message with a 16-bit length; anything
/// longer cannot be framed and must be dropped, not truncated.
fn frame_len(response: &[u8]) -> Option<u16> {
    u16::try_from(response.len()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oversized_responses_do_not_fit_a_tcp_frame() {
        assert_eq!(frame_len(&[0u8; 512]), Some(512));
        assert_eq!(frame_len(&vec![0u8; usize::from(u16::MAX)]), Some(u16::MAX));
        assert_eq!(frame_len(&vec![0u8; usize::from(u16::MAX) + 1]), None);
    }
}
