use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tracing::{debug, warn};

use crate::protocol::error::{Result, RpcError};

/// Largest payload carried in one datagram, and the receive buffer size.
pub const MAX_DATAGRAM_SIZE: usize = 1024;

/// UDP transport wrapper for dgramrpc.
///
/// Wraps a single tokio `UdpSocket` behind an `Arc` so the receive loop and
/// any number of concurrent senders can share it. Every send is one
/// `send_to` call carrying one complete encoded envelope, so concurrent
/// senders never interleave bytes.
///
/// # Example
///
/// ```no_run
/// use dgramrpc_common::transport::UdpTransport;
///
/// # async fn demo() -> dgramrpc_common::Result<()> {
/// let transport = UdpTransport::bind("127.0.0.1:0").await?;
/// let peer = "127.0.0.1:5000".parse().unwrap();
/// transport.send_to(br#"{"request_id":"1","method":"get_time"}"#, peer).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct UdpTransport {
    socket: Arc<UdpSocket>,
}

impl UdpTransport {
    /// Binds a socket to the given address (e.g. "0.0.0.0:5000", or port 0
    /// for an ephemeral port).
    pub async fn bind(addr: &str) -> Result<Self> {
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|e| RpcError::Transport(format!("Failed to bind to {}: {}", addr, e)))?;

        debug!("UDP socket bound to {}", addr);
        Ok(Self {
            socket: Arc::new(socket),
        })
    }

    /// Binds an ephemeral socket of the same address family as `peer`.
    pub async fn bind_for(peer: SocketAddr) -> Result<Self> {
        let local = if peer.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
        Self::bind(local).await
    }

    /// Gets the actual bound address.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.socket
            .local_addr()
            .map_err(|e| RpcError::Transport(format!("Failed to get local addr: {}", e)))
    }

    /// Sends one datagram.
    ///
    /// # Errors
    ///
    /// Refuses payloads larger than [`MAX_DATAGRAM_SIZE`], and reports socket
    /// errors and short writes as `Transport`.
    pub async fn send_to(&self, payload: &[u8], target: SocketAddr) -> Result<()> {
        if payload.len() > MAX_DATAGRAM_SIZE {
            warn!(
                "Refusing {} byte datagram to {} (max {} bytes)",
                payload.len(),
                target,
                MAX_DATAGRAM_SIZE
            );
            return Err(RpcError::Transport(format!(
                "message too large: {} bytes (max {} bytes)",
                payload.len(),
                MAX_DATAGRAM_SIZE
            )));
        }

        let sent = self
            .socket
            .send_to(payload, target)
            .await
            .map_err(|e| {
                debug!("send_to {} failed: {}", target, e);
                RpcError::Transport(format!("Failed to send to {}: {}", target, e))
            })?;

        if sent != payload.len() {
            return Err(RpcError::Transport(format!(
                "short send to {}: {} of {} bytes",
                target,
                sent,
                payload.len()
            )));
        }

        Ok(())
    }

    /// Receives one datagram into `buf`, returning its length and sender.
    pub async fn recv_from(&self, buf: &mut [u8]) -> Result<(usize, SocketAddr)> {
        self.socket
            .recv_from(buf)
            .await
            .map_err(|e| {
                debug!("recv_from failed: {}", e);
                RpcError::Transport(format!("Failed to receive: {}", e))
            })
    }
}

/// Resolves "host:port" to the first matching socket address.
pub async fn resolve(addr: &str) -> Result<SocketAddr> {
    if let Ok(parsed) = addr.parse::<SocketAddr>() {
        return Ok(parsed);
    }

    tokio::net::lookup_host(addr)
        .await
        .map_err(|e| RpcError::InvalidAddress(format!("'{}': {}", addr, e)))?
        .next()
        .ok_or_else(|| RpcError::InvalidAddress(format!("'{}' resolved to no addresses", addr)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_udp_transport_bind_ephemeral() {
        let transport = UdpTransport::bind("127.0.0.1:0").await.unwrap();
        assert_ne!(transport.local_addr().unwrap().port(), 0);
    }

    #[tokio::test]
    async fn test_oversized_payload_is_refused() {
        let transport = UdpTransport::bind("127.0.0.1:0").await.unwrap();
        let target = transport.local_addr().unwrap();
        let payload = vec![b'x'; MAX_DATAGRAM_SIZE + 1];

        let err = transport.send_to(&payload, target).await.unwrap_err();
        assert!(matches!(err, RpcError::Transport(m) if m.contains("too large")));
    }

    #[tokio::test]
    async fn test_resolve_rejects_garbage() {
        assert!(resolve("not an address").await.is_err());
        assert_eq!(
            resolve("127.0.0.1:5000").await.unwrap(),
            "127.0.0.1:5000".parse::<SocketAddr>().unwrap()
        );
    }
}
