use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::trace;

/// Decides whether an address answers at all.
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, addr: IpAddr, ports: &[u16], limit: Duration) -> bool;
}

/// Bounded TCP connect probe.
///
/// A completed handshake and an actively refused connection both prove the
/// host is up. Only silence until the deadline counts as absent.
pub struct HandshakeProber;

#[async_trait]
impl Prober for HandshakeProber {
    async fn probe(&self, addr: IpAddr, ports: &[u16], limit: Duration) -> bool {
        for port in ports {
            if handshake_probe(SocketAddr::new(addr, *port), limit).await {
                return true;
            }
        }
        false
    }
}

pub async fn handshake_probe(socket_addr: SocketAddr, limit: Duration) -> bool {
    match timeout(limit, TcpStream::connect(socket_addr)).await {
        Ok(Ok(_)) => true,
        Ok(Err(e)) => {
            trace!(target: "hubkit::probe", %socket_addr, "connect failed: {e}");
            e.kind() == std::io::ErrorKind::ConnectionRefused
        }
        Err(_elapsed) => false,
    }
}
