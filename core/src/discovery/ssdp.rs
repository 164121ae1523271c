//! SSDP listening.

use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use hubkit_common::discovery::{DiscoveryDetails, DiscoveryKind, DiscoveryResult, SsdpConfig};
use hubkit_protocols::ssdp::{SSDP_MULTICAST, SsdpResponse, create_msearch};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use super::Strategy;

const RECV_BUFFER: usize = 4_096;
const MAX_MX: u64 = 5;

pub struct SsdpListener {
    search: String,
    window: Duration,
    group: SocketAddr,
    socket: Option<UdpSocket>,
}

impl SsdpListener {
    pub fn new(config: &SsdpConfig, window: Duration) -> Self {
        Self {
            search: config.search.clone(),
            window,
            group: SocketAddr::V4(SSDP_MULTICAST),
            socket: None,
        }
    }

    pub fn with_group(mut self, group: SocketAddr) -> Self {
        self.group = group;
        self
    }

    /// Devices spread their answers over `MX` seconds; keep it inside the window.
    fn mx(&self) -> u8 {
        self.window.as_secs().clamp(1, MAX_MX) as u8
    }

    fn to_result(response: SsdpResponse, from: SocketAddr) -> DiscoveryResult {
        DiscoveryResult {
            id: String::new(),
            address: Some(from.ip()),
            last_seen: SystemTime::now(),
            details: DiscoveryDetails::Ssdp {
                location: response.location().map(str::to_string),
                usn: response.usn().map(str::to_string),
                port: response.location_port(),
                headers: response.headers,
            },
        }
    }
}

#[async_trait]
impl Strategy for SsdpListener {
    fn kind(&self) -> DiscoveryKind {
        DiscoveryKind::Ssdp
    }

    async fn bind(&mut self) -> io::Result<()> {
        let socket = UdpSocket::bind((IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0)).await?;
        socket.send_to(&create_msearch(&self.search, self.mx()), self.group).await?;
        debug!(target: "hubkit::discovery::ssdp", search = %self.search, "M-SEARCH sent");
        self.socket = Some(socket);
        Ok(())
    }

    async fn sweep(&mut self, sink: mpsc::Sender<DiscoveryResult>) {
        let Some(socket) = self.socket.take() else {
            return;
        };
        let mut buffer = vec![0u8; RECV_BUFFER];

        let deadline = tokio::time::sleep(self.window);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                received = socket.recv_from(&mut buffer) => {
                    let (len, from) = match received {
                        Ok(received) => received,
                        Err(e) => {
                            debug!(target: "hubkit::discovery::ssdp", "receive failed: {e}");
                            continue;
                        }
                    };
                    let response = match SsdpResponse::parse(&buffer[..len]) {
                        Ok(response) => response,
                        Err(e) => {
                            trace!(target: "hubkit::discovery::ssdp", %from, "ignoring datagram: {e}");
                            continue;
                        }
                    };
                    if !response.matches(&self.search) {
                        continue;
                    }
                    if sink.send(Self::to_result(response, from)).await.is_err() {
                        return;
                    }
                }

                _ = &mut deadline => break,
            }
        }
    }
}
