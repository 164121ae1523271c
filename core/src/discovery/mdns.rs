//! mDNS-SD listening.
//!
//! Sends one PTR query for the service type from an ephemeral socket and
//! collects the unicast answers until the listen window closes. The query is
//! repeated once halfway through the window.

use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use hubkit_common::discovery::{DiscoveryDetails, DiscoveryKind, DiscoveryResult, MdnsSdConfig};
use hubkit_protocols::dns::create_service_query;
use hubkit_protocols::mdns::{ServiceInstance, extract_instances};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use super::Strategy;

pub const MDNS_GROUP: SocketAddr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::new(224, 0, 0, 251), 5353));

const RECV_BUFFER: usize = 9_000;

pub struct MdnsSdListener {
    service_type: String,
    window: Duration,
    group: SocketAddr,
    socket: Option<UdpSocket>,
    query: Vec<u8>,
}

impl MdnsSdListener {
    pub fn new(config: &MdnsSdConfig, window: Duration) -> Self {
        Self {
            service_type: config.service_type(),
            window,
            group: MDNS_GROUP,
            socket: None,
            query: Vec::new(),
        }
    }

    /// Sends queries to `group` instead of the mDNS multicast group.
    pub fn with_group(mut self, group: SocketAddr) -> Self {
        self.group = group;
        self
    }

    fn to_result(instance: ServiceInstance, from: SocketAddr) -> DiscoveryResult {
        let address = instance
            .ips
            .iter()
            .find(|ip| ip.is_ipv4())
            .or_else(|| instance.ips.iter().next())
            .copied()
            .unwrap_or(from.ip());

        DiscoveryResult {
            id: String::new(),
            address: Some(address),
            last_seen: SystemTime::now(),
            details: DiscoveryDetails::MdnsSd {
                name: instance.name,
                fullname: instance.fullname,
                host: instance.host,
                port: instance.port,
                txt: instance.txt,
            },
        }
    }
}

#[async_trait]
impl Strategy for MdnsSdListener {
    fn kind(&self) -> DiscoveryKind {
        DiscoveryKind::MdnsSd
    }

    async fn bind(&mut self) -> io::Result<()> {
        let socket = UdpSocket::bind((IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0)).await?;
        self.query = create_service_query(&self.service_type, rand::random())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, format!("{e:#}")))?;
        socket.send_to(&self.query, self.group).await?;
        debug!(target: "hubkit::discovery::mdns", service = %self.service_type, "query sent");
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
        let requery = tokio::time::sleep(self.window / 2);
        tokio::pin!(requery);
        let mut requeried = false;

        loop {
            tokio::select! {
                received = socket.recv_from(&mut buffer) => {
                    let (len, from) = match received {
                        Ok(received) => received,
                        Err(e) => {
                            debug!(target: "hubkit::discovery::mdns", "receive failed: {e}");
                            continue;
                        }
                    };
                    let instances = match extract_instances(&buffer[..len], &self.service_type) {
                        Ok(instances) => instances,
                        Err(e) => {
                            trace!(target: "hubkit::discovery::mdns", %from, "ignoring packet: {e:#}");
                            continue;
                        }
                    };
                    for instance in instances {
                        if sink.send(Self::to_result(instance, from)).await.is_err() {
                            return;
                        }
                    }
                }

                _ = &mut requery, if !requeried => {
                    requeried = true;
                    if let Err(e) = socket.send_to(&self.query, self.group).await {
                        debug!(target: "hubkit::discovery::mdns", "repeat query failed: {e}");
                    }
                }

                _ = &mut deadline => break,
            }
        }
    }
}
