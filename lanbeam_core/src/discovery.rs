//! LAN discovery over UDP broadcast.
//!
//! A sender broadcasts one probe and listens on the same socket for a fixed
//! window. Any datagram that comes back marks its source address as a
//! receiver. Nothing found, no interfaces, or no broadcast permission all
//! yield an empty result rather than an error.
//!
//! `discover_one` returns as soon as the first reply arrives.
//! `discover_all` always waits out the whole window.

use crate::config::{DiscoveryConfig, local_name};
use crate::DiscoveryMsg;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use tokio::net::UdpSocket;
use tokio::time::{Instant, timeout_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Well-known UDP port discovery responders listen on
pub const DISCOVERY_PORT: u16 = 9998;

/// Default reply window in milliseconds
pub const DISCOVERY_WINDOW_MS: u64 = 3000;

const RECV_BUFFER_SIZE: usize = 2048;

/// A receiver that answered a probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredHost {
    pub ip: IpAddr,
    /// Present when the reply was a well-formed announcement
    pub name: Option<String>,
    pub transfer_port: Option<u16>,
}

impl DiscoveredHost {
    fn from_reply(ip: IpAddr, data: &[u8]) -> Self {
        match DiscoveryMsg::from_packet(data) {
            Some(DiscoveryMsg::Announce {
                name,
                transfer_port,
            }) => Self {
                ip,
                name: Some(name),
                transfer_port: Some(transfer_port),
            },
            _ => Self {
                ip,
                name: None,
                transfer_port: None,
            },
        }
    }
}

/// First receiver to answer within the window, if any
pub async fn discover_one(config: &DiscoveryConfig) -> Option<DiscoveredHost> {
    collect_replies(config, true).await.into_iter().next()
}

/// Every distinct receiver that answered within the window, in arrival order
pub async fn discover_all(config: &DiscoveryConfig) -> Vec<DiscoveredHost> {
    collect_replies(config, false).await
}

async fn collect_replies(config: &DiscoveryConfig, stop_at_first: bool) -> Vec<DiscoveredHost> {
    let socket = match open_probe_socket().await {
        Ok(socket) => socket,
        Err(e) => {
            warn!("Discovery unavailable, cannot open socket: {}", e);
            return Vec::new();
        }
    };

    let Some(packet) = (DiscoveryMsg::Probe { name: local_name() }).to_packet() else {
        return Vec::new();
    };

    let mut delivered = 0;
    for ip in probe_targets(config) {
        let target = SocketAddr::from((ip, config.port));
        match socket.send_to(&packet, target).await {
            Ok(_) => delivered += 1,
            Err(e) => debug!("Probe to {} failed: {}", target, e),
        }
    }
    if delivered == 0 {
        warn!("Discovery probe could not be sent on any interface");
        return Vec::new();
    }

    let deadline = Instant::now() + config.window;
    let mut seen = HashSet::new();
    let mut found = Vec::new();
    let mut buf = [0u8; RECV_BUFFER_SIZE];

    loop {
        match timeout_at(deadline, socket.recv_from(&mut buf)).await {
            Err(_) => break,
            Ok(Err(e)) => {
                // Some platforms surface ICMP unreachable here; keep waiting.
                debug!("Discovery receive error: {}", e);
            }
            Ok(Ok((len, addr))) => {
                if !seen.insert(addr.ip()) {
                    continue;
                }
                let host = DiscoveredHost::from_reply(addr.ip(), &buf[..len]);
                debug!("Discovery reply from {} ({:?})", host.ip, host.name);
                found.push(host);
                if stop_at_first {
                    break;
                }
            }
        }
    }

    found
}

async fn open_probe_socket() -> std::io::Result<UdpSocket> {
    let socket = UdpSocket::bind(SocketAddr::from(([0, 0, 0, 0], 0))).await?;
    socket.set_broadcast(true)?;
    Ok(socket)
}

/// Explicit targets, or the limited broadcast plus a /24 directed broadcast
/// for every non-loopback IPv4 interface
fn probe_targets(config: &DiscoveryConfig) -> Vec<Ipv4Addr> {
    if !config.targets.is_empty() {
        return config.targets.clone();
    }

    let mut targets = vec![Ipv4Addr::BROADCAST];
    if let Ok(interfaces) = local_ip_address::list_afinet_netifas() {
        for (_name, ip) in interfaces {
            if let IpAddr::V4(v4) = ip {
                if v4.is_loopback() {
                    continue;
                }
                let [a, b, c, _] = v4.octets();
                let directed = Ipv4Addr::new(a, b, c, 255);
                if !targets.contains(&directed) {
                    targets.push(directed);
                }
            }
        }
    }
    targets
}

/// Receiver-side half of discovery: answers probes with an announcement
pub struct DiscoveryResponder {
    socket: UdpSocket,
}

impl DiscoveryResponder {
    pub async fn bind(port: u16) -> std::io::Result<Self> {
        // Bind to 0.0.0.0 so broadcast probes reach us on every interface
        let socket = UdpSocket::bind(SocketAddr::from(([0, 0, 0, 0], port))).await?;
        socket.set_broadcast(true)?;
        Ok(Self { socket })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Answer probes until `cancel` fires
    pub async fn run(self, name: String, transfer_port: u16, cancel: CancellationToken) {
        let Some(reply) = (DiscoveryMsg::Announce {
            name,
            transfer_port,
        })
        .to_packet() else {
            return;
        };

        let mut buf = [0u8; RECV_BUFFER_SIZE];
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Discovery responder stopped");
                    break;
                }
                received = self.socket.recv_from(&mut buf) => match received {
                    Ok((len, addr)) => {
                        let Some(DiscoveryMsg::Probe { name: from }) =
                            DiscoveryMsg::from_packet(&buf[..len])
                        else {
                            continue;
                        };
                        debug!("Probe from {} ({}), announcing", addr, from);
                        if let Err(e) = self.socket.send_to(&reply, addr).await {
                            warn!("Cannot answer probe from {}: {}", addr, e);
                        }
                    }
                    Err(e) => warn!("Discovery responder receive error: {}", e),
                },
            }
        }
    }
}
