use async_trait::async_trait;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use thiserror::Error;
use tokio::net::UdpSocket;
use tracing::warn;

/// Placeholder reported when no IPv4 address could be determined.
pub const UNKNOWN_IP: &str = "Unknown";

#[derive(Debug, Error)]
pub enum LookupError {
    #[error("no usable local IPv4 address")]
    NoIpv4,
    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),
}

#[async_trait]
pub trait IpLookup: Send + Sync {
    async fn local_ipv4(&self) -> Result<Ipv4Addr, LookupError>;
}

/// Finds the address the OS would use for outbound IPv4 traffic.
///
/// Connecting a UDP socket only selects a route; no datagram is sent.
#[derive(Debug, Clone)]
pub struct LocalIpv4Lookup {
    probe: SocketAddr,
}

impl LocalIpv4Lookup {
    pub fn new(probe: SocketAddr) -> Self {
        Self { probe }
    }
}

impl Default for LocalIpv4Lookup {
    fn default() -> Self {
        Self::new(SocketAddr::from(([8, 8, 8, 8], 80)))
    }
}

#[async_trait]
impl IpLookup for LocalIpv4Lookup {
    async fn local_ipv4(&self) -> Result<Ipv4Addr, LookupError> {
        let socket = UdpSocket::bind(SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))).await?;
        socket.connect(self.probe).await?;
        match socket.local_addr()?.ip() {
            IpAddr::V4(ip) if !ip.is_unspecified() => Ok(ip),
            _ => Err(LookupError::NoIpv4),
        }
    }
}

/// Resolve the server IP for echoing back, or `"Unknown"` if the lookup fails.
pub async fn resolve_server_ip(lookup: &dyn IpLookup) -> String {
    match lookup.local_ipv4().await {
        Ok(ip) => ip.to_string(),
        Err(e) => {
            warn!("Local IPv4 lookup failed, using {UNKNOWN_IP}: {e}");
            UNKNOWN_IP.to_string()
        }
    }
}
