// # TCP Prober
//
// Probes servers by opening a TCP connection to a fixed port. Unlike ICMP
// this exercises the actual service socket, so a host that answers ping
// with a wedged service still counts as down.

use async_trait::async_trait;
use dnsward_core::traits::{ProbeOutcome, Prober, UnreachableReason};
use dnsward_core::Result;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tokio::net::TcpStream;

/// Prober that attempts a TCP connect to one port
///
/// The connection is closed immediately after it is established; nothing
/// is read or written.
#[derive(Debug, Clone)]
pub struct TcpProber {
    port: u16,
}

impl TcpProber {
    /// Create a prober for the given port
    pub fn new(port: u16) -> Self {
        Self { port }
    }
}

#[async_trait]
impl Prober for TcpProber {
    async fn probe(&self, address: IpAddr, timeout: Duration) -> Result<ProbeOutcome> {
        let target = SocketAddr::new(address, self.port);

        match tokio::time::timeout(timeout, TcpStream::connect(target)).await {
            Ok(Ok(_stream)) => Ok(ProbeOutcome::Reachable),
            Ok(Err(e)) if e.kind() == io::ErrorKind::ConnectionRefused => {
                tracing::debug!(%target, "Connection refused");
                Ok(ProbeOutcome::Unreachable(UnreachableReason::Refused))
            }
            Ok(Err(e)) => {
                tracing::debug!(%target, error = %e, "Connect failed");
                Ok(ProbeOutcome::Unreachable(UnreachableReason::Other(
                    e.to_string(),
                )))
            }
            Err(_) => Ok(ProbeOutcome::Unreachable(UnreachableReason::Timeout)),
        }
    }

    fn name(&self) -> &str {
        "tcp"
    }
}
