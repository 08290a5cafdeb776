// # Ping Prober
//
// Probes servers by running the system `ping` binary, one echo request per
// probe. Raw ICMP sockets need CAP_NET_RAW; delegating to the setuid ping
// binary keeps the daemon unprivileged.

use async_trait::async_trait;
use dnsward_core::traits::{ProbeOutcome, Prober, UnreachableReason};
use dnsward_core::{Error, Result};
use std::net::IpAddr;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// Prober that shells out to `ping`
///
/// One probe sends a single echo request and judges the server by the
/// process exit status. The child is killed if the probe timeout fires
/// before ping finishes.
#[derive(Debug, Clone)]
pub struct PingProber {
    program: String,
}

impl PingProber {
    /// Create a prober using the system `ping`
    pub fn new() -> Self {
        Self::with_program("ping")
    }

    /// Create a prober using a specific binary
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for PingProber {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Prober for PingProber {
    async fn probe(&self, address: IpAddr, timeout: Duration) -> Result<ProbeOutcome> {
        let mut child = Command::new(&self.program)
            .arg("-c")
            .arg("1")
            .arg(address.to_string())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                Error::probe(format!("Failed to spawn {}: {}", self.program, e))
            })?;

        match tokio::time::timeout(timeout, child.wait()).await {
            Ok(Ok(status)) if status.success() => Ok(ProbeOutcome::Reachable),
            Ok(Ok(status)) => {
                tracing::debug!(%address, %status, "Ping reported unreachable");
                Ok(ProbeOutcome::Unreachable(UnreachableReason::Other(
                    format!("ping exited with {}", status),
                )))
            }
            Ok(Err(e)) => Err(Error::probe(format!(
                "Failed to wait for {}: {}",
                self.program, e
            ))),
            Err(_) => {
                // kill_on_drop reaps the child if start_kill fails here.
                let _ = child.start_kill();
                Ok(ProbeOutcome::Unreachable(UnreachableReason::Timeout))
            }
        }
    }

    fn name(&self) -> &str {
        "ping"
    }
}
