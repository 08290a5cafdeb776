//! Prober trait for health checking servers

use async_trait::async_trait;
use std::fmt;
use std::net::IpAddr;
use std::time::Duration;

use crate::error::Result;

/// Why a probe judged a server unreachable
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnreachableReason {
    /// No answer within the probe timeout
    Timeout,
    /// The server actively refused the connection
    Refused,
    /// Probe transport reported some other failure
    Other(String),
}

impl fmt::Display for UnreachableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnreachableReason::Timeout => f.write_str("timeout"),
            UnreachableReason::Refused => f.write_str("connection refused"),
            UnreachableReason::Other(msg) => f.write_str(msg),
        }
    }
}

/// The verdict of a single probe attempt
///
/// An unreachable server is a normal outcome, not an error. `Prober::probe`
/// only returns `Err` when the probe machinery itself is broken (e.g. the
/// ping binary is missing), which callers treat as unreachable with a
/// warning rather than crashing the probe loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// The server answered within the timeout
    Reachable,
    /// The server did not answer
    Unreachable(UnreachableReason),
}

/// Trait for probing whether a server is reachable
#[async_trait]
pub trait Prober: Send + Sync {
    /// Probe one address once, bounded by `timeout`
    async fn probe(&self, address: IpAddr, timeout: Duration) -> Result<ProbeOutcome>;

    /// Get the name of this prober (for logging)
    fn name(&self) -> &str;
}
