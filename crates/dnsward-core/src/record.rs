//! DNS record data model
//!
//! `DesiredRecord` is derived from health state and never persisted on its
//! own; `ActualRecord` is whatever the provider reports for a zone and is
//! authoritative for one reconciliation pass.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use crate::error::Error;

/// Managed DNS record types
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum RecordType {
    /// A record (IPv4)
    #[serde(rename = "A")]
    A,
    /// AAAA record (IPv6)
    #[serde(rename = "AAAA")]
    Aaaa,
}

impl RecordType {
    /// Wire name of the record type
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::A => "A",
            RecordType::Aaaa => "AAAA",
        }
    }

    /// Whether an address can be the content of this record type
    pub fn matches(&self, address: &IpAddr) -> bool {
        match self {
            RecordType::A => address.is_ipv4(),
            RecordType::Aaaa => address.is_ipv6(),
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "A" => Ok(RecordType::A),
            "AAAA" => Ok(RecordType::Aaaa),
            other => Err(Error::config(format!(
                "Unsupported record type '{}'. Supported types: A, AAAA",
                other
            ))),
        }
    }
}

/// A record that should exist while its owning server is up
///
/// Ordered so sets of desired records diff deterministically.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct DesiredRecord {
    /// Provider zone identifier
    pub zone_id: String,
    /// Fully qualified record name
    pub hostname: String,
    /// Record type
    pub record_type: RecordType,
    /// Record content
    pub address: IpAddr,
}

impl DesiredRecord {
    /// Identity of the record within its zone: (hostname, type, address)
    pub fn key(&self) -> (&str, RecordType, IpAddr) {
        (self.hostname.as_str(), self.record_type, self.address)
    }
}

impl fmt::Display for DesiredRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} -> {}",
            self.hostname, self.record_type, self.address
        )
    }
}

/// A record as reported by the DNS provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActualRecord {
    /// Provider-assigned record id
    pub id: String,
    /// Provider zone identifier
    pub zone_id: String,
    /// Fully qualified record name
    pub hostname: String,
    /// Record type
    pub record_type: RecordType,
    /// Record content
    pub address: IpAddr,
    /// Whether the record is proxied through the provider
    pub proxied: bool,
    /// Record time-to-live in seconds
    pub ttl: u32,
}

impl ActualRecord {
    /// Identity of the record within its zone: (hostname, type, address)
    ///
    /// The provider record id is deliberately excluded so that actual
    /// records compare against desired records; duplicate provider records
    /// for the same tuple share a key.
    pub fn key(&self) -> (&str, RecordType, IpAddr) {
        (self.hostname.as_str(), self.record_type, self.address)
    }
}

impl fmt::Display for ActualRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} -> {} ({})",
            self.hostname, self.record_type, self.address, self.id
        )
    }
}
