//! DnsProvider trait for managed DNS backends

use async_trait::async_trait;

use crate::error::Result;
use crate::record::{ActualRecord, DesiredRecord};

/// Trait for DNS providers that can list, create and delete records
///
/// Implementations must be idempotent-friendly: listing is read-only,
/// creating a record that already exists and deleting a record that is
/// already gone should surface provider errors unchanged so the engine's
/// retry policy can classify them.
#[async_trait]
pub trait DnsProvider: Send + Sync {
    /// List every record for `hostname` of type `record_type` in the zone
    ///
    /// Must return all matching records, following provider pagination.
    async fn list_records(
        &self,
        zone_id: &str,
        hostname: &str,
        record_type: crate::record::RecordType,
    ) -> Result<Vec<ActualRecord>>;

    /// Create one record; returns the provider-assigned record id
    async fn create_record(
        &self,
        record: &DesiredRecord,
        ttl: u32,
        proxied: bool,
    ) -> Result<String>;

    /// Delete one record by provider id
    async fn delete_record(&self, zone_id: &str, record_id: &str) -> Result<()>;

    /// Get the name of this provider (for logging)
    fn name(&self) -> &str;
}
