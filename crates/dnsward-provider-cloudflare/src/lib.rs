// # Cloudflare DNS Provider
//
// Cloudflare implementation of the dnsward `DnsProvider` trait.
//
// The provider is stateless and single-shot: one trait call maps to one
// API operation (listing may take several requests to follow pagination).
// Retries, backoff and scheduling are owned by the engine; errors are
// mapped onto the core taxonomy and propagated unchanged.
//
// ## Security Requirements
//
// - API token NEVER appears in logs
// - Provider MUST fail fast if the token is empty
//
// ## API Reference
//
// - Cloudflare API v4: https://developers.cloudflare.com/api/
// - List DNS Records: GET `/zones/:zone_id/dns_records?name=...&type=...`
// - Create DNS Record: POST `/zones/:zone_id/dns_records`
// - Delete DNS Record: DELETE `/zones/:zone_id/dns_records/:record_id`

use async_trait::async_trait;
use dnsward_core::record::{ActualRecord, DesiredRecord, RecordType};
use dnsward_core::traits::DnsProvider;
use dnsward_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::time::Duration;

/// Cloudflare API base URL
const CLOUDFLARE_API_BASE: &str = "https://api.cloudflare.com/client/v4";

/// Default HTTP timeout for API requests
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Records fetched per list request
const LIST_PAGE_SIZE: u32 = 100;

/// Envelope wrapping every Cloudflare v4 response
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    success: bool,
    result: Option<T>,
    #[serde(default)]
    errors: Vec<ApiError>,
    result_info: Option<ResultInfo>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct ResultInfo {
    page: u32,
    total_pages: u32,
}

/// A DNS record as Cloudflare reports it
#[derive(Debug, Deserialize)]
struct WireRecord {
    id: String,
    name: String,
    #[serde(rename = "type")]
    record_type: String,
    content: String,
    #[serde(default)]
    proxied: bool,
    ttl: u32,
}

impl WireRecord {
    /// Convert to the core record model
    ///
    /// Returns None for records whose content is not a parseable address
    /// of the expected family; those are logged and skipped rather than
    /// failing the whole listing.
    fn into_actual(self, zone_id: &str, expected: RecordType) -> Option<ActualRecord> {
        let record_type: RecordType = self.record_type.parse().ok()?;
        if record_type != expected {
            return None;
        }
        let address: IpAddr = match self.content.parse() {
            Ok(address) => address,
            Err(_) => {
                tracing::warn!(
                    record = %self.name,
                    content = %self.content,
                    "Skipping record with unparseable address"
                );
                return None;
            }
        };
        Some(ActualRecord {
            id: self.id,
            zone_id: zone_id.to_string(),
            hostname: self.name,
            record_type,
            address,
            proxied: self.proxied,
            ttl: self.ttl,
        })
    }
}

#[derive(Debug, Serialize)]
struct CreatePayload<'a> {
    #[serde(rename = "type")]
    record_type: &'a str,
    name: &'a str,
    content: String,
    ttl: u32,
    proxied: bool,
}

/// Cloudflare DNS provider
///
/// # Dry-Run Mode
///
/// When `dry_run` is true, listing works normally but create and delete
/// only log what they would have done, returning success. This allows a
/// full reconciliation cycle to be observed without touching any zone.
pub struct CloudflareProvider {
    /// Cloudflare API token. NEVER log this value
    api_token: String,

    /// HTTP client for API requests
    client: reqwest::Client,

    /// Dry-run mode: list normally, skip mutations
    dry_run: bool,
}

// Custom Debug implementation that hides the API token
impl std::fmt::Debug for CloudflareProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudflareProvider")
            .field("api_token", &"<REDACTED>")
            .field("dry_run", &self.dry_run)
            .finish()
    }
}

impl CloudflareProvider {
    /// Create a new Cloudflare provider
    ///
    /// The token needs Zone:DNS:Edit permission on every managed zone.
    /// Fails fast on an empty token so a misconfigured daemon never makes
    /// unauthenticated requests.
    pub fn new(api_token: impl Into<String>, dry_run: bool) -> Result<Self> {
        let api_token = api_token.into();
        if api_token.is_empty() {
            return Err(Error::config("Cloudflare API token cannot be empty"));
        }

        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        if dry_run {
            tracing::warn!("Cloudflare provider running in DRY-RUN mode, no changes will be made");
        }

        Ok(Self {
            api_token,
            client,
            dry_run,
        })
    }

    /// Map a non-success HTTP status onto the core error taxonomy
    async fn status_error(response: reqwest::Response, context: &str) -> Error {
        let status = response.status();
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unable to read error response".to_string());

        match status.as_u16() {
            401 | 403 => Error::auth(format!(
                "Invalid API token or insufficient permissions ({}). Status: {}",
                context, status
            )),
            404 => Error::not_found(format!("{}: {}", context, error_text)),
            429 => Error::rate_limited(format!(
                "Cloudflare rate limit exceeded ({}). Status: {}",
                context, status
            )),
            500..=599 => Error::http(format!(
                "Cloudflare server error ({}): {} - {}",
                context, status, error_text
            )),
            _ => Error::provider(
                "cloudflare",
                format!("{} failed: {} - {}", context, status, error_text),
            ),
        }
    }

    /// Unwrap a Cloudflare envelope, surfacing body-level errors
    fn unwrap_envelope<T>(envelope: ApiResponse<T>, context: &str) -> Result<ApiResponse<T>> {
        if !envelope.success {
            let detail = envelope
                .errors
                .iter()
                .map(|e| format!("{} (code {})", e.message, e.code))
                .collect::<Vec<_>>()
                .join("; ");
            return Err(Error::provider(
                "cloudflare",
                format!("{} failed: {}", context, detail),
            ));
        }
        Ok(envelope)
    }

    async fn fetch_page(
        &self,
        zone_id: &str,
        hostname: &str,
        record_type: RecordType,
        page: u32,
    ) -> Result<ApiResponse<Vec<WireRecord>>> {
        let url = format!(
            "{}/zones/{}/dns_records?name={}&type={}&page={}&per_page={}",
            CLOUDFLARE_API_BASE,
            zone_id,
            hostname,
            record_type.as_str(),
            page,
            LIST_PAGE_SIZE
        );

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.api_token)
            .header("Content-Type", "application/json")
            .send()
            .await
            .map_err(|e| Error::http(format!("List request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Self::status_error(response, "list records").await);
        }

        let envelope: ApiResponse<Vec<WireRecord>> = response
            .json()
            .await
            .map_err(|e| Error::provider("cloudflare", format!("Failed to parse response: {}", e)))?;

        Self::unwrap_envelope(envelope, "list records")
    }
}

#[async_trait]
impl DnsProvider for CloudflareProvider {
    /// List all records for a (hostname, type) pair, following pagination
    async fn list_records(
        &self,
        zone_id: &str,
        hostname: &str,
        record_type: RecordType,
    ) -> Result<Vec<ActualRecord>> {
        let mut records = Vec::new();
        let mut page = 1;

        loop {
            let envelope = self.fetch_page(zone_id, hostname, record_type, page).await?;

            let wire = envelope.result.unwrap_or_default();
            records.extend(
                wire.into_iter()
                    .filter_map(|r| r.into_actual(zone_id, record_type)),
            );

            match envelope.result_info {
                Some(info) if info.page < info.total_pages => page = info.page + 1,
                _ => break,
            }
        }

        tracing::debug!(
            zone = %zone_id,
            %hostname,
            record_type = %record_type,
            count = records.len(),
            "Listed records"
        );
        Ok(records)
    }

    async fn create_record(
        &self,
        record: &DesiredRecord,
        ttl: u32,
        proxied: bool,
    ) -> Result<String> {
        if self.dry_run {
            tracing::info!(record = %record, "[DRY-RUN] Would create record");
            return Ok(format!("dry-run-{}", record.hostname));
        }

        let url = format!("{}/zones/{}/dns_records", CLOUDFLARE_API_BASE, record.zone_id);
        let payload = CreatePayload {
            record_type: record.record_type.as_str(),
            name: &record.hostname,
            content: record.address.to_string(),
            ttl,
            proxied,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_token)
            .header("Content-Type", "application/json")
            .json(&payload)
            .send()
            .await
            .map_err(|e| Error::http(format!("Create request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Self::status_error(response, "create record").await);
        }

        let envelope: ApiResponse<WireRecord> = response
            .json()
            .await
            .map_err(|e| Error::provider("cloudflare", format!("Failed to parse response: {}", e)))?;
        let envelope = Self::unwrap_envelope(envelope, "create record")?;

        let created = envelope.result.ok_or_else(|| {
            Error::provider("cloudflare", "Create response carried no record")
        })?;

        tracing::info!(record = %record, id = %created.id, "Created record");
        Ok(created.id)
    }

    async fn delete_record(&self, zone_id: &str, record_id: &str) -> Result<()> {
        if self.dry_run {
            tracing::info!(zone = %zone_id, %record_id, "[DRY-RUN] Would delete record");
            return Ok(());
        }

        let url = format!(
            "{}/zones/{}/dns_records/{}",
            CLOUDFLARE_API_BASE, zone_id, record_id
        );

        let response = self
            .client
            .delete(&url)
            .bearer_auth(&self.api_token)
            .header("Content-Type", "application/json")
            .send()
            .await
            .map_err(|e| Error::http(format!("Delete request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Self::status_error(response, "delete record").await);
        }

        tracing::info!(zone = %zone_id, %record_id, "Deleted record");
        Ok(())
    }

    fn name(&self) -> &str {
        "cloudflare"
    }
}
