// # dnswardd - Health-Gated DNS Daemon
//
// Thin integration layer over dnsward-core: reads configuration from
// environment variables, wires up the prober, provider, state store and
// notifier, and runs the engine until SIGTERM/SIGINT. All probing and
// reconciliation logic lives in dnsward-core.
//
// ## Configuration
//
// All configuration is done via environment variables:
//
// ### Topology
// - `DNSWARD_ZONE_HOSTNAMES`: Comma-separated zone:hostname pairs,
//   e.g. `zoneid1:app.example.com,zoneid1:web.example.com`
// - `DNSWARD_SERVERS`: Comma-separated server IP addresses
// - `DNSWARD_RECORD_TYPES`: Record types to manage (default: A)
//
// ### Provider
// - `DNSWARD_API_TOKEN`: Cloudflare API token (required)
// - `DNSWARD_MODE`: `live` (default) or `dry-run`
// - `DNSWARD_MANAGE_DNS`: `true` (default) or `false` to only track health
//
// ### Probing
// - `DNSWARD_PROBE_TYPE`: `ping` (default) or `tcp`
// - `DNSWARD_TCP_PORT`: Port to connect to (required for tcp)
// - `DNSWARD_PROBE_INTERVAL_SECS` / `DNSWARD_PROBE_TIMEOUT_SECS`
// - `DNSWARD_PROBE_CONCURRENCY`
//
// ### Hysteresis
// - `DNSWARD_FLAP_UP_THRESHOLD` / `DNSWARD_FLAP_DOWN_THRESHOLD`
//
// ### Reconciliation
// - `DNSWARD_SYNC_INTERVAL_SECS`, `DNSWARD_TTL`, `DNSWARD_PROXIED`
// - `DNSWARD_RETRY_MAX_ATTEMPTS`, `DNSWARD_RETRY_BASE_DELAY_MS`,
//   `DNSWARD_RETRY_MAX_DELAY_MS`
//
// ### State Store
// - `DNSWARD_STATE_STORE_TYPE`: `file` (default) or `memory`
// - `DNSWARD_STATE_STORE_PATH`: Path to state file (for file store)
//
// ### Notifications
// - `DNSWARD_TELEGRAM_TOKEN` / `DNSWARD_TELEGRAM_CHAT_ID`: optional pair
//
// ### Logging
// - `DNSWARD_LOG_LEVEL`: trace, debug, info (default), warn, error
//
// ## Example
//
// ```bash
// export DNSWARD_API_TOKEN=your_token
// export DNSWARD_ZONE_HOSTNAMES=zone1:app.example.com
// export DNSWARD_SERVERS=203.0.113.10,203.0.113.11
// export DNSWARD_STATE_STORE_PATH=/var/lib/dnsward/state.json
//
// dnswardd
// ```

use anyhow::Result;
use std::collections::{BTreeMap, BTreeSet};
use std::env;
use std::net::IpAddr;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;

use dnsward_core::record::RecordType;
use dnsward_core::traits::{DnsProvider, LogNotifier, Notifier, Prober, StateStore};
use dnsward_core::{Engine, FileStateStore, MemoryStateStore, ServerTarget};
use dnsward_notify_telegram::TelegramNotifier;
use dnsward_probe_ping::PingProber;
use dnsward_probe_tcp::TcpProber;
use dnsward_provider_cloudflare::CloudflareProvider;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum DaemonExitCode {
    CleanShutdown = 0,
    ConfigError = 1,
    RuntimeError = 2,
}

impl From<DaemonExitCode> for ExitCode {
    fn from(code: DaemonExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Application configuration
struct Config {
    zone_hostnames: Vec<(String, String)>,
    servers: Vec<IpAddr>,
    record_types: BTreeSet<RecordType>,
    api_token: String,
    dry_run: bool,
    manage_dns: bool,
    probe_type: String,
    tcp_port: Option<u16>,
    probe_interval_secs: Option<u64>,
    probe_timeout_secs: Option<u64>,
    probe_concurrency: Option<usize>,
    sync_interval_secs: Option<u64>,
    ttl: Option<u32>,
    proxied: bool,
    up_threshold: Option<u32>,
    down_threshold: Option<u32>,
    retry_max_attempts: Option<usize>,
    retry_base_delay_ms: Option<u64>,
    retry_max_delay_ms: Option<u64>,
    state_store_type: String,
    state_store_path: Option<String>,
    telegram_token: Option<String>,
    telegram_chat_id: Option<String>,
    log_level: String,
}

/// Parse an optional numeric environment variable, failing loudly on junk
fn parse_env<T: std::str::FromStr>(name: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(value) => value
            .parse()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("{} is not valid: {}", name, e)),
        Err(_) => Ok(None),
    }
}

/// Parse `zone:hostname` pairs from a comma-separated list
fn parse_zone_hostnames(raw: &str) -> Result<Vec<(String, String)>> {
    let mut pairs = Vec::new();
    for entry in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let Some((zone, hostname)) = entry.split_once(':') else {
            anyhow::bail!(
                "DNSWARD_ZONE_HOSTNAMES entry '{}' is not in zone:hostname form",
                entry
            );
        };
        let zone = zone.trim();
        let hostname = hostname.trim();
        if zone.is_empty() || hostname.is_empty() {
            anyhow::bail!(
                "DNSWARD_ZONE_HOSTNAMES entry '{}' has an empty zone or hostname",
                entry
            );
        }
        pairs.push((zone.to_string(), hostname.to_string()));
    }
    Ok(pairs)
}

/// Validate that a string is a valid domain name
///
/// Basic DNS domain name validation per RFC 1035. Not comprehensive but
/// catches common errors.
fn validate_domain_name(domain: &str) -> Result<()> {
    if domain.is_empty() {
        anyhow::bail!("Domain name cannot be empty");
    }

    if domain.len() > 253 {
        anyhow::bail!(
            "Domain name too long: {} chars (max 253). Got: {}",
            domain.len(),
            domain
        );
    }

    for label in domain.split('.') {
        if label.is_empty() {
            anyhow::bail!("Domain name has empty label: '{}'", domain);
        }

        if label.len() > 63 {
            anyhow::bail!(
                "Domain label too long: {} chars (max 63). Label: '{}'",
                label.len(),
                label
            );
        }

        if !label.chars().all(|c| c.is_alphanumeric() || c == '-') {
            anyhow::bail!(
                "Domain label contains invalid characters. Label: '{}'. \
                Valid: alphanumeric and hyphen only.",
                label
            );
        }

        if label.starts_with('-') || label.ends_with('-') {
            anyhow::bail!(
                "Domain label cannot start or end with hyphen. Label: '{}'",
                label
            );
        }
    }

    Ok(())
}

/// Build engine targets from the configured topology
///
/// Every server serves every zone:hostname pair. Each target carries the
/// configured record types narrowed to the server's address family; a
/// server for which nothing remains is a configuration error.
fn build_targets(
    zone_hostnames: &[(String, String)],
    servers: &[IpAddr],
    record_types: &BTreeSet<RecordType>,
) -> Result<Vec<ServerTarget>> {
    let mut zones: BTreeMap<&str, BTreeSet<String>> = BTreeMap::new();
    for (zone, hostname) in zone_hostnames {
        zones.entry(zone.as_str()).or_default().insert(hostname.clone());
    }

    let mut targets = Vec::new();
    for server in servers {
        let compatible: BTreeSet<RecordType> = record_types
            .iter()
            .filter(|t| t.matches(server))
            .copied()
            .collect();
        if compatible.is_empty() {
            anyhow::bail!(
                "Server {} matches none of the configured record types ({:?})",
                server,
                record_types
            );
        }
        for (zone, hostnames) in &zones {
            targets.push(ServerTarget {
                address: *server,
                zone_id: zone.to_string(),
                hostnames: hostnames.clone(),
                record_types: compatible.clone(),
            });
        }
    }
    Ok(targets)
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        let record_types = match env::var("DNSWARD_RECORD_TYPES") {
            Ok(raw) => {
                let mut types = BTreeSet::new();
                for entry in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
                    types.insert(
                        entry
                            .parse::<RecordType>()
                            .map_err(|e| anyhow::anyhow!("DNSWARD_RECORD_TYPES: {}", e))?,
                    );
                }
                types
            }
            Err(_) => BTreeSet::from([RecordType::A]),
        };

        let mut servers = Vec::new();
        for entry in env::var("DNSWARD_SERVERS")
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            servers.push(entry.parse::<IpAddr>().map_err(|e| {
                anyhow::anyhow!("DNSWARD_SERVERS entry '{}' is not an IP address: {}", entry, e)
            })?);
        }

        Ok(Self {
            zone_hostnames: parse_zone_hostnames(
                &env::var("DNSWARD_ZONE_HOSTNAMES").unwrap_or_default(),
            )?,
            servers,
            record_types,
            api_token: env::var("DNSWARD_API_TOKEN").unwrap_or_default(),
            dry_run: env::var("DNSWARD_MODE")
                .unwrap_or_default()
                .to_lowercase()
                == "dry-run",
            manage_dns: parse_env::<bool>("DNSWARD_MANAGE_DNS")?.unwrap_or(true),
            probe_type: env::var("DNSWARD_PROBE_TYPE").unwrap_or_else(|_| "ping".to_string()),
            tcp_port: parse_env("DNSWARD_TCP_PORT")?,
            probe_interval_secs: parse_env("DNSWARD_PROBE_INTERVAL_SECS")?,
            probe_timeout_secs: parse_env("DNSWARD_PROBE_TIMEOUT_SECS")?,
            probe_concurrency: parse_env("DNSWARD_PROBE_CONCURRENCY")?,
            sync_interval_secs: parse_env("DNSWARD_SYNC_INTERVAL_SECS")?,
            ttl: parse_env("DNSWARD_TTL")?,
            proxied: parse_env::<bool>("DNSWARD_PROXIED")?.unwrap_or(false),
            up_threshold: parse_env("DNSWARD_FLAP_UP_THRESHOLD")?,
            down_threshold: parse_env("DNSWARD_FLAP_DOWN_THRESHOLD")?,
            retry_max_attempts: parse_env("DNSWARD_RETRY_MAX_ATTEMPTS")?,
            retry_base_delay_ms: parse_env("DNSWARD_RETRY_BASE_DELAY_MS")?,
            retry_max_delay_ms: parse_env("DNSWARD_RETRY_MAX_DELAY_MS")?,
            state_store_type: env::var("DNSWARD_STATE_STORE_TYPE")
                .unwrap_or_else(|_| "file".to_string()),
            state_store_path: env::var("DNSWARD_STATE_STORE_PATH").ok(),
            telegram_token: env::var("DNSWARD_TELEGRAM_TOKEN").ok(),
            telegram_chat_id: env::var("DNSWARD_TELEGRAM_CHAT_ID").ok(),
            log_level: env::var("DNSWARD_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }

    /// Validate the configuration
    fn validate(&self) -> Result<()> {
        if self.api_token.is_empty() {
            anyhow::bail!(
                "DNSWARD_API_TOKEN is required. \
                Set it via: export DNSWARD_API_TOKEN=your_token"
            );
        }

        // Cloudflare API tokens are typically 40 characters alphanumeric
        if self.api_token.len() < 20 {
            anyhow::bail!(
                "DNSWARD_API_TOKEN appears too short ({} chars). \
                Cloudflare tokens are typically 40 characters. \
                Verify your token is correct.",
                self.api_token.len()
            );
        }

        let token_lower = self.api_token.to_lowercase();
        if token_lower.contains("your_token")
            || token_lower.contains("replace_me")
            || token_lower.contains("example")
            || token_lower == "token"
        {
            anyhow::bail!(
                "DNSWARD_API_TOKEN appears to be a placeholder. \
                Use an actual API token from your DNS provider."
            );
        }

        if self.zone_hostnames.is_empty() {
            anyhow::bail!(
                "DNSWARD_ZONE_HOSTNAMES must contain at least one zone:hostname pair. \
                Set it via: export DNSWARD_ZONE_HOSTNAMES=zone1:app.example.com"
            );
        }
        for (_, hostname) in &self.zone_hostnames {
            validate_domain_name(hostname)?;
        }

        if self.servers.is_empty() {
            anyhow::bail!(
                "DNSWARD_SERVERS must contain at least one server address. \
                Set it via: export DNSWARD_SERVERS=203.0.113.10,203.0.113.11"
            );
        }

        match self.probe_type.as_str() {
            "ping" => {}
            "tcp" => {
                if self.tcp_port.is_none() {
                    anyhow::bail!("DNSWARD_TCP_PORT is required when DNSWARD_PROBE_TYPE=tcp");
                }
            }
            other => anyhow::bail!(
                "DNSWARD_PROBE_TYPE '{}' is not supported. Supported types: ping, tcp",
                other
            ),
        }

        match self.state_store_type.as_str() {
            "memory" => {}
            "file" => match self.state_store_path {
                None => anyhow::bail!(
                    "DNSWARD_STATE_STORE_PATH is required when DNSWARD_STATE_STORE_TYPE=file. \
                    Set it via: export DNSWARD_STATE_STORE_PATH=/var/lib/dnsward/state.json"
                ),
                Some(ref path) => {
                    if path.is_empty() {
                        anyhow::bail!("DNSWARD_STATE_STORE_PATH cannot be empty");
                    }
                    if let Some(parent) = std::path::Path::new(path).parent()
                        && !parent.as_os_str().is_empty()
                        && !parent.exists()
                    {
                        anyhow::bail!(
                            "DNSWARD_STATE_STORE_PATH parent directory does not exist: {}. \
                            Create it first: sudo mkdir -p {}",
                            parent.display(),
                            parent.display()
                        );
                    }
                }
            },
            other => anyhow::bail!(
                "DNSWARD_STATE_STORE_TYPE '{}' is not supported. Supported types: file, memory",
                other
            ),
        }

        if let Some(interval) = self.probe_interval_secs
            && !(1..=3600).contains(&interval)
        {
            anyhow::bail!(
                "DNSWARD_PROBE_INTERVAL_SECS must be between 1 and 3600. Got: {}",
                interval
            );
        }

        if let Some(interval) = self.sync_interval_secs
            && !(10..=86400).contains(&interval)
        {
            anyhow::bail!(
                "DNSWARD_SYNC_INTERVAL_SECS must be between 10 and 86400. Got: {}",
                interval
            );
        }

        if let Some(attempts) = self.retry_max_attempts
            && !(1..=10).contains(&attempts)
        {
            anyhow::bail!(
                "DNSWARD_RETRY_MAX_ATTEMPTS must be between 1 and 10. Got: {}",
                attempts
            );
        }

        // Telegram needs both halves of the credential pair
        match (&self.telegram_token, &self.telegram_chat_id) {
            (Some(_), None) => {
                anyhow::bail!("DNSWARD_TELEGRAM_CHAT_ID is required with DNSWARD_TELEGRAM_TOKEN")
            }
            (None, Some(_)) => {
                anyhow::bail!("DNSWARD_TELEGRAM_TOKEN is required with DNSWARD_TELEGRAM_CHAT_ID")
            }
            _ => {}
        }

        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => anyhow::bail!(
                "DNSWARD_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                other
            ),
        }

        Ok(())
    }

    /// Translate into the engine configuration
    fn engine_config(&self) -> Result<dnsward_core::Config> {
        let targets = build_targets(&self.zone_hostnames, &self.servers, &self.record_types)?;
        let mut config = dnsward_core::Config::new(targets);

        if let Some(v) = self.probe_interval_secs {
            config.probe.interval_secs = v;
        }
        if let Some(v) = self.probe_timeout_secs {
            config.probe.timeout_secs = v;
        }
        if let Some(v) = self.probe_concurrency {
            config.probe.concurrency = v;
        }
        if let Some(v) = self.sync_interval_secs {
            config.sync.interval_secs = v;
        }
        if let Some(v) = self.ttl {
            config.sync.ttl = v;
        }
        config.sync.proxied = self.proxied;
        config.sync.manage_dns = self.manage_dns;
        if let Some(v) = self.up_threshold {
            config.flap.up_threshold = v;
        }
        if let Some(v) = self.down_threshold {
            config.flap.down_threshold = v;
        }
        if let Some(v) = self.retry_max_attempts {
            config.retry.max_attempts = v;
        }
        if let Some(v) = self.retry_base_delay_ms {
            config.retry.base_delay_ms = v;
        }
        if let Some(v) = self.retry_max_delay_ms {
            config.retry.max_delay_ms = v;
        }

        config.validate()?;
        Ok(config)
    }
}

fn main() -> ExitCode {
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return DaemonExitCode::ConfigError.into();
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {}", e);
        return DaemonExitCode::ConfigError.into();
    }

    let log_level = match config.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return DaemonExitCode::ConfigError.into();
    }

    info!("Starting dnswardd daemon");
    info!(
        "Configuration loaded: {} zone:hostname pair(s), {} server(s)",
        config.zone_hostnames.len(),
        config.servers.len()
    );

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return DaemonExitCode::RuntimeError.into();
        }
    };

    rt.block_on(async {
        if let Err(e) = run_daemon(config).await {
            error!("Daemon error: {}", e);
            DaemonExitCode::RuntimeError
        } else {
            DaemonExitCode::CleanShutdown
        }
    })
    .into()
}

/// Run the daemon
async fn run_daemon(config: Config) -> Result<()> {
    let engine_config = config.engine_config()?;

    let prober: Arc<dyn Prober> = match config.probe_type.as_str() {
        "tcp" => {
            // validate() guarantees the port is present for tcp
            let port = config
                .tcp_port
                .ok_or_else(|| anyhow::anyhow!("DNSWARD_TCP_PORT missing"))?;
            Arc::new(TcpProber::new(port))
        }
        _ => Arc::new(PingProber::new()),
    };
    info!("Probe type: {}", prober.name());

    let provider: Arc<dyn DnsProvider> =
        Arc::new(CloudflareProvider::new(config.api_token.clone(), config.dry_run)?);
    if config.dry_run {
        warn!("Running in DRY-RUN mode: DNS will not be modified");
    }
    if !config.manage_dns {
        warn!("DNS management disabled: health is tracked and reported only");
    }

    let state_store: Arc<dyn StateStore> = match config.state_store_type.as_str() {
        "memory" => Arc::new(MemoryStateStore::new()),
        _ => {
            // validate() guarantees the path is present for file
            let path = config
                .state_store_path
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("DNSWARD_STATE_STORE_PATH missing"))?;
            Arc::new(FileStateStore::new(path).await?)
        }
    };
    info!("State store type: {}", config.state_store_type);

    let notifier: Arc<dyn Notifier> =
        match (&config.telegram_token, &config.telegram_chat_id) {
            (Some(token), Some(chat_id)) => {
                let telegram = Arc::new(TelegramNotifier::new(token.clone(), chat_id.clone())?);
                let summary = startup_summary(&config);
                if let Err(e) = telegram.send_message(&summary).await {
                    warn!("Failed to send startup notification: {}", e);
                }
                telegram
            }
            _ => Arc::new(LogNotifier),
        };
    info!("Notifier: {}", notifier.name());

    let (engine, mut events) = Engine::new(prober, provider, state_store, engine_config)?;

    // Forward engine events to the notifier off the engine's loops
    let event_notifier = Arc::clone(&notifier);
    let forwarder = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            if let Err(e) = event_notifier.notify(&event).await {
                warn!("Notification failed: {}", e);
            }
        }
    });

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        let signal_name = wait_for_shutdown().await;
        info!("Received shutdown signal: {}", signal_name);
        let _ = shutdown_tx.send(true);
    });

    info!("Starting dnsward engine");
    let result = engine.run_with_shutdown(shutdown_rx).await;

    // The engine dropped its event sender; drain the forwarder
    if let Err(e) = forwarder.await {
        warn!("Event forwarder did not shut down cleanly: {}", e);
    }

    result?;
    info!("Daemon stopped");
    Ok(())
}

/// Compose the startup summary for the notification channel
fn startup_summary(config: &Config) -> String {
    let mut lines = vec!["\u{1F6E1} <b>dnswardd started</b>".to_string()];
    lines.push(format!(
        "Monitoring {} server(s) across {} zone:hostname pair(s)",
        config.servers.len(),
        config.zone_hostnames.len()
    ));
    for (zone, hostname) in &config.zone_hostnames {
        lines.push(format!("\u{2022} <code>{}</code> in zone <code>{}</code>", hostname, zone));
    }
    if config.dry_run {
        lines.push("Mode: DRY-RUN (no DNS changes)".to_string());
    }
    lines.join("\n")
}

/// Wait for SIGTERM or SIGINT
#[cfg(unix)]
async fn wait_for_shutdown() -> &'static str {
    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to setup SIGTERM handler: {}", e);
            // Fall back to ctrl_c only
            let _ = tokio::signal::ctrl_c().await;
            return "SIGINT";
        }
    };
    let mut sigint = match signal(SignalKind::interrupt()) {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to setup SIGINT handler: {}", e);
            let _ = sigterm.recv().await;
            return "SIGTERM";
        }
    };

    tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    }
}

/// Fallback implementation for non-Unix platforms
#[cfg(not(unix))]
async fn wait_for_shutdown() -> &'static str {
    let _ = tokio::signal::ctrl_c().await;
    "SIGINT"
}
