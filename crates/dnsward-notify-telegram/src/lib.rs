// # Telegram Notifier
//
// Pushes confirmed health transitions and reconciliation results to a
// Telegram chat via the Bot API. Delivery is best effort: the engine keeps
// running when Telegram is down, and no-op reconciliation passes are not
// announced to keep the chat quiet.
//
// ## Security Requirements
//
// - Bot token NEVER appears in logs

use async_trait::async_trait;
use dnsward_core::health::Status;
use dnsward_core::traits::Notifier;
use dnsward_core::{Error, Event, Result};
use serde::Serialize;
use std::time::Duration;

/// Telegram Bot API base URL
const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// HTTP timeout for Bot API requests
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'static str,
    disable_web_page_preview: bool,
}

/// Notifier that sends HTML messages to a Telegram chat
pub struct TelegramNotifier {
    /// Bot API token. NEVER log this value
    bot_token: String,
    chat_id: String,
    client: reqwest::Client,
}

// Custom Debug implementation that hides the bot token
impl std::fmt::Debug for TelegramNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramNotifier")
            .field("bot_token", &"<REDACTED>")
            .field("chat_id", &self.chat_id)
            .finish()
    }
}

impl TelegramNotifier {
    /// Create a notifier for one chat
    pub fn new(bot_token: impl Into<String>, chat_id: impl Into<String>) -> Result<Self> {
        let bot_token = bot_token.into();
        let chat_id = chat_id.into();
        if bot_token.is_empty() {
            return Err(Error::config("Telegram bot token cannot be empty"));
        }
        if chat_id.is_empty() {
            return Err(Error::config("Telegram chat id cannot be empty"));
        }

        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            bot_token,
            chat_id,
            client,
        })
    }

    /// Render an event as a Telegram HTML message
    ///
    /// Returns None for events that should not be announced, currently
    /// reconciliation passes that changed nothing.
    pub fn format_event(event: &Event) -> Option<String> {
        match event {
            Event::HealthTransition {
                address,
                zone_id,
                to,
                ..
            } => {
                let (emoji, word) = match to {
                    Status::Up => ("\u{1F7E2}", "UP"),
                    Status::Down => ("\u{1F534}", "DOWN"),
                };
                Some(format!(
                    "{} Server <code>{}</code> in zone <code>{}</code> is <b>{}</b>",
                    emoji, address, zone_id, word
                ))
            }
            Event::ReconciliationResult {
                zone_id,
                created,
                deleted,
                errors,
            } => {
                if event.is_noop_reconciliation() {
                    return None;
                }
                let mut lines = vec![format!("<b>Zone {}</b> reconciled", zone_id)];
                for record in created {
                    lines.push(format!("\u{2795} <code>{}</code>", record));
                }
                for record in deleted {
                    lines.push(format!("\u{2796} <code>{}</code>", record));
                }
                for error in errors {
                    lines.push(format!("\u{26A0} {}", error));
                }
                Some(lines.join("\n"))
            }
        }
    }

    /// Send one HTML message to the configured chat
    ///
    /// Public so the daemon can send a startup summary that is not tied
    /// to any engine event.
    pub async fn send_message(&self, text: &str) -> Result<()> {
        let url = format!("{}/bot{}/sendMessage", TELEGRAM_API_BASE, self.bot_token);
        let payload = SendMessage {
            chat_id: &self.chat_id,
            text,
            parse_mode: "HTML",
            disable_web_page_preview: true,
        };

        let response = self
            .client
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| Error::http(format!("Telegram request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(match status.as_u16() {
                401 | 403 => Error::auth(format!(
                    "Telegram rejected the bot token. Status: {}",
                    status
                )),
                429 => Error::rate_limited(format!(
                    "Telegram rate limit exceeded. Status: {}",
                    status
                )),
                500..=599 => Error::http(format!("Telegram server error: {}", status)),
                _ => Error::provider(
                    "telegram",
                    format!("sendMessage failed with status {}", status),
                ),
            });
        }

        tracing::debug!("Telegram message delivered");
        Ok(())
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(&self, event: &Event) -> Result<()> {
        match Self::format_event(event) {
            Some(text) => self.send_message(&text).await,
            None => Ok(()),
        }
    }

    fn name(&self) -> &str {
        "telegram"
    }
}
