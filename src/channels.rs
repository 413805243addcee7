//! Outbound notification channels
//!
//! Each channel makes a single best-effort delivery attempt per message and
//! reports an [`Outcome`]. Transport errors are logged and folded into
//! `Outcome::Failed`; nothing here returns an error to the dispatcher.

use crate::config::Config;
use crate::error::{Error, Result};
use async_trait::async_trait;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, error, warn};

type HmacSha256 = Hmac<Sha256>;

/// Result of one channel's delivery attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Delivered,
    /// The channel has no credentials or endpoint configured
    NotConfigured,
    /// Switched off for this event type; the channel was not invoked
    Disabled,
    Failed(String),
}

impl Outcome {
    /// Whether the channel was invoked at all; an unconfigured channel
    /// still counts.
    pub fn is_attempted(&self) -> bool {
        !matches!(self, Outcome::Disabled)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Delivered => write!(f, "delivered"),
            Outcome::NotConfigured => write!(f, "not_configured"),
            Outcome::Disabled => write!(f, "disabled"),
            Outcome::Failed(reason) => write!(f, "failed:{}", reason),
        }
    }
}

/// An outbound notification channel
#[async_trait]
pub trait Channel: Send + Sync {
    fn name(&self) -> &'static str;

    async fn send(&self, message: &str) -> Outcome;
}

/// Sends a text message to one chat ID
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<()>;
}

/// Build the HTTP client shared by the push and webhook channels
pub fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder().timeout(timeout).build()?)
}

// ============================================================================
// Chat
// ============================================================================

/// Chat bot channel: one message per recipient
pub struct ChatChannel {
    transport: Option<Arc<dyn ChatTransport>>,
    recipients: Vec<i64>,
    timeout: Duration,
}

impl ChatChannel {
    pub fn new(transport: Option<Arc<dyn ChatTransport>>, recipients: Vec<i64>) -> Self {
        Self {
            transport,
            recipients,
            timeout: Duration::from_secs(5),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl Channel for ChatChannel {
    fn name(&self) -> &'static str {
        "chat"
    }

    async fn send(&self, message: &str) -> Outcome {
        let transport = match &self.transport {
            Some(t) => t,
            None => return Outcome::NotConfigured,
        };
        if self.recipients.is_empty() {
            debug!("Chat channel has no recipients");
            return Outcome::NotConfigured;
        }

        let mut failures = Vec::new();
        for &chat_id in &self.recipients {
            let result = tokio::time::timeout(self.timeout, transport.send_text(chat_id, message))
                .await
                .unwrap_or_else(|_| Err(Error::Channel("timed out".to_string())));

            if let Err(e) = result {
                error!("Chat send to {} failed: {}", chat_id, e);
                failures.push(format!("{}: {}", chat_id, e));
            }
        }

        if failures.is_empty() {
            Outcome::Delivered
        } else {
            Outcome::Failed(format!(
                "{}/{} recipients failed ({})",
                failures.len(),
                self.recipients.len(),
                failures.join("; ")
            ))
        }
    }
}

// ============================================================================
// Push (bearer-authenticated HTTP endpoint)
// ============================================================================

#[derive(Serialize)]
struct PushPayload<'a> {
    user_id: i64,
    message: &'a str,
}

/// HTTP push channel
pub struct PushChannel {
    client: reqwest::Client,
    url: Option<String>,
    token: String,
    user_id: i64,
}

impl PushChannel {
    pub fn new(client: reqwest::Client, url: Option<String>, token: String, user_id: i64) -> Self {
        Self {
            client,
            url,
            token,
            user_id,
        }
    }

    pub fn from_config(client: reqwest::Client, config: &Config) -> Self {
        Self::new(
            client,
            config.push_url.clone(),
            config.push_token.clone(),
            config.push_user_id,
        )
    }

    async fn post(&self, url: &str, message: &str) -> Result<()> {
        self.client
            .post(url)
            .bearer_auth(&self.token)
            .json(&PushPayload {
                user_id: self.user_id,
                message,
            })
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[async_trait]
impl Channel for PushChannel {
    fn name(&self) -> &'static str {
        "push"
    }

    async fn send(&self, message: &str) -> Outcome {
        let url = match &self.url {
            Some(u) => u,
            None => return Outcome::NotConfigured,
        };

        match self.post(url, message).await {
            Ok(()) => Outcome::Delivered,
            Err(e) => {
                error!("Push send failed: {}", e);
                Outcome::Failed(e.to_string())
            }
        }
    }
}

// ============================================================================
// Signed webhook
// ============================================================================

#[derive(Serialize)]
struct WebhookText<'a> {
    content: &'a str,
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    msgtype: &'static str,
    text: WebhookText<'a>,
}

#[derive(Deserialize)]
struct WebhookReply {
    #[serde(default)]
    errcode: i64,
    #[serde(default)]
    errmsg: String,
}

/// Sign `"<timestamp>\n<secret>"` with HMAC-SHA256 keyed by the secret.
///
/// Returns the base64 digest, URL-escaped for use as a query value.
pub fn sign_webhook(timestamp_ms: u128, secret: &str) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| Error::Channel(format!("webhook signing key: {}", e)))?;
    mac.update(format!("{}\n{}", timestamp_ms, secret).as_bytes());
    let digest = base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes());
    Ok(urlencoding::encode(&digest).into_owned())
}

/// Build the signed webhook URL
pub fn webhook_url(base: &str, token: &str, timestamp_ms: u128, secret: &str) -> Result<String> {
    let sign = sign_webhook(timestamp_ms, secret)?;
    let separator = if base.contains('?') { '&' } else { '?' };
    Ok(format!(
        "{}{}access_token={}&timestamp={}&sign={}",
        base,
        separator,
        urlencoding::encode(token),
        timestamp_ms,
        sign
    ))
}

/// Webhook channel with HMAC-signed URLs
pub struct WebhookChannel {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
    secret: String,
}

impl WebhookChannel {
    pub fn new(client: reqwest::Client, base_url: String, token: Option<String>, secret: String) -> Self {
        Self {
            client,
            base_url,
            token,
            secret,
        }
    }

    pub fn from_config(client: reqwest::Client, config: &Config) -> Self {
        Self::new(
            client,
            config.webhook_url.clone(),
            config.webhook_token.clone(),
            config.webhook_secret.clone(),
        )
    }

    async fn post(&self, token: &str, message: &str) -> Result<()> {
        let timestamp_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| Error::Channel(format!("system clock: {}", e)))?
            .as_millis();
        let url = webhook_url(&self.base_url, token, timestamp_ms, &self.secret)?;

        let response = self
            .client
            .post(url)
            .json(&WebhookPayload {
                msgtype: "text",
                text: WebhookText { content: message },
            })
            .send()
            .await?
            .error_for_status()?;

        // The service reports rejected requests with a 200 and a non-zero errcode
        let body = response.text().await?;
        if let Ok(reply) = serde_json::from_str::<WebhookReply>(&body) {
            if reply.errcode != 0 {
                return Err(Error::Channel(format!(
                    "errcode {}: {}",
                    reply.errcode, reply.errmsg
                )));
            }
        } else if !body.trim().is_empty() {
            warn!("Unexpected webhook reply: {}", body.chars().take(200).collect::<String>());
        }

        Ok(())
    }
}

#[async_trait]
impl Channel for WebhookChannel {
    fn name(&self) -> &'static str {
        "webhook"
    }

    async fn send(&self, message: &str) -> Outcome {
        let token = match &self.token {
            Some(t) => t,
            None => return Outcome::NotConfigured,
        };

        match self.post(token, message).await {
            Ok(()) => Outcome::Delivered,
            Err(e) => {
                error!("Webhook send failed: {}", e);
                Outcome::Failed(e.to_string())
            }
        }
    }
}
