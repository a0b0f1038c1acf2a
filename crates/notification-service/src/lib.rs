mod smtp;
mod templates;

pub use smtp::SmtpNotifier;
pub use templates::EmailTemplate;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Per-channel delivery bound when `NOTIFICATION_TIMEOUT_SECS` is unset.
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// One instrument mentioned in an alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertItem {
    pub symbol: String,
    /// Signal label, e.g. "BUY".
    pub signal: String,
    /// Conviction of the signal (the scanner's score).
    pub strength: f64,
}

/// Alert types that trigger notifications.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AlertType {
    TradesSubmitted {
        items: Vec<AlertItem>,
    },
    /// Free-form operational notice (portfolio reset, failed run, ...).
    Notice,
}

/// A notification alert to be dispatched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub alert_type: AlertType,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub title: String,
    pub message: String,
}

impl Alert {
    pub fn new(
        alert_type: AlertType,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            alert_type,
            timestamp: chrono::Utc::now(),
            title: title.into(),
            message: message.into(),
        }
    }
}

/// Trait for notification channels.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    async fn send(&self, alert: &Alert) -> Result<(), NotificationError>;
    fn name(&self) -> &str;
}

/// Errors from the notification system.
#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("SMTP error: {0}")]
    Smtp(String),
    #[error("Discord webhook error: {0}")]
    Discord(String),
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Configuration for the notification service.
#[derive(Debug, Clone, Default)]
pub struct NotificationConfig {
    pub smtp_host: Option<String>,
    pub smtp_port: u16,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    pub smtp_from: Option<String>,
    pub smtp_to: Vec<String>,
    pub smtp_tls: SmtpTls,
    pub discord_webhook_url: Option<String>,
    pub send_timeout: Option<Duration>,
}

#[derive(Debug, Clone, Default)]
pub enum SmtpTls {
    #[default]
    StartTls,
    Tls,
    None,
}

impl NotificationConfig {
    /// Load from environment variables.
    pub fn from_env() -> Self {
        let smtp_to = std::env::var("NOTIFICATION_EMAIL_TO")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let smtp_tls = match std::env::var("SMTP_TLS").unwrap_or_default().as_str() {
            "tls" => SmtpTls::Tls,
            "none" => SmtpTls::None,
            _ => SmtpTls::StartTls,
        };

        Self {
            smtp_host: std::env::var("SMTP_HOST").ok().filter(|s| !s.is_empty()),
            smtp_port: std::env::var("SMTP_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(587),
            smtp_username: std::env::var("SMTP_USERNAME")
                .ok()
                .filter(|s| !s.is_empty()),
            smtp_password: std::env::var("SMTP_PASSWORD")
                .ok()
                .filter(|s| !s.is_empty()),
            smtp_from: std::env::var("SMTP_FROM_ADDRESS")
                .ok()
                .filter(|s| !s.is_empty()),
            smtp_to,
            smtp_tls,
            discord_webhook_url: std::env::var("DISCORD_WEBHOOK_URL")
                .ok()
                .filter(|s| !s.is_empty()),
            send_timeout: std::env::var("NOTIFICATION_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
        }
    }

    pub fn send_timeout(&self) -> Duration {
        self.send_timeout.unwrap_or(DEFAULT_SEND_TIMEOUT)
    }
}

/// Dispatches alerts to every configured channel.
pub struct NotificationService {
    channels: std::sync::Arc<Vec<Box<dyn NotificationChannel>>>,
}

impl NotificationService {
    pub fn new(config: &NotificationConfig) -> Self {
        let mut channels: Vec<Box<dyn NotificationChannel>> = Vec::new();

        // Add SMTP channel if configured
        if config.smtp_host.is_some() && config.smtp_from.is_some() && !config.smtp_to.is_empty() {
            match SmtpNotifier::new(config) {
                Ok(notifier) => {
                    tracing::info!(
                        "Email notifications enabled (SMTP -> {} recipients)",
                        config.smtp_to.len()
                    );
                    channels.push(Box::new(notifier));
                }
                Err(e) => {
                    tracing::warn!("Failed to initialize SMTP notifier: {}", e);
                }
            }
        }

        // Add Discord webhook channel if configured
        if let Some(ref webhook_url) = config.discord_webhook_url {
            match DiscordWebhookNotifier::new(webhook_url, config.send_timeout()) {
                Ok(notifier) => {
                    channels.push(Box::new(notifier));
                    tracing::info!("Discord webhook notifications enabled");
                }
                Err(e) => {
                    tracing::warn!("Failed to initialize Discord webhook notifier: {}", e);
                }
            }
        }

        if channels.is_empty() {
            tracing::info!(
                "No notification channels configured (set SMTP_HOST or DISCORD_WEBHOOK_URL)"
            );
        }

        Self::with_channels(channels)
    }

    pub fn with_channels(channels: Vec<Box<dyn NotificationChannel>>) -> Self {
        Self {
            channels: std::sync::Arc::new(channels),
        }
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Send alert to all channels, awaiting completion.
    ///
    /// Returns `true` only if at least one channel is configured and every
    /// channel accepted the alert.
    pub async fn send_alert_async(&self, alert: &Alert) -> bool {
        dispatch(&self.channels, alert).await
    }
}

async fn dispatch(channels: &[Box<dyn NotificationChannel>], alert: &Alert) -> bool {
    if channels.is_empty() {
        tracing::debug!("No notification channels, dropping alert '{}'", alert.title);
        return false;
    }

    let mut all_sent = true;
    for channel in channels.iter() {
        match channel.send(alert).await {
            Ok(()) => tracing::debug!("Sent notification via {}", channel.name()),
            Err(e) => {
                all_sent = false;
                tracing::warn!("Failed to send notification via {}: {}", channel.name(), e)
            }
        }
    }
    all_sent
}

/// Discord webhook notifier.
struct DiscordWebhookNotifier {
    webhook_url: String,
    client: reqwest::Client,
}

impl DiscordWebhookNotifier {
    fn new(webhook_url: &str, timeout: Duration) -> Result<Self, NotificationError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NotificationError::Config(format!("webhook client: {}", e)))?;
        Ok(Self {
            webhook_url: webhook_url.to_string(),
            client,
        })
    }
}

#[async_trait]
impl NotificationChannel for DiscordWebhookNotifier {
    async fn send(&self, alert: &Alert) -> Result<(), NotificationError> {
        let color = match &alert.alert_type {
            AlertType::TradesSubmitted { .. } => 0x00ff00,
            AlertType::Notice => 0x0099ff,
        };

        let fields: Vec<serde_json::Value> = match &alert.alert_type {
            AlertType::TradesSubmitted { items } => items
                .iter()
                .map(|item| {
                    serde_json::json!({
                        "name": item.symbol,
                        "value": format!("{} (score {:.1})", item.signal, item.strength),
                        "inline": true,
                    })
                })
                .collect(),
            AlertType::Notice => Vec::new(),
        };

        let payload = serde_json::json!({
            "embeds": [{
                "title": alert.title,
                "description": alert.message,
                "color": color,
                "fields": fields,
                "timestamp": alert.timestamp.to_rfc3339(),
            }]
        });

        let response = self
            .client
            .post(&self.webhook_url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| NotificationError::Discord(e.to_string()))?;

        if !response.status().is_success() {
            return Err(NotificationError::Discord(format!(
                "webhook returned {}",
                response.status()
            )));
        }

        Ok(())
    }

    fn name(&self) -> &str {
        "discord-webhook"
    }
}
