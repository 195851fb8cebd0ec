//! Operator alerts.
//!
//! Alerting is best-effort: channel failures are logged and swallowed, and
//! [`AlertDispatcher::dispatch`] never returns an error.

pub mod slack;
pub mod webhook;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::AlertSettings;
use crate::pipeline::drift::DriftVerdict;

pub use slack::SlackChannel;
pub use webhook::WebhookChannel;

/// Alert category; decides the framing of the notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    Error,
    StructureChange,
    Warning,
}

impl AlertKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::Error => "error",
            AlertKind::StructureChange => "structure_change",
            AlertKind::Warning => "warning",
        }
    }

    /// Upper-case heading used in chat messages.
    pub fn label(&self) -> &'static str {
        match self {
            AlertKind::Error => "ERROR",
            AlertKind::StructureChange => "STRUCTURE_CHANGE",
            AlertKind::Warning => "WARNING",
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            AlertKind::Error => "🚨",
            AlertKind::StructureChange => "⚠️",
            AlertKind::Warning => "⚡",
        }
    }

    /// Slack attachment color.
    pub fn color(&self) -> &'static str {
        match self {
            AlertKind::Error => "danger",
            AlertKind::StructureChange => "warning",
            AlertKind::Warning => "#FFA500",
        }
    }
}

/// One alert. Created, dispatched and dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    #[serde(rename = "type")]
    pub kind: AlertKind,
    pub site_name: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

impl Alert {
    /// Terminal failure of a source.
    pub fn error(site: impl Into<String>, error: &AppError) -> Self {
        Self {
            kind: AlertKind::Error,
            site_name: site.into(),
            message: error.to_string(),
            details: Some(serde_json::json!({
                "errorType": error.kind(),
                "retryable": error.is_retryable(),
                "trace": error.trace(),
            })),
            timestamp: Utc::now(),
        }
    }

    /// Structural drift of a source.
    pub fn structure_change(site: impl Into<String>, verdict: &DriftVerdict) -> Self {
        let message = verdict
            .reason()
            .map(ToString::to_string)
            .unwrap_or_else(|| "Structure change detected".to_string());
        Self {
            kind: AlertKind::StructureChange,
            site_name: site.into(),
            message,
            details: Some(serde_json::json!({
                "currentCount": verdict.current_count(),
                "avgCount": verdict.avg_count(),
            })),
            timestamp: Utc::now(),
        }
    }

    pub fn warning(
        site: impl Into<String>,
        message: impl Into<String>,
        details: Option<serde_json::Value>,
    ) -> Self {
        Self {
            kind: AlertKind::Warning,
            site_name: site.into(),
            message: message.into(),
            details,
            timestamp: Utc::now(),
        }
    }
}

/// Result type for channel operations
pub type ChannelResult<T> = std::result::Result<T, ChannelError>;

/// Errors that can occur while delivering an alert
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Endpoint answered with a non-success status
    #[error("{channel} API error: {status}")]
    Status { channel: String, status: u16 },

    /// Generic error
    #[error("Channel error: {0}")]
    Other(String),
}

/// A destination for alerts.
#[async_trait]
pub trait AlertChannel: Send + Sync {
    fn name(&self) -> &str;

    async fn send(&self, alert: &Alert) -> ChannelResult<()>;
}

/// Build the HTTP client shared by the channels.
pub(crate) fn channel_client(timeout_secs: u64) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()?)
}

/// Fans alerts out to every configured channel.
#[derive(Default)]
pub struct AlertDispatcher {
    channels: Vec<Box<dyn AlertChannel>>,
}

impl AlertDispatcher {
    pub fn new(channels: Vec<Box<dyn AlertChannel>>) -> Self {
        Self { channels }
    }

    /// Channels for every URL present in the settings.
    pub fn from_settings(settings: &AlertSettings, offset: FixedOffset) -> Result<Self> {
        let mut channels: Vec<Box<dyn AlertChannel>> = Vec::new();
        if let Some(url) = &settings.slack_webhook_url {
            channels.push(Box::new(SlackChannel::new(url, offset, settings.timeout_secs)?));
        }
        if let Some(url) = &settings.webhook_url {
            channels.push(Box::new(WebhookChannel::new(url, settings.timeout_secs)?));
        }
        Ok(Self::new(channels))
    }

    pub fn with_channel(mut self, channel: Box<dyn AlertChannel>) -> Self {
        self.channels.push(channel);
        self
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Deliver to all channels concurrently. Returns how many succeeded.
    pub async fn dispatch(&self, alert: &Alert) -> usize {
        log::warn!(
            "[ALERT] {}: {} - {}",
            alert.kind.label(),
            alert.site_name,
            alert.message
        );

        if self.channels.is_empty() {
            log::warn!("No alert channels configured (SLACK_WEBHOOK_URL or ALERT_WEBHOOK_URL)");
            return 0;
        }

        let results = join_all(self.channels.iter().map(|c| c.send(alert))).await;
        let mut delivered = 0;
        for (channel, result) in self.channels.iter().zip(results) {
            match result {
                Ok(()) => {
                    log::info!("{} notification sent", channel.name());
                    delivered += 1;
                }
                Err(e) => log::error!("Failed to send {} notification: {}", channel.name(), e),
            }
        }
        delivered
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::pipeline::drift::DriftReason;

    #[test]
    fn test_alert_payload_shape() {
        let alert = Alert::error(
            "泰阜村役場",
            &AppError::Timeout {
                url: "https://x".into(),
                after_ms: 10_000,
            },
        );
        let json = serde_json::to_value(&alert).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["siteName"], "泰阜村役場");
        assert_eq!(json["details"]["errorType"], "network");
        assert_eq!(json["details"]["retryable"], true);
        assert!(json["timestamp"].is_string());
    }

    #[test]
    fn test_structure_change_details() {
        let verdict = DriftVerdict::Drifted {
            reason: DriftReason::CountDrop {
                current: 5,
                avg: 20.0,
            },
            current_count: 5,
            avg_count: 20.0,
        };
        let alert = Alert::structure_change("a", &verdict);
        assert_eq!(alert.kind, AlertKind::StructureChange);
        assert!(alert.message.contains("5 vs avg 20.0"));
        let details = alert.details.unwrap();
        assert_eq!(details["currentCount"], 5);
        assert_eq!(details["avgCount"], 20.0);
    }

    #[tokio::test]
    async fn test_dispatch_swallows_channel_failures() {
        let recording = RecordingChannel::default();
        let dispatcher = AlertDispatcher::default()
            .with_channel(Box::new(FailingChannel))
            .with_channel(Box::new(recording.clone()));

        let delivered = dispatcher
            .dispatch(&Alert::warning("a", "partial insert", None))
            .await;
        assert_eq!(delivered, 1);
        assert_eq!(recording.alerts().len(), 1);
    }

    #[tokio::test]
    async fn test_dispatch_without_channels() {
        let dispatcher = AlertDispatcher::default();
        assert_eq!(
            dispatcher.dispatch(&Alert::warning("a", "m", None)).await,
            0
        );
    }

    #[test]
    fn test_from_settings() {
        let settings = AlertSettings {
            slack_webhook_url: Some("https://hooks.slack.com/services/x".into()),
            webhook_url: Some("https://alerts.example.com/hook".into()),
            ..AlertSettings::default()
        };
        let offset = FixedOffset::east_opt(9 * 3600).unwrap();
        let dispatcher = AlertDispatcher::from_settings(&settings, offset).unwrap();
        assert_eq!(dispatcher.channel_count(), 2);
        assert_eq!(
            AlertDispatcher::from_settings(&AlertSettings::default(), offset)
                .unwrap()
                .channel_count(),
            0
        );
    }
}
