//! Slack incoming-webhook channel.

use async_trait::async_trait;
use chrono::FixedOffset;
use reqwest::Client;
use serde_json::{Value, json};

use crate::error::Result;
use crate::notify::{Alert, AlertChannel, ChannelError, ChannelResult, channel_client};

pub struct SlackChannel {
    client: Client,
    webhook_url: String,
    offset: FixedOffset,
}

impl SlackChannel {
    /// `offset` is the zone the alert time is shown in.
    pub fn new(webhook_url: impl Into<String>, offset: FixedOffset, timeout_secs: u64) -> Result<Self> {
        Ok(Self {
            client: channel_client(timeout_secs)?,
            webhook_url: webhook_url.into(),
            offset,
        })
    }

    /// Message body with one colored attachment.
    pub fn payload(&self, alert: &Alert) -> Value {
        let time = alert
            .timestamp
            .with_timezone(&self.offset)
            .format("%Y/%m/%d %H:%M:%S")
            .to_string();

        let mut fields = vec![
            json!({ "title": "Site", "value": alert.site_name, "short": true }),
            json!({ "title": "Time", "value": time, "short": true }),
            json!({ "title": "Message", "value": alert.message, "short": false }),
        ];
        if let Some(details) = &alert.details {
            let pretty = serde_json::to_string_pretty(details).unwrap_or_else(|_| details.to_string());
            fields.push(json!({
                "title": "Details",
                "value": format!("```{pretty}```"),
                "short": false,
            }));
        }

        json!({
            "text": format!("{} *{}*: {}", alert.kind.emoji(), alert.kind.label(), alert.site_name),
            "attachments": [{
                "color": alert.kind.color(),
                "fields": fields,
            }],
        })
    }
}

#[async_trait]
impl AlertChannel for SlackChannel {
    fn name(&self) -> &str {
        "Slack"
    }

    async fn send(&self, alert: &Alert) -> ChannelResult<()> {
        let response = self
            .client
            .post(&self.webhook_url)
            .json(&self.payload(alert))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ChannelError::Status {
                channel: self.name().to_string(),
                status: status.as_u16(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use chrono::{TimeZone, Utc};

    fn channel() -> SlackChannel {
        SlackChannel::new(
            "https://hooks.slack.com/services/T/B/X",
            FixedOffset::east_opt(9 * 3600).unwrap(),
            5,
        )
        .unwrap()
    }

    #[test]
    fn test_error_payload() {
        let mut alert = Alert::error("根羽村役場", &AppError::parse("feed", "bad root"));
        alert.timestamp = Utc.with_ymd_and_hms(2025, 11, 7, 1, 30, 0).unwrap();

        let payload = channel().payload(&alert);
        assert_eq!(payload["text"], "🚨 *ERROR*: 根羽村役場");

        let attachment = &payload["attachments"][0];
        assert_eq!(attachment["color"], "danger");
        assert_eq!(attachment["fields"][0]["value"], "根羽村役場");
        // 01:30 UTC is 10:30 in UTC+9
        assert_eq!(attachment["fields"][1]["value"], "2025/11/07 10:30:00");
        let details = attachment["fields"][3]["value"].as_str().unwrap();
        assert!(details.starts_with("```{"));
        assert!(details.contains("\"errorType\": \"parsing\""));
    }

    #[test]
    fn test_warning_without_details() {
        let payload = channel().payload(&Alert::warning("a", "1 insert failed", None));
        assert_eq!(payload["text"], "⚡ *WARNING*: a");
        assert_eq!(payload["attachments"][0]["color"], "#FFA500");
        assert_eq!(payload["attachments"][0]["fields"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_unreachable_webhook_is_channel_error() {
        let channel = SlackChannel::new(
            "http://127.0.0.1:9/hook",
            FixedOffset::east_opt(0).unwrap(),
            2,
        )
        .unwrap();
        let result = channel.send(&Alert::warning("a", "m", None)).await;
        assert!(matches!(result, Err(ChannelError::Http(_))));
    }
}
