//! Generic JSON webhook channel.

use async_trait::async_trait;
use reqwest::Client;

use crate::error::Result;
use crate::notify::{Alert, AlertChannel, ChannelError, ChannelResult, channel_client};

/// POSTs the alert itself as the request body.
pub struct WebhookChannel {
    client: Client,
    url: String,
}

impl WebhookChannel {
    pub fn new(url: impl Into<String>, timeout_secs: u64) -> Result<Self> {
        Ok(Self {
            client: channel_client(timeout_secs)?,
            url: url.into(),
        })
    }
}

#[async_trait]
impl AlertChannel for WebhookChannel {
    fn name(&self) -> &str {
        "Webhook"
    }

    async fn send(&self, alert: &Alert) -> ChannelResult<()> {
        let response = self.client.post(&self.url).json(alert).send().await?;

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

    #[tokio::test]
    async fn test_unreachable_endpoint_fails() {
        let channel = WebhookChannel::new("http://127.0.0.1:9/alerts", 2).unwrap();
        assert!(channel.send(&Alert::warning("a", "m", None)).await.is_err());
        assert_eq!(channel.name(), "Webhook");
    }
}
