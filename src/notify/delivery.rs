use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("Delivery request failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("Delivery endpoint returned HTTP {0}")]
    HttpStatus(u16),
    #[error("Delivery timed out")]
    Timeout,
    #[error("Failed to encode message: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Sends one rendered message to a destination channel.
#[async_trait]
pub trait Delivery: Send + Sync {
    async fn send(&self, channel_id: &str, text: &str) -> Result<(), DeliveryError>;
}

#[derive(Debug, Serialize)]
struct WebhookMessage<'a> {
    channel_id: &'a str,
    content: &'a str,
}

/// POSTs `{"channel_id": ..., "content": ...}` to a fixed endpoint.
pub struct WebhookDelivery {
    client: reqwest::Client,
    url: Url,
    token: Option<SecretString>,
    timeout: Duration,
}

impl WebhookDelivery {
    pub fn new(
        client: reqwest::Client,
        url: Url,
        token: Option<SecretString>,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            url,
            token,
            timeout,
        }
    }
}

#[async_trait]
impl Delivery for WebhookDelivery {
    async fn send(&self, channel_id: &str, text: &str) -> Result<(), DeliveryError> {
        let body = serde_json::to_vec(&WebhookMessage {
            channel_id,
            content: text,
        })?;

        let mut request = self
            .client
            .post(self.url.clone())
            .header(CONTENT_TYPE, "application/json")
            .body(body);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token.expose_secret());
        }

        let response = tokio::time::timeout(self.timeout, request.send())
            .await
            .map_err(|_| DeliveryError::Timeout)??;

        let status = response.status();
        if !status.is_success() {
            return Err(DeliveryError::HttpStatus(status.as_u16()));
        }
        tracing::debug!(channel_id = %channel_id, status = %status, "Webhook accepted message");
        Ok(())
    }
}

/// Writes messages to the log instead of sending them (dry runs).
#[derive(Debug, Default)]
pub struct LogDelivery;

#[async_trait]
impl Delivery for LogDelivery {
    async fn send(&self, channel_id: &str, text: &str) -> Result<(), DeliveryError> {
        tracing::info!(channel_id = %channel_id, message = %text, "Notification");
        Ok(())
    }
}
