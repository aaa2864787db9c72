//! Concrete notification transports.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tracing::info;
use watchdog_engine::NotificationTransport;

use crate::config::NotificationConfig;

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    subject: &'a str,
    body: &'a str,
    recipients: &'a [String],
}

/// POSTs each notification as JSON to an HTTP endpoint.
pub struct WebhookTransport {
    client: reqwest::Client,
    url: String,
    token: Option<SecretString>,
}

impl WebhookTransport {
    pub fn new(url: String, token: Option<SecretString>, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("supply-watchdog/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("building HTTP client")?;
        Ok(Self { client, url, token })
    }
}

#[async_trait]
impl NotificationTransport for WebhookTransport {
    fn name(&self) -> &str { "webhook" }

    async fn send(&self, subject: &str, body: &str, recipients: &[String]) -> anyhow::Result<()> {
        let payload = WebhookPayload { subject, body, recipients };
        let mut request = self.client.post(&self.url).json(&payload);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token.expose_secret());
        }

        let response = request.send().await.context("webhook request failed")?;
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            anyhow::bail!("webhook returned {status}: {}", detail.trim());
        }
        Ok(())
    }
}

/// Writes notifications to the log. Used when no webhook is configured.
pub struct LogTransport;

#[async_trait]
impl NotificationTransport for LogTransport {
    fn name(&self) -> &str { "log" }

    async fn send(&self, subject: &str, body: &str, recipients: &[String]) -> anyhow::Result<()> {
        info!(recipients = recipients.len(), body_bytes = body.len(), "Notification: {subject}");
        Ok(())
    }
}

/// Pick the transport the configuration asks for.
pub fn build(config: &NotificationConfig) -> anyhow::Result<Arc<dyn NotificationTransport>> {
    match config.webhook_url.as_deref().map(str::trim).filter(|u| !u.is_empty()) {
        Some(url) => {
            let token = config
                .webhook_token
                .as_ref()
                .map(|t| SecretString::from(t.expose_secret().to_string()));
            let transport = WebhookTransport::new(
                url.to_string(),
                token,
                Duration::from_secs(config.request_timeout_secs),
            )?;
            Ok(Arc::new(transport))
        }
        None => Ok(Arc::new(LogTransport)),
    }
}
