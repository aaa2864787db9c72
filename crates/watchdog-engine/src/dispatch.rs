//! Notification Dispatcher and its background worker.
//!
//! The orchestrator hands a rendered [`Notification`] to a
//! [`NotificationWorker`] and returns immediately. The worker owns delivery:
//! up to `max_retries + 1` attempts with a fixed backoff, then a logged
//! failure. Delivery outcomes never reach the run result.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::policy::DeliveryPolicy;
use crate::report::Notification;

/// Capability to deliver one message. Timeouts are the transport's concern.
#[async_trait]
pub trait NotificationTransport: Send + Sync {
    fn name(&self) -> &str;

    async fn send(&self, subject: &str, body: &str, recipients: &[String]) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryOutcome {
    pub delivered: bool,
    pub attempts: u32,
}

/// Sends notifications through one transport with bounded retry.
pub struct Dispatcher {
    transport: Arc<dyn NotificationTransport>,
    recipients: Vec<String>,
    max_retries: u32,
    backoff: Duration,
}

impl Dispatcher {
    pub fn new(transport: Arc<dyn NotificationTransport>, recipients: Vec<String>, policy: &DeliveryPolicy) -> Self {
        Self {
            transport,
            recipients,
            max_retries: policy.max_retries,
            backoff: Duration::from_millis(policy.retry_backoff_ms),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Try to deliver, retrying failed sends. Never returns an error.
    pub async fn deliver(&self, notification: &Notification) -> DeliveryOutcome {
        if self.recipients.is_empty() {
            warn!(transport = self.transport.name(), "No recipients configured, notification not sent");
            return DeliveryOutcome { delivered: false, attempts: 0 };
        }

        let max_attempts = self.max_attempts();
        for attempt in 1..=max_attempts {
            match self.transport.send(&notification.subject, &notification.body, &self.recipients).await {
                Ok(()) => {
                    info!(
                        transport = self.transport.name(),
                        attempt,
                        recipients = self.recipients.len(),
                        "Notification sent: {}",
                        notification.subject
                    );
                    return DeliveryOutcome { delivered: true, attempts: attempt };
                }
                Err(e) => {
                    warn!(transport = self.transport.name(), attempt, max_attempts, "Notification send failed: {e:#}");
                    if attempt < max_attempts && !self.backoff.is_zero() {
                        tokio::time::sleep(self.backoff).await;
                    }
                }
            }
        }

        error!(attempts = max_attempts, "Notification not delivered after {max_attempts} attempts: {}", notification.subject);
        DeliveryOutcome { delivered: false, attempts: max_attempts }
    }
}

/// Background delivery queue.
///
/// Submitting never blocks. Dropping the handle without calling
/// [`NotificationWorker::shutdown`] abandons queued messages once the
/// runtime stops.
pub struct NotificationWorker {
    tx: mpsc::UnboundedSender<Notification>,
    handle: JoinHandle<Vec<DeliveryOutcome>>,
}

impl NotificationWorker {
    pub fn start(dispatcher: Dispatcher) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Notification>();

        let handle = tokio::spawn(async move {
            info!(transport = dispatcher.transport.name(), "Started notification worker");
            let mut outcomes = Vec::new();
            while let Some(notification) = rx.recv().await {
                outcomes.push(dispatcher.deliver(&notification).await);
            }
            outcomes
        });

        Self { tx, handle }
    }

    /// A cloneable sender for the orchestrator.
    pub fn sender(&self) -> mpsc::UnboundedSender<Notification> {
        self.tx.clone()
    }

    /// Close the queue and wait for queued deliveries to finish.
    ///
    /// Outstanding [`sender`](Self::sender) clones keep the queue open, so
    /// drop them first.
    pub async fn shutdown(self) -> Vec<DeliveryOutcome> {
        drop(self.tx);
        match self.handle.await {
            Ok(outcomes) => outcomes,
            Err(e) => {
                error!("Notification worker panicked: {e}");
                Vec::new()
            }
        }
    }
}
