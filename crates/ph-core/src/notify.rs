use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

/// Message delivered privately to a caller.
#[derive(Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notification {
    Created {
        vps_id: String,
        username: String,
        password: String,
        container: String,
        memory_gib: i32,
        cpu_cores: i32,
        disk_gib: i32,
    },
    PasswordRotated {
        vps_id: String,
        password: String,
    },
}

impl Notification {
    pub fn vps_id(&self) -> &str {
        match self {
            Self::Created { vps_id, .. } | Self::PasswordRotated { vps_id, .. } => vps_id,
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("delivery failed: {0}")]
pub struct DeliveryError(pub String);

/// Whether a committed change reached its recipient.
///
/// `Undelivered` never reverses the change; it only degrades the outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum Delivery {
    Delivered,
    Undelivered(String),
}

impl Delivery {
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered)
    }
}

/// Outbound channel to callers (direct messages in the chat front-end).
#[async_trait]
pub trait NotificationSink: Send + Sync + 'static {
    async fn deliver(
        &self,
        recipient: &str,
        notification: &Notification,
    ) -> Result<(), DeliveryError>;
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    recipient: &'a str,
    notification: &'a Notification,
}

/// Posts notifications as JSON to the front-end's delivery webhook.
#[derive(Clone)]
pub struct WebhookNotifier {
    url: String,
    http: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl NotificationSink for WebhookNotifier {
    async fn deliver(
        &self,
        recipient: &str,
        notification: &Notification,
    ) -> Result<(), DeliveryError> {
        let resp = self
            .http
            .post(&self.url)
            .json(&WebhookPayload {
                recipient,
                notification,
            })
            .send()
            .await
            .map_err(|e| DeliveryError(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(DeliveryError(format!("webhook returned {status}: {body}")));
        }

        debug!(recipient, vps_id = notification.vps_id(), "notification delivered");
        Ok(())
    }
}

/// Used when no delivery channel is configured. Every delivery fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDelivery;

#[async_trait]
impl NotificationSink for NoDelivery {
    async fn deliver(&self, _recipient: &str, _notification: &Notification) -> Result<(), DeliveryError> {
        Err(DeliveryError("no delivery channel configured".into()))
    }
}
