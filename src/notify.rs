use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationType {
    Info,
    Warning,
    Error,
    Success,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::Info => "info",
            NotificationType::Warning => "warning",
            NotificationType::Error => "error",
            NotificationType::Success => "success",
        }
    }
}

/// A progress event. Observational only; never affects control flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    #[serde(rename = "type")]
    pub kind: NotificationType,
    pub message: String,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl Notification {
    pub fn new(kind: NotificationType, message: impl Into<String>) -> Self {
        Notification {
            kind,
            message: message.into(),
            timestamp: Utc::now().to_rfc3339(),
            details: None,
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(NotificationType::Info, message)
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new(NotificationType::Success, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(NotificationType::Error, message)
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// Identity of one run, threaded through stage calls so notifications can be
/// routed without the pipeline carrying the callback around by hand.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub request_id: String,
    pub callback_url: Option<String>,
}

impl RunContext {
    pub fn new(request_id: impl Into<String>, callback_url: Option<String>) -> Self {
        RunContext {
            request_id: request_id.into(),
            callback_url,
        }
    }
}

/// Observer seam for progress events. Fire-and-forget: implementations must
/// never propagate delivery failures back into the pipeline.
#[async_trait]
pub trait Notify: Send + Sync {
    async fn notify(&self, request_id: &str, notification: &Notification, callback_url: Option<&str>);
}

/// Production notifier: logs locally, then makes one best-effort delivery to
/// the caller's webhook when one is registered.
pub struct WebhookNotifier {
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(WebhookNotifier { client })
    }
}

#[async_trait]
impl Notify for WebhookNotifier {
    async fn notify(&self, request_id: &str, notification: &Notification, callback_url: Option<&str>) {
        let tag = notification.kind.as_str().to_uppercase();
        match notification.kind {
            NotificationType::Error => log::error!("[{request_id}] {tag}: {}", notification.message),
            NotificationType::Warning => log::warn!("[{request_id}] {tag}: {}", notification.message),
            _ => log::info!("[{request_id}] {tag}: {}", notification.message),
        }
        if let Some(details) = &notification.details {
            log::debug!("[{request_id}] details: {details}");
        }

        if let Some(url) = callback_url {
            if let Err(err) = self.client.post(url).json(notification).send().await {
                log::warn!("[{request_id}] failed to send notification: {err}");
            }
        }
    }
}
