//! Notification channel: fire-and-forget, failures logged and swallowed,
//! never blocking the control loop.

pub mod webhook;

use chrono::{DateTime, Utc};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationEvent {
    pub title: String,
    pub body: String,
    pub ts: DateTime<Utc>,
}

#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, event: &NotificationEvent) -> anyhow::Result<()>;
    fn name(&self) -> &'static str;
}

/// Fans one event out to every configured channel.
#[derive(Default)]
pub struct NotifierMux {
    sinks: Vec<Box<dyn Notifier>>,
}

impl NotifierMux {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, notifier: Box<dyn Notifier>) -> Self {
        self.sinks.push(notifier);
        self
    }

    /// Log channel always; webhook when `PACER_WEBHOOK_URL` is set.
    pub fn from_env() -> Self {
        let mut mux = Self::new().with(Box::new(LogNotifier));
        if let Ok(url) = std::env::var("PACER_WEBHOOK_URL") {
            mux = mux.with(Box::new(webhook::WebhookNotifier::new(url)));
        }
        mux
    }

    pub async fn notify(&self, event: &NotificationEvent) {
        for sink in &self.sinks {
            if let Err(e) = sink.send(event).await {
                tracing::warn!(error = ?e, channel = sink.name(), "notification failed");
            }
        }
    }
}

/// Channel of last resort: the structured log.
pub struct LogNotifier;

#[async_trait::async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, event: &NotificationEvent) -> anyhow::Result<()> {
        tracing::info!(title = %event.title, body = %event.body, "notification");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}
