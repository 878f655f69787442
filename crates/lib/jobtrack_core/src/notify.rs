//! Outbound notification sink.
//!
//! The session layer only hands off template kind + data; rendering and
//! delivery belong to whatever implements [`Notifier`].

use std::sync::Mutex;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tracing::info;

/// Notification templates the session layer sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateKind {
    PasswordReset,
    EmailChange,
}

/// Delivery failure.
#[derive(Debug, Error)]
#[error("notification delivery failed: {0}")]
pub struct NotifyError(pub String);

/// Fire-and-forget message delivery.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(
        &self,
        recipient: &str,
        kind: TemplateKind,
        data: serde_json::Value,
    ) -> Result<(), NotifyError>;
}

/// Notifier that only logs. Used when no mail transport is configured.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(
        &self,
        recipient: &str,
        kind: TemplateKind,
        _data: serde_json::Value,
    ) -> Result<(), NotifyError> {
        info!(recipient, ?kind, "notification queued (log transport)");
        Ok(())
    }
}

/// A notification captured by [`MemoryNotifier`].
#[derive(Debug, Clone)]
pub struct SentNotification {
    pub recipient: String,
    pub kind: TemplateKind,
    pub data: serde_json::Value,
}

/// Notifier that records every message, for tests and local tooling.
#[derive(Debug, Default)]
pub struct MemoryNotifier {
    sent: Mutex<Vec<SentNotification>>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything sent so far.
    pub fn sent(&self) -> Vec<SentNotification> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// The most recent notification of `kind`.
    pub fn last(&self, kind: TemplateKind) -> Option<SentNotification> {
        self.sent().into_iter().rev().find(|n| n.kind == kind)
    }
}

#[async_trait]
impl Notifier for MemoryNotifier {
    async fn send(
        &self,
        recipient: &str,
        kind: TemplateKind,
        data: serde_json::Value,
    ) -> Result<(), NotifyError> {
        let mut sent = self
            .sent
            .lock()
            .map_err(|_| NotifyError("notifier poisoned".into()))?;
        sent.push(SentNotification {
            recipient: recipient.to_string(),
            kind,
            data,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_notifier_records_messages() {
        let notifier = MemoryNotifier::new();
        notifier
            .send("a@x.com", TemplateKind::PasswordReset, serde_json::json!({"k": 1}))
            .await
            .unwrap();
        notifier
            .send("b@x.com", TemplateKind::EmailChange, serde_json::json!({}))
            .await
            .unwrap();

        assert_eq!(notifier.sent().len(), 2);
        let last = notifier.last(TemplateKind::PasswordReset).unwrap();
        assert_eq!(last.recipient, "a@x.com");
        assert_eq!(last.data["k"], 1);
    }

    #[tokio::test]
    async fn log_notifier_always_succeeds() {
        assert!(
            LogNotifier
                .send("a@x.com", TemplateKind::EmailChange, serde_json::Value::Null)
                .await
                .is_ok()
        );
    }
}
