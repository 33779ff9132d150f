//! # Operator Notifications
//!
//! Fire-and-forget alerts to the operator channel. Delivery failures are
//! never surfaced to callers.

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::warn;

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, message: &str);

    /// `Notification from {source}\n{message}`
    async fn notify_admins(&self, source: &str, message: &str) {
        self.notify(&format!("Notification from {source}\n{message}")).await;
    }

    /// `Error occurs when executing action {source} : {message}`
    async fn notify_error(&self, source: &str, message: &str) {
        self.notify(&format!(
            "Error occurs when executing action {source} : {message}"
        ))
        .await;
    }
}

/// Emits notifications as structured log events
#[derive(Debug, Clone, Default)]
pub struct TracingNotifier {
    channel: String,
}

impl TracingNotifier {
    pub fn new(channel: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
        }
    }
}

#[async_trait]
impl Notifier for TracingNotifier {
    async fn notify(&self, message: &str) {
        warn!(channel = %self.channel, notification = %message, "📣 OPERATOR_NOTIFICATION");
    }
}

/// Keeps every notification in memory
#[derive(Debug, Default)]
pub struct MemoryNotifier {
    messages: Mutex<Vec<String>>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().clone()
    }

    pub fn count_containing(&self, needle: &str) -> usize {
        self.messages
            .lock()
            .iter()
            .filter(|m| m.contains(needle))
            .count()
    }

    pub fn clear(&self) {
        self.messages.lock().clear();
    }
}

#[async_trait]
impl Notifier for MemoryNotifier {
    async fn notify(&self, message: &str) {
        self.messages.lock().push(message.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_admin_and_error_formats() {
        let notifier = MemoryNotifier::new();
        notifier.notify_admins("ProcessReportV1Action", "50 attempts").await;
        notifier.notify_error("PingAction", "boom").await;

        let messages = notifier.messages();
        assert_eq!(messages[0], "Notification from ProcessReportV1Action\n50 attempts");
        assert_eq!(messages[1], "Error occurs when executing action PingAction : boom");
        assert_eq!(notifier.count_containing("attempts"), 1);
    }
}
