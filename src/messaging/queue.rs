//! # Message Queue Trait
//!
//! Provider-agnostic at-least-once queue with visibility timeouts. A received
//! message stays invisible to other consumers until its visibility timeout
//! expires; it is gone only after `delete`.

use super::errors::MessagingResult;
use super::message::{MessageId, QueuedMessage, TaskEnvelope};
use async_trait::async_trait;
use std::time::Duration;

#[async_trait]
pub trait MessageQueue: Send + Sync + 'static {
    /// Create the queue if it does not exist (idempotent)
    async fn ensure_queue(&self, queue_name: &str) -> MessagingResult<()>;

    /// Enqueue an envelope that becomes visible after `delay`
    async fn send(
        &self,
        queue_name: &str,
        envelope: &TaskEnvelope,
        delay: Duration,
    ) -> MessagingResult<MessageId>;

    /// Receive up to `max_messages` visible messages, hiding them for `visibility_timeout`
    async fn receive(
        &self,
        queue_name: &str,
        max_messages: usize,
        visibility_timeout: Duration,
    ) -> MessagingResult<Vec<QueuedMessage>>;

    async fn delete(&self, queue_name: &str, message_id: &MessageId) -> MessagingResult<()>;

    /// Make a received message visible again after `delay` from now
    async fn change_visibility(
        &self,
        queue_name: &str,
        message_id: &MessageId,
        delay: Duration,
    ) -> MessagingResult<()>;

    /// Drop pooled connections so a restarted worker reconnects cleanly
    async fn reset_connections(&self) {}

    fn provider_name(&self) -> &'static str;
}
