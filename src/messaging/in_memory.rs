//! # In-Memory Message Queue
//!
//! Thread-safe in-memory queue for tests and local runs.
//!
//! ## Features
//!
//! - **Visibility Timeout**: Messages become invisible after receive, re-visible after timeout
//! - **Delayed Send**: Messages sent with a delay stay invisible until it elapses
//! - **Inspection**: Snapshots and counters so tests can assert on queue effects

use super::errors::{MessagingError, MessagingResult};
use super::message::{MessageId, QueuedMessage, TaskEnvelope};
use super::queue::MessageQueue;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
struct InMemoryQueuedMessage {
    id: u64,
    body: String,
    enqueued_at: DateTime<Utc>,
    /// None = visible now
    visible_at: Option<DateTime<Utc>>,
    receive_count: u32,
}

impl InMemoryQueuedMessage {
    fn is_visible(&self, now: DateTime<Utc>) -> bool {
        self.visible_at.map(|vt| vt <= now).unwrap_or(true)
    }
}

/// Counters kept per queue
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InMemoryQueueStats {
    pub sent: u64,
    pub received: u64,
    pub deleted: u64,
    pub visibility_changes: u64,
}

/// Point-in-time view of a stored message
#[derive(Debug, Clone)]
pub struct InMemoryMessageSnapshot {
    pub message_id: MessageId,
    pub body: String,
    pub visible_at: Option<DateTime<Utc>>,
    pub receive_count: u32,
}

impl InMemoryMessageSnapshot {
    pub fn envelope(&self) -> MessagingResult<TaskEnvelope> {
        TaskEnvelope::from_body(&self.body)
    }
}

#[derive(Debug)]
struct InMemoryQueueState {
    messages: VecDeque<InMemoryQueuedMessage>,
    next_id: u64,
    stats: InMemoryQueueStats,
}

impl InMemoryQueueState {
    fn new() -> Self {
        Self {
            messages: VecDeque::new(),
            next_id: 1,
            stats: InMemoryQueueStats::default(),
        }
    }

    fn push(&mut self, body: String, delay: Duration) -> MessagingResult<MessageId> {
        let id = self.next_id;
        self.next_id += 1;
        self.stats.sent += 1;

        let now = Utc::now();
        let visible_at = if delay.is_zero() {
            None
        } else {
            Some(now + to_chrono(delay)?)
        };
        self.messages.push_back(InMemoryQueuedMessage {
            id,
            body,
            enqueued_at: now,
            visible_at,
            receive_count: 0,
        });
        Ok(MessageId::from(id))
    }

    fn position(&self, message_id: &MessageId) -> MessagingResult<usize> {
        let id: u64 = message_id
            .as_str()
            .parse()
            .map_err(|_| MessagingError::invalid_message_id(message_id.as_str()))?;
        self.messages
            .iter()
            .position(|m| m.id == id)
            .ok_or_else(|| MessagingError::message_not_found(message_id.as_str()))
    }
}

fn to_chrono(duration: Duration) -> MessagingResult<chrono::Duration> {
    chrono::Duration::from_std(duration)
        .map_err(|e| MessagingError::invalid_delay(e.to_string()))
}

#[derive(Debug, Default)]
pub struct InMemoryQueue {
    queues: RwLock<HashMap<String, InMemoryQueueState>>,
}

impl InMemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue an arbitrary body, bypassing envelope validation
    pub async fn send_raw(&self, queue_name: &str, body: impl Into<String>) -> MessagingResult<MessageId> {
        let mut queues = self.queues.write().await;
        let queue = queues
            .get_mut(queue_name)
            .ok_or_else(|| MessagingError::queue_not_found(queue_name))?;
        queue.push(body.into(), Duration::ZERO)
    }

    /// Number of stored messages, visible or not
    pub async fn queue_length(&self, queue_name: &str) -> usize {
        let queues = self.queues.read().await;
        queues.get(queue_name).map(|q| q.messages.len()).unwrap_or(0)
    }

    pub async fn stats(&self, queue_name: &str) -> InMemoryQueueStats {
        let queues = self.queues.read().await;
        queues.get(queue_name).map(|q| q.stats).unwrap_or_default()
    }

    pub async fn snapshot(&self, queue_name: &str) -> Vec<InMemoryMessageSnapshot> {
        let queues = self.queues.read().await;
        queues
            .get(queue_name)
            .map(|q| {
                q.messages
                    .iter()
                    .map(|m| InMemoryMessageSnapshot {
                        message_id: MessageId::from(m.id),
                        body: m.body.clone(),
                        visible_at: m.visible_at,
                        receive_count: m.receive_count,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Make every message visible immediately
    pub async fn release_all(&self, queue_name: &str) {
        let mut queues = self.queues.write().await;
        if let Some(queue) = queues.get_mut(queue_name) {
            for msg in queue.messages.iter_mut() {
                msg.visible_at = None;
            }
        }
    }

    pub async fn clear_queue(&self, queue_name: &str) {
        let mut queues = self.queues.write().await;
        if let Some(queue) = queues.get_mut(queue_name) {
            queue.messages.clear();
        }
    }
}

#[async_trait]
impl MessageQueue for InMemoryQueue {
    async fn ensure_queue(&self, queue_name: &str) -> MessagingResult<()> {
        let mut queues = self.queues.write().await;
        queues
            .entry(queue_name.to_string())
            .or_insert_with(InMemoryQueueState::new);
        Ok(())
    }

    async fn send(
        &self,
        queue_name: &str,
        envelope: &TaskEnvelope,
        delay: Duration,
    ) -> MessagingResult<MessageId> {
        envelope.validate()?;
        let body = envelope.to_json()?;

        let mut queues = self.queues.write().await;
        let queue = queues
            .get_mut(queue_name)
            .ok_or_else(|| MessagingError::queue_not_found(queue_name))?;
        queue.push(body, delay)
    }

    async fn receive(
        &self,
        queue_name: &str,
        max_messages: usize,
        visibility_timeout: Duration,
    ) -> MessagingResult<Vec<QueuedMessage>> {
        let mut queues = self.queues.write().await;
        let queue = queues
            .get_mut(queue_name)
            .ok_or_else(|| MessagingError::queue_not_found(queue_name))?;

        let now = Utc::now();
        let visible_until = now + to_chrono(visibility_timeout)?;
        let mut received = Vec::new();

        for msg in queue.messages.iter_mut() {
            if received.len() >= max_messages {
                break;
            }
            if msg.is_visible(now) {
                msg.visible_at = Some(visible_until);
                msg.receive_count += 1;
                received.push(QueuedMessage {
                    message_id: MessageId::from(msg.id),
                    body: msg.body.clone(),
                    receive_count: msg.receive_count,
                    enqueued_at: msg.enqueued_at,
                });
            }
        }
        queue.stats.received += received.len() as u64;

        Ok(received)
    }

    async fn delete(&self, queue_name: &str, message_id: &MessageId) -> MessagingResult<()> {
        let mut queues = self.queues.write().await;
        let queue = queues
            .get_mut(queue_name)
            .ok_or_else(|| MessagingError::queue_not_found(queue_name))?;

        let pos = queue.position(message_id)?;
        queue.messages.remove(pos);
        queue.stats.deleted += 1;
        Ok(())
    }

    async fn change_visibility(
        &self,
        queue_name: &str,
        message_id: &MessageId,
        delay: Duration,
    ) -> MessagingResult<()> {
        let mut queues = self.queues.write().await;
        let queue = queues
            .get_mut(queue_name)
            .ok_or_else(|| MessagingError::queue_not_found(queue_name))?;

        let pos = queue.position(message_id)?;
        let visible_at = Utc::now() + to_chrono(delay)?;
        queue.messages[pos].visible_at = Some(visible_at);
        queue.stats.visibility_changes += 1;
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        "in_memory"
    }
}
