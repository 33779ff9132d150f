//! # PostgreSQL Message Queue (pgmq)
//!
//! `MessageQueue` over the pgmq extension's SQL functions through a shared
//! sqlx pool: `pgmq.create`, `pgmq.send`, `pgmq.read`, `pgmq.delete` and
//! `pgmq.set_vt`.

use super::errors::{MessagingError, MessagingResult};
use super::message::{MessageId, QueuedMessage, TaskEnvelope};
use super::queue::MessageQueue;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct PgmqQueue {
    pool: PgPool,
}

fn seconds(duration: Duration) -> i32 {
    i32::try_from(duration.as_secs()).unwrap_or(i32::MAX)
}

fn message_id_i64(message_id: &MessageId) -> MessagingResult<i64> {
    message_id
        .as_i64()
        .ok_or_else(|| MessagingError::invalid_message_id(message_id.as_str()))
}

impl PgmqQueue {
    /// Connect a dedicated pool
    pub async fn connect(database_url: &str, max_connections: u32) -> MessagingResult<Self> {
        info!("🚀 Connecting to pgmq");
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        info!("✅ Connected to pgmq");
        Ok(Self { pool })
    }

    /// Use an existing connection pool
    pub fn new_with_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl MessageQueue for PgmqQueue {
    async fn ensure_queue(&self, queue_name: &str) -> MessagingResult<()> {
        debug!("📋 Creating queue: {}", queue_name);
        sqlx::query("SELECT pgmq.create($1)")
            .bind(queue_name)
            .execute(&self.pool)
            .await
            .map_err(|e| MessagingError::queue_operation(queue_name, "create", e.to_string()))?;
        Ok(())
    }

    async fn send(
        &self,
        queue_name: &str,
        envelope: &TaskEnvelope,
        delay: Duration,
    ) -> MessagingResult<MessageId> {
        envelope.validate()?;
        let payload = serde_json::to_value(envelope)?;

        let row = sqlx::query("SELECT pgmq.send($1, $2, $3) AS msg_id")
            .bind(queue_name)
            .bind(payload)
            .bind(seconds(delay))
            .fetch_one(&self.pool)
            .await
            .map_err(|e| MessagingError::queue_operation(queue_name, "send", e.to_string()))?;
        let msg_id: i64 = row.try_get("msg_id")?;

        debug!(
            queue = %queue_name,
            msg_id = msg_id,
            action = %envelope.class,
            delay_seconds = delay.as_secs(),
            "📤 Envelope sent"
        );
        Ok(MessageId::from(msg_id))
    }

    async fn receive(
        &self,
        queue_name: &str,
        max_messages: usize,
        visibility_timeout: Duration,
    ) -> MessagingResult<Vec<QueuedMessage>> {
        let qty = i32::try_from(max_messages).unwrap_or(i32::MAX);
        let rows = sqlx::query(
            "SELECT msg_id, read_ct, enqueued_at, message FROM pgmq.read($1, $2, $3)",
        )
        .bind(queue_name)
        .bind(seconds(visibility_timeout))
        .bind(qty)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| MessagingError::queue_operation(queue_name, "read", e.to_string()))?;

        let mut messages = Vec::with_capacity(rows.len());
        for row in rows {
            let msg_id: i64 = row.try_get("msg_id")?;
            let read_ct: i32 = row.try_get("read_ct")?;
            let enqueued_at: DateTime<Utc> = row.try_get("enqueued_at")?;
            let message: Value = row.try_get("message")?;
            messages.push(QueuedMessage {
                message_id: MessageId::from(msg_id),
                body: message.to_string(),
                receive_count: u32::try_from(read_ct).unwrap_or(0),
                enqueued_at,
            });
        }

        debug!("📨 Read {} messages from queue: {}", messages.len(), queue_name);
        Ok(messages)
    }

    async fn delete(&self, queue_name: &str, message_id: &MessageId) -> MessagingResult<()> {
        let id = message_id_i64(message_id)?;
        let row = sqlx::query("SELECT pgmq.delete($1, $2) AS deleted")
            .bind(queue_name)
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| MessagingError::queue_operation(queue_name, "delete", e.to_string()))?;
        let deleted: bool = row.try_get("deleted")?;
        if !deleted {
            return Err(MessagingError::message_not_found(message_id.as_str()));
        }
        debug!("🗑️ Message deleted: {}", id);
        Ok(())
    }

    async fn change_visibility(
        &self,
        queue_name: &str,
        message_id: &MessageId,
        delay: Duration,
    ) -> MessagingResult<()> {
        let id = message_id_i64(message_id)?;
        let updated = sqlx::query("SELECT msg_id FROM pgmq.set_vt($1, $2, $3)")
            .bind(queue_name)
            .bind(id)
            .bind(seconds(delay))
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| MessagingError::queue_operation(queue_name, "set_vt", e.to_string()))?;
        if updated.is_none() {
            return Err(MessagingError::message_not_found(message_id.as_str()));
        }
        Ok(())
    }

    async fn reset_connections(&self) {
        warn!("🔌 Closing pgmq connection pool");
        self.pool.close().await;
    }

    fn provider_name(&self) -> &'static str {
        "pgmq"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seconds_saturates() {
        assert_eq!(seconds(Duration::from_secs(300)), 300);
        assert_eq!(seconds(Duration::from_secs(u64::MAX)), i32::MAX);
    }

    #[test]
    fn test_message_id_must_be_numeric() {
        assert_eq!(message_id_i64(&MessageId::from(7i64)).unwrap(), 7);
        assert!(matches!(
            message_id_i64(&MessageId::from("abc")),
            Err(MessagingError::InvalidMessageId { .. })
        ));
    }
}
