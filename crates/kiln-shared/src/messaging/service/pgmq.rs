//! PGMQ messaging provider.
//!
//! Speaks the PGMQ SQL API (`pgmq.create`, `pgmq.send`, `pgmq.read`,
//! `pgmq.archive`, `pgmq.set_vt`, `pgmq.metrics`) directly over a sqlx pool,
//! so the queue transport shares the database that already holds the
//! authoritative state.
//!
//! Semantics: `ack` archives, `nack` with requeue sets the visibility
//! timeout to zero, `nack` without requeue deletes.

use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};

use super::{MessageId, MessageMetadata, QueueStats, QueuedMessage, ReceiptHandle};
use crate::messaging::message::QueueMessage;
use crate::messaging::MessagingError;

/// PGMQ-backed messaging service
#[derive(Debug, Clone)]
pub struct PgmqMessagingService {
    pool: PgPool,
}

impl PgmqMessagingService {
    /// Connect a dedicated pool to `database_url`
    pub async fn new(database_url: &str) -> Result<Self, MessagingError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .map_err(|e| MessagingError::connection(e.to_string()))?;
        Ok(Self { pool })
    }

    /// Reuse an externally-managed pool (the usual wiring: one pool for the
    /// store and the queue transport)
    pub fn new_with_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn ensure_queue(&self, queue_name: &str) -> Result<(), MessagingError> {
        sqlx::query("SELECT pgmq.create($1)")
            .bind(queue_name)
            .execute(&self.pool)
            .await
            .map_err(|e| MessagingError::queue_creation(queue_name, e.to_string()))?;
        Ok(())
    }

    pub async fn send_message<T: QueueMessage>(
        &self,
        queue_name: &str,
        message: &T,
    ) -> Result<MessageId, MessagingError> {
        let payload: serde_json::Value = serde_json::to_value(message)
            .map_err(|e| MessagingError::serialization(e.to_string()))?;

        let msg_id: i64 = sqlx::query_scalar("SELECT pgmq.send($1, $2)")
            .bind(queue_name)
            .bind(payload)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| MessagingError::send(queue_name, e.to_string()))?;

        Ok(MessageId::from(msg_id))
    }

    pub async fn receive_messages<T: QueueMessage>(
        &self,
        queue_name: &str,
        max_messages: usize,
        visibility_timeout: Duration,
    ) -> Result<Vec<QueuedMessage<T>>, MessagingError> {
        let rows = sqlx::query(
            "SELECT msg_id, read_ct, enqueued_at, message FROM pgmq.read($1, $2, $3)",
        )
        .bind(queue_name)
        .bind(visibility_timeout.as_secs() as i32)
        .bind(max_messages as i32)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| MessagingError::receive(queue_name, e.to_string()))?;

        let mut received = Vec::with_capacity(rows.len());
        for row in rows {
            let msg_id: i64 = row
                .try_get("msg_id")
                .map_err(|e| MessagingError::receive(queue_name, e.to_string()))?;
            let read_ct: i32 = row
                .try_get("read_ct")
                .map_err(|e| MessagingError::receive(queue_name, e.to_string()))?;
            let enqueued_at: chrono::DateTime<chrono::Utc> = row
                .try_get("enqueued_at")
                .map_err(|e| MessagingError::receive(queue_name, e.to_string()))?;
            let payload: serde_json::Value = row
                .try_get("message")
                .map_err(|e| MessagingError::receive(queue_name, e.to_string()))?;

            let message: T = serde_json::from_value(payload)
                .map_err(|e| MessagingError::serialization(e.to_string()))?;

            received.push(QueuedMessage {
                message,
                receipt_handle: ReceiptHandle::from(msg_id),
                metadata: MessageMetadata {
                    receive_count: read_ct as u32,
                    enqueued_at,
                },
            });
        }

        Ok(received)
    }

    pub async fn ack_message(
        &self,
        queue_name: &str,
        receipt_handle: &ReceiptHandle,
    ) -> Result<(), MessagingError> {
        let message_id = receipt_handle.as_i64();
        sqlx::query("SELECT pgmq.archive($1, $2::bigint)")
            .bind(queue_name)
            .bind(message_id)
            .execute(&self.pool)
            .await
            .map_err(|e| MessagingError::ack(queue_name, message_id, e.to_string()))?;
        Ok(())
    }

    pub async fn nack_message(
        &self,
        queue_name: &str,
        receipt_handle: &ReceiptHandle,
        requeue: bool,
    ) -> Result<(), MessagingError> {
        let message_id = receipt_handle.as_i64();
        if requeue {
            sqlx::query("SELECT pgmq.set_vt($1, $2::bigint, 0)")
                .bind(queue_name)
                .bind(message_id)
                .execute(&self.pool)
                .await
                .map_err(|e| MessagingError::nack(queue_name, message_id, e.to_string()))?;
        } else {
            sqlx::query("SELECT pgmq.delete($1, $2::bigint)")
                .bind(queue_name)
                .bind(message_id)
                .execute(&self.pool)
                .await
                .map_err(|e| MessagingError::nack(queue_name, message_id, e.to_string()))?;
        }
        Ok(())
    }

    pub async fn queue_stats(&self, queue_name: &str) -> Result<QueueStats, MessagingError> {
        let queue_length: i64 = sqlx::query_scalar("SELECT queue_length FROM pgmq.metrics($1)")
            .bind(queue_name)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| MessagingError::queue_stats(queue_name, e.to_string()))?;

        Ok(QueueStats {
            queue_name: queue_name.to_string(),
            message_count: queue_length.max(0) as u64,
        })
    }

    pub async fn health_check(&self) -> Result<bool, MessagingError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| MessagingError::HealthCheck(e.to_string()))?;
        Ok(true)
    }
}
