//! # Messaging Service
//!
//! Queue provider abstraction. Providers are an enum, not trait objects:
//! enum dispatch keeps the hot send/receive path free of vtables and keeps
//! the pattern uniform with [`crate::store::DataStore`].

pub mod in_memory;
pub mod pgmq;

pub use in_memory::InMemoryMessagingService;
pub use pgmq::PgmqMessagingService;

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};

use super::message::QueueMessage;
use super::MessagingError;

/// Provider-assigned identifier of a sent message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageId(i64);

impl MessageId {
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl From<i64> for MessageId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque handle used to ack/nack a received message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiptHandle(i64);

impl ReceiptHandle {
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl From<i64> for ReceiptHandle {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Delivery metadata attached to a received message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageMetadata {
    /// How many times this message has been delivered (at-least-once bus)
    pub receive_count: u32,
    pub enqueued_at: DateTime<Utc>,
}

/// A received message with its receipt handle and metadata
#[derive(Debug, Clone)]
pub struct QueuedMessage<T> {
    pub message: T,
    pub receipt_handle: ReceiptHandle,
    pub metadata: MessageMetadata,
}

impl<T> QueuedMessage<T> {
    pub fn receive_count(&self) -> u32 {
        self.metadata.receive_count
    }
}

/// Point-in-time statistics for one queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueStats {
    pub queue_name: String,
    pub message_count: u64,
}

/// The messaging backend in use
///
/// `Pgmq` speaks the PGMQ SQL API over a shared sqlx pool; `InMemory` backs
/// unit and integration tests with the same visibility semantics.
#[derive(Debug, Clone)]
pub enum MessagingProvider {
    Pgmq(PgmqMessagingService),
    InMemory(InMemoryMessagingService),
}

impl MessagingProvider {
    pub fn new_in_memory() -> Self {
        Self::InMemory(InMemoryMessagingService::new())
    }

    /// Create the queue if it does not exist; idempotent
    pub async fn ensure_queue(&self, queue_name: &str) -> Result<(), MessagingError> {
        match self {
            Self::Pgmq(s) => s.ensure_queue(queue_name).await,
            Self::InMemory(s) => s.ensure_queue(queue_name),
        }
    }

    pub async fn send_message<T: QueueMessage>(
        &self,
        queue_name: &str,
        message: &T,
    ) -> Result<MessageId, MessagingError> {
        match self {
            Self::Pgmq(s) => s.send_message(queue_name, message).await,
            Self::InMemory(s) => s.send_message(queue_name, message),
        }
    }

    pub async fn send_batch<T: QueueMessage>(
        &self,
        queue_name: &str,
        messages: &[T],
    ) -> Result<Vec<MessageId>, MessagingError> {
        let mut ids = Vec::with_capacity(messages.len());
        for message in messages {
            ids.push(self.send_message(queue_name, message).await?);
        }
        Ok(ids)
    }

    /// Receive up to `max_messages`, hiding them for `visibility_timeout`.
    /// A message not acked before the timeout expires becomes visible again.
    pub async fn receive_messages<T: QueueMessage>(
        &self,
        queue_name: &str,
        max_messages: usize,
        visibility_timeout: Duration,
    ) -> Result<Vec<QueuedMessage<T>>, MessagingError> {
        match self {
            Self::Pgmq(s) => {
                s.receive_messages(queue_name, max_messages, visibility_timeout)
                    .await
            }
            Self::InMemory(s) => s.receive_messages(queue_name, max_messages, visibility_timeout),
        }
    }

    /// Acknowledge (archive) a processed message
    pub async fn ack_message(
        &self,
        queue_name: &str,
        receipt_handle: &ReceiptHandle,
    ) -> Result<(), MessagingError> {
        match self {
            Self::Pgmq(s) => s.ack_message(queue_name, receipt_handle).await,
            Self::InMemory(s) => s.ack_message(queue_name, receipt_handle),
        }
    }

    /// Negative-acknowledge: release back to the queue (`requeue`) or drop
    pub async fn nack_message(
        &self,
        queue_name: &str,
        receipt_handle: &ReceiptHandle,
        requeue: bool,
    ) -> Result<(), MessagingError> {
        match self {
            Self::Pgmq(s) => s.nack_message(queue_name, receipt_handle, requeue).await,
            Self::InMemory(s) => s.nack_message(queue_name, receipt_handle, requeue),
        }
    }

    pub async fn queue_stats(&self, queue_name: &str) -> Result<QueueStats, MessagingError> {
        match self {
            Self::Pgmq(s) => s.queue_stats(queue_name).await,
            Self::InMemory(s) => s.queue_stats(queue_name),
        }
    }

    pub async fn health_check(&self) -> Result<bool, MessagingError> {
        match self {
            Self::Pgmq(s) => s.health_check().await,
            Self::InMemory(_) => Ok(true),
        }
    }

    pub fn provider_name(&self) -> &'static str {
        match self {
            Self::Pgmq(_) => "pgmq",
            Self::InMemory(_) => "in_memory",
        }
    }
}
