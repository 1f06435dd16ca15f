//! # Messaging
//!
//! Queue transport for kiln command messages. The bus is at-least-once:
//! consumers must make every message execution idempotent and must derive
//! follow-on messages from persisted state, never from in-memory scratch.
//!
//! Layout mirrors the rest of the shared crate: a provider enum
//! ([`MessagingProvider`]) with enum dispatch instead of trait objects, and
//! a thin domain facade ([`MessageClient`]) on top.

pub mod client;
pub mod message;
pub mod service;

pub use client::MessageClient;
pub use message::QueueMessage;
pub use service::{
    InMemoryMessagingService, MessageId, MessageMetadata, MessagingProvider, PgmqMessagingService,
    QueueStats, QueuedMessage, ReceiptHandle,
};

use thiserror::Error;

/// Errors raised by the messaging layer
#[derive(Debug, Error)]
pub enum MessagingError {
    #[error("failed to create queue '{queue}': {reason}")]
    QueueCreation { queue: String, reason: String },

    #[error("failed to send to queue '{queue}': {reason}")]
    Send { queue: String, reason: String },

    #[error("failed to receive from queue '{queue}': {reason}")]
    Receive { queue: String, reason: String },

    #[error("failed to ack message {message_id} on queue '{queue}': {reason}")]
    Ack {
        queue: String,
        message_id: i64,
        reason: String,
    },

    #[error("failed to nack message {message_id} on queue '{queue}': {reason}")]
    Nack {
        queue: String,
        message_id: i64,
        reason: String,
    },

    #[error("message serialization failed: {0}")]
    Serialization(String),

    #[error("messaging connection failed: {0}")]
    Connection(String),

    #[error("failed to read stats for queue '{queue}': {reason}")]
    QueueStats { queue: String, reason: String },

    #[error("messaging health check failed: {0}")]
    HealthCheck(String),
}

impl MessagingError {
    pub fn queue_creation(queue: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::QueueCreation {
            queue: queue.into(),
            reason: reason.into(),
        }
    }

    pub fn send(queue: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Send {
            queue: queue.into(),
            reason: reason.into(),
        }
    }

    pub fn receive(queue: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Receive {
            queue: queue.into(),
            reason: reason.into(),
        }
    }

    pub fn ack(queue: impl Into<String>, message_id: i64, reason: impl Into<String>) -> Self {
        Self::Ack {
            queue: queue.into(),
            message_id,
            reason: reason.into(),
        }
    }

    pub fn nack(queue: impl Into<String>, message_id: i64, reason: impl Into<String>) -> Self {
        Self::Nack {
            queue: queue.into(),
            message_id,
            reason: reason.into(),
        }
    }

    pub fn serialization(reason: impl Into<String>) -> Self {
        Self::Serialization(reason.into())
    }

    pub fn connection(reason: impl Into<String>) -> Self {
        Self::Connection(reason.into())
    }

    pub fn queue_stats(queue: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::QueueStats {
            queue: queue.into(),
            reason: reason.into(),
        }
    }
}
