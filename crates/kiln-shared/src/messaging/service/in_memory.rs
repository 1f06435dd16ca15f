//! In-memory messaging provider.
//!
//! Implements the same visibility-timeout and receive-count semantics as the
//! PGMQ provider so tests exercise real redelivery behavior without a
//! database.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};

use super::{MessageId, MessageMetadata, QueueStats, QueuedMessage, ReceiptHandle};
use crate::messaging::message::QueueMessage;
use crate::messaging::MessagingError;

#[derive(Debug)]
struct StoredMessage {
    msg_id: i64,
    payload: Vec<u8>,
    read_ct: u32,
    enqueued_at: DateTime<Utc>,
    visible_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct QueueState {
    next_id: i64,
    messages: Vec<StoredMessage>,
}

/// Test/development messaging backend with PGMQ-like semantics
#[derive(Debug, Clone, Default)]
pub struct InMemoryMessagingService {
    queues: Arc<Mutex<HashMap<String, QueueState>>>,
}

impl InMemoryMessagingService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ensure_queue(&self, queue_name: &str) -> Result<(), MessagingError> {
        let mut queues = self.queues.lock().unwrap_or_else(|p| p.into_inner());
        queues.entry(queue_name.to_string()).or_default();
        Ok(())
    }

    pub fn send_message<T: QueueMessage>(
        &self,
        queue_name: &str,
        message: &T,
    ) -> Result<MessageId, MessagingError> {
        let payload = message.to_bytes()?;
        let mut queues = self.queues.lock().unwrap_or_else(|p| p.into_inner());
        let queue = queues
            .get_mut(queue_name)
            .ok_or_else(|| MessagingError::send(queue_name, "queue does not exist"))?;

        queue.next_id += 1;
        let msg_id = queue.next_id;
        let now = Utc::now();
        queue.messages.push(StoredMessage {
            msg_id,
            payload,
            read_ct: 0,
            enqueued_at: now,
            visible_at: now,
        });

        Ok(MessageId::from(msg_id))
    }

    pub fn receive_messages<T: QueueMessage>(
        &self,
        queue_name: &str,
        max_messages: usize,
        visibility_timeout: Duration,
    ) -> Result<Vec<QueuedMessage<T>>, MessagingError> {
        let mut queues = self.queues.lock().unwrap_or_else(|p| p.into_inner());
        let queue = queues
            .get_mut(queue_name)
            .ok_or_else(|| MessagingError::receive(queue_name, "queue does not exist"))?;

        let now = Utc::now();
        let hidden_until = now
            + chrono::Duration::from_std(visibility_timeout)
                .map_err(|e| MessagingError::receive(queue_name, e.to_string()))?;

        let mut received = Vec::new();
        for stored in queue.messages.iter_mut() {
            if received.len() >= max_messages {
                break;
            }
            if stored.visible_at > now {
                continue;
            }
            stored.read_ct += 1;
            stored.visible_at = hidden_until;

            let message = T::from_bytes(&stored.payload)?;
            received.push(QueuedMessage {
                message,
                receipt_handle: ReceiptHandle::from(stored.msg_id),
                metadata: MessageMetadata {
                    receive_count: stored.read_ct,
                    enqueued_at: stored.enqueued_at,
                },
            });
        }

        Ok(received)
    }

    pub fn ack_message(
        &self,
        queue_name: &str,
        receipt_handle: &ReceiptHandle,
    ) -> Result<(), MessagingError> {
        let mut queues = self.queues.lock().unwrap_or_else(|p| p.into_inner());
        let queue = queues.get_mut(queue_name).ok_or_else(|| {
            MessagingError::ack(queue_name, receipt_handle.as_i64(), "queue does not exist")
        })?;
        queue.messages.retain(|m| m.msg_id != receipt_handle.as_i64());
        Ok(())
    }

    pub fn nack_message(
        &self,
        queue_name: &str,
        receipt_handle: &ReceiptHandle,
        requeue: bool,
    ) -> Result<(), MessagingError> {
        let mut queues = self.queues.lock().unwrap_or_else(|p| p.into_inner());
        let queue = queues.get_mut(queue_name).ok_or_else(|| {
            MessagingError::nack(queue_name, receipt_handle.as_i64(), "queue does not exist")
        })?;

        if requeue {
            if let Some(stored) = queue
                .messages
                .iter_mut()
                .find(|m| m.msg_id == receipt_handle.as_i64())
            {
                stored.visible_at = Utc::now();
            }
        } else {
            queue.messages.retain(|m| m.msg_id != receipt_handle.as_i64());
        }
        Ok(())
    }

    pub fn queue_stats(&self, queue_name: &str) -> Result<QueueStats, MessagingError> {
        let queues = self.queues.lock().unwrap_or_else(|p| p.into_inner());
        let queue = queues
            .get(queue_name)
            .ok_or_else(|| MessagingError::queue_stats(queue_name, "queue does not exist"))?;
        Ok(QueueStats {
            queue_name: queue_name.to_string(),
            message_count: queue.messages.len() as u64,
        })
    }
}
