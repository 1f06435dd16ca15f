//! # MessageClient Domain Facade
//!
//! Domain-level client over a [`MessagingProvider`]: it knows which queue
//! carries purge commands and exposes send/receive/ack/nack in kiln terms.
//! This is a struct, not a trait; provider selection happens inside the
//! provider enum.

use std::sync::Arc;
use std::time::Duration;

use super::message::QueueMessage;
use super::service::{MessageId, MessagingProvider, QueueStats, QueuedMessage, ReceiptHandle};
use super::MessagingError;
use crate::config::MessagingConfig;

/// Domain-level messaging client for kiln
#[derive(Debug, Clone)]
pub struct MessageClient {
    provider: Arc<MessagingProvider>,
    purge_queue: String,
}

impl MessageClient {
    pub fn new(provider: Arc<MessagingProvider>, purge_queue: impl Into<String>) -> Self {
        Self {
            provider,
            purge_queue: purge_queue.into(),
        }
    }

    pub fn from_config(provider: Arc<MessagingProvider>, config: &MessagingConfig) -> Self {
        Self::new(provider, config.purge_queue.clone())
    }

    pub fn provider(&self) -> &Arc<MessagingProvider> {
        &self.provider
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.provider_name()
    }

    pub fn purge_queue(&self) -> &str {
        &self.purge_queue
    }

    /// Create every queue this client publishes to; idempotent, run at startup
    pub async fn initialize_queues(&self) -> Result<(), MessagingError> {
        self.provider.ensure_queue(&self.purge_queue).await
    }

    /// Publish a purge command to the purge queue
    pub async fn send_purge_command<T: QueueMessage>(
        &self,
        command: &T,
    ) -> Result<MessageId, MessagingError> {
        self.provider.send_message(&self.purge_queue, command).await
    }

    /// Receive purge commands, hiding them for `visibility_timeout`
    pub async fn receive_purge_commands<T: QueueMessage>(
        &self,
        max_messages: usize,
        visibility_timeout: Duration,
    ) -> Result<Vec<QueuedMessage<T>>, MessagingError> {
        self.provider
            .receive_messages(&self.purge_queue, max_messages, visibility_timeout)
            .await
    }

    /// Acknowledge a processed purge command
    pub async fn ack_purge_command(
        &self,
        receipt_handle: &ReceiptHandle,
    ) -> Result<(), MessagingError> {
        self.provider
            .ack_message(&self.purge_queue, receipt_handle)
            .await
    }

    /// Release a purge command back to the queue for redelivery
    pub async fn nack_purge_command(
        &self,
        receipt_handle: &ReceiptHandle,
        requeue: bool,
    ) -> Result<(), MessagingError> {
        self.provider
            .nack_message(&self.purge_queue, receipt_handle, requeue)
            .await
    }

    pub async fn purge_queue_stats(&self) -> Result<QueueStats, MessagingError> {
        self.provider.queue_stats(&self.purge_queue).await
    }

    pub async fn health_check(&self) -> Result<bool, MessagingError> {
        self.provider.health_check().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_client() -> MessageClient {
        let provider = Arc::new(MessagingProvider::new_in_memory());
        MessageClient::new(provider, "purge_commands")
    }

    #[tokio::test]
    async fn test_client_creation() {
        let client = create_test_client();
        assert_eq!(client.provider_name(), "in_memory");
        assert_eq!(client.purge_queue(), "purge_commands");
    }

    #[tokio::test]
    async fn test_send_and_receive_purge_commands() {
        let client = create_test_client();
        client.initialize_queues().await.unwrap();

        let command = serde_json::json!({
            "type": "purge_source_file",
            "source_file_id": 11,
            "trigger_id": 3
        });
        client.send_purge_command(&command).await.unwrap();

        let received: Vec<QueuedMessage<serde_json::Value>> = client
            .receive_purge_commands(10, Duration::from_secs(30))
            .await
            .unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].message, command);

        client
            .ack_purge_command(&received[0].receipt_handle)
            .await
            .unwrap();
        assert_eq!(client.purge_queue_stats().await.unwrap().message_count, 0);
    }

    #[tokio::test]
    async fn test_nack_redelivers() {
        let client = create_test_client();
        client.initialize_queues().await.unwrap();

        client
            .send_purge_command(&serde_json::json!({"type": "purge_recipe", "recipe_id": 1}))
            .await
            .unwrap();

        let first: Vec<QueuedMessage<serde_json::Value>> = client
            .receive_purge_commands(1, Duration::from_secs(60))
            .await
            .unwrap();
        client
            .nack_purge_command(&first[0].receipt_handle, true)
            .await
            .unwrap();

        let second: Vec<QueuedMessage<serde_json::Value>> = client
            .receive_purge_commands(1, Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].receive_count(), 2);
    }
}
