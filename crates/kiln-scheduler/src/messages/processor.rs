//! The purge command bus processor.
//!
//! Pulls command envelopes from the purge queue, executes them against the
//! store, publishes follow-on messages, and acks. A store fault releases
//! the message for redelivery instead of acking, which is what gives the
//! cascade its at-least-once convergence.

use std::time::Duration;

use tracing::{debug, warn};
use uuid::Uuid;

use kiln_shared::config::MessagingConfig;
use kiln_shared::messaging::{MessageClient, MessageId, QueuedMessage};
use kiln_shared::store::DataStore;
use kiln_shared::KilnResult;

use super::PurgeCommand;

/// Executes purge commands delivered on the purge queue
#[derive(Debug, Clone)]
pub struct PurgeCommandProcessor {
    client: MessageClient,
    store: DataStore,
    visibility_timeout: Duration,
    batch_size: usize,
}

impl PurgeCommandProcessor {
    pub fn new(client: MessageClient, store: DataStore, config: &MessagingConfig) -> Self {
        Self {
            client,
            store,
            visibility_timeout: Duration::from_secs(config.visibility_timeout_secs),
            batch_size: config.receive_batch_size,
        }
    }

    /// Publish a command onto the purge queue
    pub async fn submit(&self, command: &PurgeCommand) -> KilnResult<MessageId> {
        let id = self.client.send_purge_command(command).await?;
        debug!(
            message_type = command.message_type(),
            message_id = %id,
            "purge command submitted"
        );
        Ok(id)
    }

    /// One poll iteration: receive a batch and process it. Returns the
    /// number of messages received.
    pub async fn run_once(&self) -> KilnResult<usize> {
        let received: Vec<QueuedMessage<PurgeCommand>> = self
            .client
            .receive_purge_commands(self.batch_size, self.visibility_timeout)
            .await?;

        let count = received.len();
        for queued in received {
            self.process(queued).await?;
        }
        Ok(count)
    }

    /// Drive `command` and everything it fans out to until the queue
    /// drains. Returns the total number of messages executed.
    pub async fn run_cascade(&self, command: PurgeCommand) -> KilnResult<usize> {
        self.submit(&command).await?;

        let mut executed = 0;
        loop {
            let processed = self.run_once().await?;
            if processed == 0 {
                return Ok(executed);
            }
            executed += processed;
        }
    }

    async fn process(&self, queued: QueuedMessage<PurgeCommand>) -> KilnResult<()> {
        let correlation_id = Uuid::new_v4();
        debug!(
            correlation_id = %correlation_id,
            message_type = queued.message.message_type(),
            receive_count = queued.receive_count(),
            "executing purge command"
        );

        match queued.message.execute(&self.store).await {
            Ok(outcome) => {
                for message in &outcome.new_messages {
                    self.client.send_purge_command(message).await?;
                }
                self.client.ack_purge_command(&queued.receipt_handle).await?;
                debug!(
                    correlation_id = %correlation_id,
                    new_messages = outcome.new_messages.len(),
                    "purge command executed"
                );
                Ok(())
            }
            Err(error) => {
                warn!(
                    correlation_id = %correlation_id,
                    message_type = queued.message.message_type(),
                    %error,
                    "purge command failed, releasing for redelivery"
                );
                self.client
                    .nack_purge_command(&queued.receipt_handle, true)
                    .await?;
                Err(error.into())
            }
        }
    }
}
