//! Purge command daemon: polls the purge queue and executes commands until
//! the cascade drains. One instance per scheduler deployment is enough; the
//! at-least-once bus makes extra instances harmless.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::{debug, error, info};

use kiln_scheduler::messages::PurgeCommandProcessor;
use kiln_shared::config::{KilnConfig, MessagingBackend};
use kiln_shared::messaging::{MessageClient, MessagingProvider, PgmqMessagingService};
use kiln_shared::store::{DataStore, PgDataStore};
use kiln_shared::telemetry;

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init_tracing("purge-daemon");
    let config = KilnConfig::load()?;

    let (store, provider) = match config.messaging.backend {
        MessagingBackend::Pgmq => {
            let pg =
                PgDataStore::new(&config.database.url, config.database.max_connections).await?;
            // The queue transport shares the store's pool
            let provider =
                MessagingProvider::Pgmq(PgmqMessagingService::new_with_pool(pg.pool().clone()));
            (DataStore::Postgres(pg), provider)
        }
        MessagingBackend::InMemory => (
            DataStore::new_in_memory(),
            MessagingProvider::new_in_memory(),
        ),
    };

    let client = MessageClient::from_config(Arc::new(provider), &config.messaging);
    client.initialize_queues().await?;
    info!(
        provider = client.provider_name(),
        queue = client.purge_queue(),
        "purge daemon started"
    );

    let processor = PurgeCommandProcessor::new(client, store, &config.messaging);
    let poll_interval = Duration::from_millis(config.messaging.poll_interval_ms);

    loop {
        match processor.run_once().await {
            Ok(0) => tokio::time::sleep(poll_interval).await,
            Ok(processed) => debug!(processed, "purge commands processed"),
            Err(error) => {
                error!(%error, "purge command batch failed");
                tokio::time::sleep(poll_interval).await;
            }
        }
    }
}
