//! The wire contract for anything that travels through a queue.

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::MessagingError;

/// A message that can be sent through a [`super::MessagingProvider`].
///
/// Blanket-implemented for every serde-capable type; the bus payload is
/// always JSON.
pub trait QueueMessage: Serialize + DeserializeOwned + Send + Sync {
    fn to_bytes(&self) -> Result<Vec<u8>, MessagingError> {
        serde_json::to_vec(self).map_err(|e| MessagingError::serialization(e.to_string()))
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, MessagingError> {
        serde_json::from_slice(bytes).map_err(|e| MessagingError::serialization(e.to_string()))
    }
}

impl<T> QueueMessage for T where T: Serialize + DeserializeOwned + Send + Sync {}
