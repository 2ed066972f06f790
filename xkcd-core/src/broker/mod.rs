//! Durable, pull-based message hand-off between the API and the image worker.
//!
//! Delivery is at-least-once: a consumer that crashes mid-message loses its
//! lease and the message is handed out again. Consumers must be idempotent.

pub mod messages;
pub mod sql_broker;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::errors::{BrokerError, BrokerResult};

pub use messages::{BrokerMessage, ComicCreated, ConvertImage, ImageProcessed};
pub use sql_broker::SqlBroker;

/// A message handed to one consumer until acked, nacked, terminated or its lease expires.
#[derive(Clone, Debug)]
pub struct Delivery {
    pub id: i64,
    pub subject: String,
    pub payload: String,
    /// 1 on first delivery.
    pub attempt: i32,
    /// Proof of the claim. Settling with a token the message no longer carries
    /// fails with [`BrokerError::LeaseLost`].
    pub claim_token: String,
}

impl Delivery {
    pub fn decode<T: DeserializeOwned>(&self) -> BrokerResult<T> {
        serde_json::from_str(&self.payload).map_err(BrokerError::from)
    }
}

#[async_trait]
pub trait MessageBroker: Send + Sync {
    async fn publish(&self, subject: &str, payload: &str) -> BrokerResult<i64>;

    /// Claims up to `batch` messages for `consumer`, each leased for `lease`.
    async fn pull(
        &self,
        subject: &str,
        consumer: &str,
        batch: u64,
        lease: Duration,
    ) -> BrokerResult<Vec<Delivery>>;

    async fn ack(&self, delivery: &Delivery) -> BrokerResult<()>;

    /// Returns the message for redelivery, or dead-letters it once deliveries run out.
    async fn nack(&self, delivery: &Delivery, reason: &str) -> BrokerResult<()>;

    /// Dead-letters the message without further deliveries.
    async fn term(&self, delivery: &Delivery, reason: &str) -> BrokerResult<()>;
}

/// Treats a lost lease as settled: the message now belongs to whoever reclaimed it.
pub fn settled(result: BrokerResult<()>) -> BrokerResult<()> {
    match result {
        Err(BrokerError::LeaseLost(id)) => {
            warn!(
                message_id = id,
                "lease lost before settling, leaving message to its new holder"
            );
            Ok(())
        }
        other => other,
    }
}

/// Serialises typed messages onto their subject.
#[derive(Clone)]
pub struct Publisher {
    broker: Arc<dyn MessageBroker>,
}

impl Publisher {
    pub fn new(broker: Arc<dyn MessageBroker>) -> Self {
        Self { broker }
    }

    pub async fn publish<M: BrokerMessage>(&self, message: &M) -> BrokerResult<i64> {
        let payload = serde_json::to_string(message)?;
        let id = self.broker.publish(M::SUBJECT, &payload).await?;
        debug!(subject = M::SUBJECT, message_id = id, "published message");
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settled_absorbs_only_lost_leases() {
        assert!(settled(Ok(())).is_ok());
        assert!(settled(Err(BrokerError::LeaseLost(3))).is_ok());
        assert!(matches!(
            settled(Err(BrokerError::MessageNotFound(3))),
            Err(BrokerError::MessageNotFound(3))
        ));
    }
}
