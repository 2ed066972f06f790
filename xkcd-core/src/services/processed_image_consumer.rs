use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::broker::messages::IMAGES_CONVERT_OUT;
use crate::broker::{settled, Delivery, ImageProcessed, MessageBroker};
use crate::errors::BrokerResult;
use crate::services::translation_image_service::TranslationImageService;

/// Applies worker results from `images.convert.out` to the image store.
pub struct ProcessedImageConsumer {
    broker: Arc<dyn MessageBroker>,
    images: Arc<TranslationImageService>,
    name: String,
    batch: u64,
    lease: Duration,
    poll_interval: Duration,
}

impl ProcessedImageConsumer {
    pub fn new(
        broker: Arc<dyn MessageBroker>,
        images: Arc<TranslationImageService>,
        name: impl Into<String>,
        batch: u64,
        lease: Duration,
        poll_interval: Duration,
    ) -> Self {
        Self {
            broker,
            images,
            name: name.into(),
            batch: batch.max(1),
            lease,
            poll_interval,
        }
    }

    /// Polls until `shutdown` flips to `true` or its sender is dropped.
    pub async fn run_until(&self, mut shutdown: watch::Receiver<bool>) {
        info!(consumer = %self.name, "processed image consumer started");
        loop {
            if *shutdown.borrow() {
                break;
            }

            let handled = match self.process_batch().await {
                Ok(handled) => handled,
                Err(err) => {
                    error!(consumer = %self.name, error = %err, "failed to pull processed images");
                    0
                }
            };

            if handled == 0 {
                tokio::select! {
                    _ = tokio::time::sleep(self.poll_interval) => {}
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }
        }
        info!(consumer = %self.name, "processed image consumer stopped");
    }

    /// Pulls and settles one batch. Returns the number of messages handled.
    ///
    /// A message that cannot be settled is logged and left to its lease; the
    /// rest of the batch is still handled.
    pub async fn process_batch(&self) -> BrokerResult<usize> {
        let deliveries = self
            .broker
            .pull(IMAGES_CONVERT_OUT, &self.name, self.batch, self.lease)
            .await?;
        let count = deliveries.len();
        for delivery in deliveries {
            if let Err(err) = settled(self.handle(&delivery).await) {
                error!(message_id = delivery.id, error = %err, "failed to settle processed image message");
            }
        }
        Ok(count)
    }

    async fn handle(&self, delivery: &Delivery) -> BrokerResult<()> {
        let message: ImageProcessed = match delivery.decode() {
            Ok(message) => message,
            Err(err) => {
                warn!(message_id = delivery.id, error = %err, "malformed processed image message");
                return self.broker.term(delivery, &err.to_string()).await;
            }
        };

        match self.images.apply_processed(&message).await {
            Ok(_) => {
                debug!(message_id = delivery.id, image_id = %message.image_id, "processed image applied");
                self.broker.ack(delivery).await
            }
            Err(err) => {
                warn!(
                    message_id = delivery.id,
                    image_id = %message.image_id,
                    attempt = delivery.attempt,
                    error = %err,
                    "failed to apply processed image"
                );
                self.broker.nack(delivery, &err.to_string()).await
            }
        }
    }
}
