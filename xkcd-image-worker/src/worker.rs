use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use xkcd::broker::messages::IMAGES_CONVERT_IN;
use xkcd::broker::{settled, ConvertImage, Delivery, ImageProcessed, MessageBroker, Publisher};
use xkcd::errors::BrokerResult;

use crate::processor::ImageProcessor;

/// How a pulled message was settled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    Processed,
    /// Dropped for good: malformed payload or missing source file.
    Terminated,
    /// Handed back for another delivery, or dead-lettered when out of deliveries.
    Retried,
}

/// Competing consumer of `images.convert.in`; handles one message at a time.
pub struct ImageWorker {
    broker: Arc<dyn MessageBroker>,
    publisher: Publisher,
    processor: ImageProcessor,
    name: String,
    lease: Duration,
    poll_interval: Duration,
}

impl ImageWorker {
    pub fn new(
        broker: Arc<dyn MessageBroker>,
        processor: ImageProcessor,
        name: impl Into<String>,
        lease: Duration,
        poll_interval: Duration,
    ) -> Self {
        Self {
            publisher: Publisher::new(broker.clone()),
            broker,
            processor,
            name: name.into(),
            lease,
            poll_interval,
        }
    }

    /// Polls until `shutdown` flips to `true` or its sender is dropped.
    pub async fn run_until(&self, mut shutdown: watch::Receiver<bool>) {
        info!(worker = %self.name, "image worker started");
        loop {
            if *shutdown.borrow() {
                break;
            }

            let handled = match self.process_next().await {
                Ok(outcome) => outcome.is_some(),
                Err(err) => {
                    error!(worker = %self.name, error = %err, "failed to pull conversion requests");
                    false
                }
            };

            if !handled {
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
        info!(worker = %self.name, "image worker stopped");
    }

    /// Pulls and settles at most one message. `None` when the queue is empty.
    pub async fn process_next(&self) -> BrokerResult<Option<Outcome>> {
        let mut deliveries = self
            .broker
            .pull(IMAGES_CONVERT_IN, &self.name, 1, self.lease)
            .await?;
        match deliveries.pop() {
            Some(delivery) => self.handle(delivery).await.map(Some),
            None => Ok(None),
        }
    }

    async fn handle(&self, delivery: Delivery) -> BrokerResult<Outcome> {
        let request: ConvertImage = match delivery.decode() {
            Ok(request) => request,
            Err(err) => {
                warn!(message_id = delivery.id, error = %err, "malformed conversion request");
                settled(self.broker.term(&delivery, &err.to_string()).await)?;
                return Ok(Outcome::Terminated);
            }
        };

        let paths = match self.processor.process(&request.original_abs_path).await {
            Ok(paths) => paths,
            Err(err) if !err.is_retryable() => {
                error!(
                    image_id = %request.image_id,
                    path = %request.original_abs_path.display(),
                    error = %err,
                    "source image is gone, dropping conversion request"
                );
                settled(self.broker.term(&delivery, &err.to_string()).await)?;
                return Ok(Outcome::Terminated);
            }
            Err(err) => {
                error!(
                    image_id = %request.image_id,
                    path = %request.original_abs_path.display(),
                    attempt = delivery.attempt,
                    error = %err,
                    "image processing failed"
                );
                settled(self.broker.nack(&delivery, &err.to_string()).await)?;
                return Ok(Outcome::Retried);
            }
        };

        let result = ImageProcessed {
            image_id: request.image_id,
            converted_abs_path: paths.converted,
            thumbnail_abs_path: Some(paths.thumbnail),
        };
        if let Err(err) = self.publisher.publish(&result).await {
            warn!(image_id = %request.image_id, error = %err, "failed to publish processing result");
            settled(self.broker.nack(&delivery, &err.to_string()).await)?;
            return Ok(Outcome::Retried);
        }

        settled(self.broker.ack(&delivery).await)?;
        debug!(image_id = %request.image_id, converted = result.converted_abs_path.is_some(), "image processed");
        Ok(Outcome::Processed)
    }
}
