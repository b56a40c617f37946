//! Kafka transport for the tick publisher.

use anyhow::{Context, Result};
use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::message::{Header, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use std::time::Duration;
use tracing::info;

use super::{DeliveryFuture, MessageProducer, OutboundMessage, ProducerError};
use crate::config::BrokerConfig;

/// Wait before retrying a submission rejected because the local queue is full.
const QUEUE_FULL_BACKOFF: Duration = Duration::from_millis(50);

/// Header carrying the idempotency id of a message.
pub const ID_HEADER: &str = "id";

/// Kafka producer writing every message to one topic.
#[derive(Clone)]
pub struct KafkaProducer {
    producer: FutureProducer,
    topic: String,
}

impl KafkaProducer {
    /// Create a producer from the broker configuration.
    ///
    /// This does not contact the brokers; see [`KafkaProducer::check_connectivity`].
    pub fn new(config: &BrokerConfig) -> Result<Self> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &config.bootstrap_servers)
            .set("compression.type", &config.compression)
            .set("message.timeout.ms", config.message_timeout_ms.to_string())
            .create()
            .context("Failed to create Kafka producer")?;

        Ok(Self {
            producer,
            topic: config.produce_topic.clone(),
        })
    }

    /// Fetch the topic metadata to verify that the brokers are reachable.
    pub async fn check_connectivity(&self, timeout: Duration) -> Result<()> {
        let producer = self.producer.clone();
        let topic = self.topic.clone();

        let metadata = tokio::task::spawn_blocking(move || {
            producer
                .client()
                .fetch_metadata(Some(&topic), timeout)
                .map(|metadata| metadata.brokers().len())
        })
        .await
        .context("Metadata task panicked")?
        .with_context(|| format!("Failed to fetch metadata of topic {}", self.topic))?;

        info!(
            "Kafka reachable: {} broker(s), producing to topic {}",
            metadata, self.topic
        );

        Ok(())
    }

    /// Wait for outstanding messages to be delivered, up to `timeout`.
    pub async fn flush(&self, timeout: Duration) -> Result<()> {
        let producer = self.producer.clone();
        tokio::task::spawn_blocking(move || producer.flush(timeout))
            .await
            .context("Flush task panicked")?
            .context("Failed to flush Kafka producer")
    }
}

#[async_trait]
impl MessageProducer for KafkaProducer {
    async fn submit(&self, message: OutboundMessage) -> Result<DeliveryFuture, ProducerError> {
        loop {
            let record = FutureRecord::to(&self.topic)
                .key(message.key.as_slice())
                .payload(message.payload.as_slice())
                .headers(OwnedHeaders::new().insert(Header {
                    key: ID_HEADER,
                    value: Some(message.id.as_str()),
                }));

            match self.producer.send_result(record).map_err(|(err, _)| err) {
                Ok(delivery) => {
                    return Ok(Box::pin(async move {
                        match delivery.await {
                            Ok(Ok(_)) => Ok(()),
                            Ok(Err((err, _))) => Err(ProducerError::Kafka(err)),
                            Err(_) => Err(ProducerError::Canceled),
                        }
                    }));
                }
                Err(KafkaError::MessageProduction(RDKafkaErrorCode::QueueFull)) => {}
                Err(err) => return Err(err.into()),
            }

            tokio::time::sleep(QUEUE_FULL_BACKOFF).await;
        }
    }
}
