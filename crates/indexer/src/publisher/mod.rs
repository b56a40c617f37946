//! Tick publisher.
//!
//! Turns one tick's source events into broker messages and sends them concurrently.
//! A tick is complete only after every submitted message has resolved its delivery
//! (the tick barrier), so the caller can checkpoint the tick right after a
//! successful return.

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use std::time::Duration;
use thiserror::Error;
use tickstream_core::{CoreError, Event, Tick, TickEvents};
use tokio::time::Instant;
use tracing::{debug, info, warn};

pub mod kafka;

pub use kafka::KafkaProducer;

/// Message ready for submission to the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    /// Partition key: the tick as 4 little-endian bytes, so one tick routes together.
    pub key: Vec<u8>,
    /// Idempotency id of the event.
    pub id: String,
    /// JSON-encoded [`Event`].
    pub payload: Vec<u8>,
}

impl OutboundMessage {
    /// Build the message of an event.
    pub fn from_event(event: &Event) -> Result<Self, CoreError> {
        Ok(Self {
            key: event.tick.to_le_bytes().to_vec(),
            id: event.id.clone(),
            payload: event.to_json()?,
        })
    }
}

/// Errors reported by a [`MessageProducer`].
#[derive(Debug, Error)]
pub enum ProducerError {
    /// Kafka client error.
    #[error("kafka error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),

    /// The producer went away before reporting the delivery outcome.
    #[error("delivery outcome lost: producer was dropped")]
    Canceled,

    /// Any other transport failure.
    #[error("{0}")]
    Other(String),
}

/// Resolves once the broker confirmed or rejected a submitted message.
pub type DeliveryFuture = BoxFuture<'static, Result<(), ProducerError>>;

/// Asynchronous broker transport.
#[async_trait]
pub trait MessageProducer: Send + Sync {
    /// Hand a message to the transport without waiting for its delivery.
    ///
    /// An `Err` means the message was not accepted at all; otherwise the returned
    /// future reports the delivery outcome.
    async fn submit(&self, message: OutboundMessage) -> Result<DeliveryFuture, ProducerError>;
}

/// Failure of a whole tick.
#[derive(Debug, Error)]
pub enum PublishError {
    /// Some messages could not be built or sent.
    #[error("[{failures}] error(s) sending messages for tick [{tick}]")]
    Failed {
        /// Tick that failed.
        tick: Tick,
        /// Number of build and send failures.
        failures: usize,
        /// Messages confirmed by the broker.
        sent: usize,
    },

    /// The tick barrier did not complete in time.
    #[error("timed out after {timeout:?} waiting for [{pending}] deliveries of tick [{tick}]")]
    DeliveryTimeout {
        /// Tick that failed.
        tick: Tick,
        /// Deliveries still unresolved.
        pending: usize,
        /// Messages confirmed by the broker before the deadline.
        sent: usize,
        /// Configured barrier timeout.
        timeout: Duration,
    },
}

impl PublishError {
    /// Messages that were confirmed despite the failure.
    pub fn sent(&self) -> usize {
        match self {
            Self::Failed { sent, .. } | Self::DeliveryTimeout { sent, .. } => *sent,
        }
    }
}

/// Publishes the events of one tick at a time.
pub struct TickPublisher<P> {
    producer: P,
    delivery_timeout: Option<Duration>,
}

impl<P: MessageProducer> TickPublisher<P> {
    /// Create a publisher.
    ///
    /// `delivery_timeout` bounds the wait at the tick barrier; `None` waits for as
    /// long as the transport takes to resolve every delivery.
    pub fn new(producer: P, delivery_timeout: Option<Duration>) -> Self {
        Self {
            producer,
            delivery_timeout,
        }
    }

    /// Publish every event of `tick_events` and wait for all deliveries.
    ///
    /// Returns the number of messages the broker confirmed. A message that cannot be
    /// built stops the tick: later transactions are not submitted, while messages
    /// already submitted are still awaited. Any build or send failure fails the tick.
    pub async fn publish(&self, tick_events: &TickEvents) -> Result<usize, PublishError> {
        let tick = tick_events.tick;

        if tick_events.event_count() == 0 {
            debug!("No events in tick [{}]", tick);
            return Ok(0);
        }

        let mut failures = 0usize;
        let mut pending = FuturesUnordered::new();

        'transactions: for transaction in &tick_events.tx_events {
            let transaction_hash = transaction.tx_id.as_str();
            debug!(
                "Processing events of transaction [{}]: [{}]",
                transaction_hash,
                transaction.events.len()
            );

            for (index, source_event) in transaction.events.iter().enumerate() {
                let message = match Event::from_source(source_event, index, tick, transaction_hash)
                    .and_then(|event| OutboundMessage::from_event(&event))
                {
                    Ok(message) => message,
                    Err(e) => {
                        warn!(
                            "Failed to create message for event {} of transaction [{}]: {}",
                            index, transaction_hash, e
                        );
                        failures += 1;
                        break 'transactions;
                    }
                };

                let label = format!("{} of transaction [{}]", message.id, transaction_hash);
                match self.producer.submit(message).await {
                    Ok(delivery) => pending.push(async move { (label, delivery.await) }),
                    Err(e) => {
                        warn!("Failed to submit message {}: {}", label, e);
                        failures += 1;
                    }
                }
            }
        }

        let submitted = pending.len();
        let mut sent = 0usize;
        let deadline = self.delivery_timeout.map(|timeout| Instant::now() + timeout);

        while !pending.is_empty() {
            let next = match deadline {
                Some(deadline) => match tokio::time::timeout_at(deadline, pending.next()).await {
                    Ok(next) => next,
                    Err(_) => {
                        return Err(PublishError::DeliveryTimeout {
                            tick,
                            pending: pending.len(),
                            sent,
                            timeout: self.delivery_timeout.unwrap_or_default(),
                        });
                    }
                },
                None => pending.next().await,
            };

            match next {
                Some((_, Ok(()))) => sent += 1,
                Some((label, Err(e))) => {
                    warn!("Failed to send message {}: {}", label, e);
                    failures += 1;
                }
                None => break,
            }
        }

        if failures > 0 {
            return Err(PublishError::Failed {
                tick,
                failures,
                sent,
            });
        }

        info!(
            "Published tick [{}]: [{}] transactions, [{}] of [{}] messages confirmed",
            tick,
            tick_events.tx_events.len(),
            sent,
            submitted
        );

        Ok(sent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use tickstream_core::{EventHeader, SourceEvent, TransactionEvents};

    /// Resolves every delivery immediately, optionally failing selected event ids.
    #[derive(Default)]
    struct FakeProducer {
        failing_ids: Vec<u64>,
        submitted: Mutex<Vec<OutboundMessage>>,
    }

    #[async_trait]
    impl MessageProducer for FakeProducer {
        async fn submit(&self, message: OutboundMessage) -> Result<DeliveryFuture, ProducerError> {
            let event: Event = serde_json::from_slice(&message.payload).unwrap();
            let fail = self.failing_ids.contains(&event.event_id);
            self.submitted.lock().unwrap().push(message);
            Ok(Box::pin(async move {
                if fail {
                    Err(ProducerError::Other("test error".to_string()))
                } else {
                    Ok(())
                }
            }))
        }
    }

    /// Never resolves deliveries.
    #[derive(Default)]
    struct HangingProducer {
        submitted: AtomicUsize,
    }

    #[async_trait]
    impl MessageProducer for HangingProducer {
        async fn submit(&self, _message: OutboundMessage) -> Result<DeliveryFuture, ProducerError> {
            self.submitted.fetch_add(1, Ordering::SeqCst);
            Ok(Box::pin(futures::future::pending::<Result<(), ProducerError>>()))
        }
    }

    fn event(event_id: u64) -> SourceEvent {
        SourceEvent {
            header: Some(EventHeader {
                epoch: 153,
                tick: 12345,
                event_id,
                event_digest: event_id * 10,
            }),
            event_type: 1,
            event_size: 4,
            event_data: "AAAA".to_string(),
        }
    }

    fn tick_events(transactions: Vec<(&str, Vec<SourceEvent>)>) -> TickEvents {
        TickEvents {
            tick: 12345,
            tx_events: transactions
                .into_iter()
                .map(|(tx_id, events)| TransactionEvents {
                    tx_id: tx_id.to_string(),
                    events,
                })
                .collect(),
        }
    }

    #[tokio::test]
    async fn test_publish_all_events() {
        let publisher = TickPublisher::new(FakeProducer::default(), None);
        let events = tick_events(vec![
            ("tx-id-1", vec![event(1), event(2)]),
            ("tx-id-2", vec![event(3), event(4), event(5)]),
        ]);

        let sent = publisher.publish(&events).await.unwrap();
        assert_eq!(sent, 5);

        let submitted = publisher.producer.submitted.lock().unwrap();
        assert_eq!(submitted.len(), 5);
        for message in submitted.iter() {
            assert_eq!(message.key, 12345u32.to_le_bytes().to_vec());
        }

        let first: Event = serde_json::from_slice(&submitted[0].payload).unwrap();
        assert_eq!(first.tick, 12345);
        assert_eq!(first.transaction_hash, "tx-id-1");
        assert_eq!(submitted[0].id, first.id);
        assert_eq!(
            first.id,
            tickstream_core::idempotency_id(153, 12345, 1, 10, "tx-id-1")
        );
    }

    #[tokio::test]
    async fn test_empty_tick_does_not_touch_broker() {
        let publisher = TickPublisher::new(HangingProducer::default(), None);

        let sent = publisher
            .publish(&tick_events(vec![("tx-id-1", vec![])]))
            .await
            .unwrap();
        assert_eq!(sent, 0);
        assert_eq!(publisher.producer.submitted.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_send_failures_are_aggregated() {
        let producer = FakeProducer {
            failing_ids: vec![1, 2],
            ..Default::default()
        };
        let publisher = TickPublisher::new(producer, None);
        let events = tick_events(vec![
            ("tx-id-1", vec![event(1), event(2)]),
            ("tx-id-2", vec![event(3), event(4), event(5)]),
        ]);

        let err = publisher.publish(&events).await.unwrap_err();
        assert!(matches!(
            err,
            PublishError::Failed {
                tick: 12345,
                failures: 2,
                sent: 3
            }
        ));
        assert_eq!(err.sent(), 3);
        assert_eq!(
            err.to_string(),
            "[2] error(s) sending messages for tick [12345]"
        );
        // Failed sends do not stop later transactions.
        assert_eq!(publisher.producer.submitted.lock().unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_build_failure_aborts_remaining_transactions() {
        let publisher = TickPublisher::new(FakeProducer::default(), None);
        let broken = SourceEvent {
            header: None,
            ..event(0)
        };
        let events = tick_events(vec![
            ("tx-id-1", vec![event(1), broken, event(2)]),
            ("tx-id-2", vec![event(3)]),
        ]);

        let err = publisher.publish(&events).await.unwrap_err();
        assert!(matches!(
            err,
            PublishError::Failed {
                failures: 1,
                sent: 1,
                ..
            }
        ));
        // Only the message submitted before the broken event went out.
        assert_eq!(publisher.producer.submitted.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_barrier_times_out_on_hanging_deliveries() {
        let publisher =
            TickPublisher::new(HangingProducer::default(), Some(Duration::from_millis(50)));
        let events = tick_events(vec![("tx-id-1", vec![event(1), event(2)])]);

        let err = publisher.publish(&events).await.unwrap_err();
        assert!(matches!(
            err,
            PublishError::DeliveryTimeout {
                tick: 12345,
                pending: 2,
                sent: 0,
                ..
            }
        ));
        assert_eq!(publisher.producer.submitted.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_barrier_waits_for_slow_deliveries() {
        struct SlowProducer {
            resolved: Arc<AtomicUsize>,
        }

        #[async_trait]
        impl MessageProducer for SlowProducer {
            async fn submit(
                &self,
                _message: OutboundMessage,
            ) -> Result<DeliveryFuture, ProducerError> {
                let resolved = self.resolved.clone();
                Ok(Box::pin(async move {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    resolved.fetch_add(1, Ordering::SeqCst);
                    Ok::<(), ProducerError>(())
                }))
            }
        }

        let resolved = Arc::new(AtomicUsize::new(0));
        let publisher = TickPublisher::new(
            SlowProducer {
                resolved: resolved.clone(),
            },
            Some(Duration::from_secs(5)),
        );
        let events = tick_events(vec![("tx-id-1", vec![event(1), event(2), event(3)])]);

        assert_eq!(publisher.publish(&events).await.unwrap(), 3);
        assert_eq!(resolved.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_message_key_is_little_endian_tick() {
        let source = event(7);
        let event = Event::from_source(&source, 0, 0x0102_0304, "tx").unwrap();
        let message = OutboundMessage::from_event(&event).unwrap();
        assert_eq!(message.key, vec![0x04, 0x03, 0x02, 0x01]);
        assert_eq!(message.id, event.id);
    }
}
