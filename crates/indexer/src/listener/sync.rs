//! Sync engine mirroring the source event log into the broker.

use anyhow::{Context, Result};
use std::future::Future;
use std::time::Duration;
use tickstream_core::{Epoch, Tick, TickRange};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::provider::EventSource;
use super::reconcile::reconcile;
use crate::config::SyncConfig;
use crate::metrics::SyncMetrics;
use crate::publisher::{MessageProducer, TickPublisher};
use crate::storage::CheckpointStore;

/// State carried from one sync cycle to the next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncState {
    /// Epoch the next reconciliation starts from.
    pub epoch: Epoch,
    /// Number of cycles run so far.
    pub cycle: u64,
    /// Failed cycles since the last successful one.
    pub consecutive_failures: u32,
}

impl SyncState {
    /// Initial state for a loop starting at `start_epoch`.
    pub fn new(start_epoch: Epoch) -> Self {
        Self {
            epoch: start_epoch,
            cycle: 0,
            consecutive_failures: 0,
        }
    }
}

/// Result of one successful cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Nothing new to process.
    Idle,
    /// Every tick of `range` was published and checkpointed.
    Processed {
        /// The processed range.
        range: TickRange,
        /// Messages confirmed by the broker.
        messages: usize,
    },
}

/// Sync engine: reconciles, publishes and checkpoints one range per cycle.
pub struct SyncEngine<S, P, C> {
    source: S,
    publisher: TickPublisher<P>,
    checkpoints: C,
    metrics: SyncMetrics,
    config: SyncConfig,
}

impl<S, P, C> SyncEngine<S, P, C>
where
    S: EventSource,
    P: MessageProducer,
    C: CheckpointStore,
{
    /// Create a new sync engine.
    pub fn new(
        source: S,
        producer: P,
        checkpoints: C,
        metrics: SyncMetrics,
        config: SyncConfig,
    ) -> Self {
        let publisher = TickPublisher::new(producer, config.delivery_timeout());
        Self {
            source,
            publisher,
            checkpoints,
            metrics,
            config,
        }
    }

    /// Run the sync loop.
    ///
    /// A cycle starts every `poll_interval` no matter how long the previous one
    /// took; failed cycles add an exponential backoff on top. Cycle errors are
    /// logged and retried, so this only returns if the task is cancelled.
    pub async fn run(&self, start_epoch: Epoch) -> Result<()> {
        info!(
            "Sync engine starting at epoch {} (poll interval {:?})",
            start_epoch,
            self.config.poll_interval()
        );

        let mut interval = tokio::time::interval(self.config.poll_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut state = SyncState::new(start_epoch);
        loop {
            interval.tick().await;
            state = self.step(state).await;

            let backoff = self.config.retry_backoff(state.consecutive_failures);
            if !backoff.is_zero() {
                debug!(
                    "Backing off {:?} after {} failed cycle(s)",
                    backoff, state.consecutive_failures
                );
                tokio::time::sleep(backoff).await;
            }
        }
    }

    /// Run one cycle and compute the state carried into the next one.
    ///
    /// On failure the carried epoch stays unchanged, so the next cycle retries
    /// from the last checkpoint.
    pub async fn step(&self, state: SyncState) -> SyncState {
        let cycle = state.cycle + 1;

        match self.sync_cycle(state.epoch).await {
            Ok(outcome) => {
                self.metrics.clear_cycle_error();
                let epoch = match outcome {
                    CycleOutcome::Idle => state.epoch,
                    CycleOutcome::Processed { range, messages } => {
                        info!(
                            cycle,
                            epoch = range.epoch,
                            start = range.start,
                            end = range.end,
                            messages,
                            "Range processed"
                        );
                        range.epoch
                    }
                };
                SyncState {
                    epoch,
                    cycle,
                    consecutive_failures: 0,
                }
            }
            Err(e) => {
                warn!(cycle, epoch = state.epoch, "Sync cycle failed: {:#}", e);
                self.metrics.record_cycle_error(&e);
                SyncState {
                    epoch: state.epoch,
                    cycle,
                    consecutive_failures: state.consecutive_failures.saturating_add(1),
                }
            }
        }
    }

    /// Fetch the source status, reconcile and process the next range.
    pub async fn sync_cycle(&self, epoch: Epoch) -> Result<CycleOutcome> {
        let status = with_timeout(self.config.status_timeout(), self.source.get_status())
            .await
            .context("Failed to get source status")?;
        self.metrics.set_source_tick(status.epoch, status.tick);

        let range = reconcile(epoch, &status, &self.checkpoints)
            .await
            .context("Failed to reconcile tick range")?;

        if range.is_empty() {
            debug!(epoch, "Nothing to process");
            return Ok(CycleOutcome::Idle);
        }

        debug!(
            epoch = range.epoch,
            start = range.start,
            end = range.end,
            "Processing range"
        );

        let messages = self.process_range(range).await?;
        Ok(CycleOutcome::Processed { range, messages })
    }

    /// Publish and checkpoint every tick of `range` in order.
    ///
    /// Stops at the first failing tick; ticks before it stay checkpointed.
    pub async fn process_range(&self, range: TickRange) -> Result<usize> {
        let mut messages = 0usize;

        for tick in range.ticks() {
            messages += self
                .process_tick(range.epoch, tick)
                .await
                .with_context(|| format!("Failed to process tick {} of {}", tick, range))?;
        }

        Ok(messages)
    }

    async fn process_tick(&self, epoch: Epoch, tick: Tick) -> Result<usize> {
        let tick_events = with_timeout(
            self.config.tick_fetch_timeout(),
            self.source.get_tick_events(tick),
        )
        .await
        .context("Failed to get tick events")?;

        if tick_events.tick != tick && tick_events.event_count() > 0 {
            anyhow::bail!(
                "Source returned events of tick {} when asked for tick {}",
                tick_events.tick,
                tick
            );
        }

        let sent = match self.publisher.publish(&tick_events).await {
            Ok(sent) => sent,
            Err(e) => {
                self.metrics.add_produced_messages(e.sent());
                return Err(e).context("Failed to publish tick events");
            }
        };
        self.metrics.add_produced_messages(sent);

        self.checkpoints
            .set_last_processed_tick(epoch, tick)
            .await
            .context("Failed to store checkpoint")?;

        self.metrics.set_processed_tick(epoch, tick);
        self.metrics.inc_processed_ticks();
        debug!(epoch, tick, sent, "Tick checkpointed");

        Ok(sent)
    }
}

async fn with_timeout<T>(
    timeout: Duration,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::time::timeout(timeout, fut)
        .await
        .map_err(|_| anyhow::anyhow!("timed out after {:?}", timeout))?
}
