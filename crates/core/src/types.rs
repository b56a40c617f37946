//! Core types for tickstream.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::ops::RangeInclusive;

use crate::error::{CoreError, Result};
use crate::hashing::idempotency_id;

/// Coarse era partitioning the tick sequence. Epoch 0 is never a working epoch.
pub type Epoch = u32;

/// Monotonic unit of source-side work within an epoch.
pub type Tick = u32;

/// Contiguous, inclusive run of ticks the source confirms as available.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProcessedInterval {
    /// First available tick (inclusive).
    pub from: Tick,
    /// Last available tick (inclusive).
    pub to: Tick,
}

impl ProcessedInterval {
    /// Create a new interval.
    pub const fn new(from: Tick, to: Tick) -> Self {
        Self { from, to }
    }
}

/// Snapshot of what the source currently has available.
///
/// Fetched fresh for every reconciliation and never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceStatus {
    /// The source's current epoch.
    pub epoch: Epoch,
    /// The source's last processed tick.
    pub tick: Tick,
    /// Available intervals per epoch, ordered and non-overlapping within an epoch.
    pub intervals: BTreeMap<Epoch, Vec<ProcessedInterval>>,
}

impl SourceStatus {
    /// Intervals reported for `epoch`, if any were recorded.
    pub fn intervals_for(&self, epoch: Epoch) -> Option<&[ProcessedInterval]> {
        self.intervals.get(&epoch).map(Vec::as_slice)
    }
}

/// Contiguous range of ticks within one epoch that still needs processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TickRange {
    /// First tick to process (inclusive).
    pub start: Tick,
    /// Last tick to process (inclusive).
    pub end: Tick,
    /// Epoch the ticks belong to.
    pub epoch: Epoch,
}

impl TickRange {
    /// Sentinel for "nothing to do".
    pub const NONE: TickRange = TickRange {
        start: 0,
        end: 0,
        epoch: 0,
    };

    /// Create a new range.
    pub const fn new(start: Tick, end: Tick, epoch: Epoch) -> Self {
        Self { start, end, epoch }
    }

    /// A range with `start > end` or any zero field carries no work.
    pub const fn is_empty(&self) -> bool {
        self.start > self.end || self.start == 0 || self.end == 0 || self.epoch == 0
    }

    /// Ticks covered by the range, in processing order.
    pub fn ticks(&self) -> RangeInclusive<Tick> {
        self.start..=self.end
    }
}

impl fmt::Display for TickRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "epoch {} ticks [{}..={}]", self.epoch, self.start, self.end)
    }
}

/// Last successfully processed tick of an epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Epoch of the checkpoint.
    pub epoch: Epoch,
    /// Last processed tick in that epoch.
    pub tick: Tick,
}

/// All events the source recorded for one tick, grouped by transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TickEvents {
    /// Tick number.
    #[serde(default, deserialize_with = "lenient::as_u32")]
    pub tick: Tick,
    /// Events per transaction, in source order.
    #[serde(default)]
    pub tx_events: Vec<TransactionEvents>,
}

impl TickEvents {
    /// Total number of events across all transactions.
    pub fn event_count(&self) -> usize {
        self.tx_events.iter().map(|tx| tx.events.len()).sum()
    }
}

/// Events emitted by a single transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionEvents {
    /// Transaction hash.
    #[serde(default)]
    pub tx_id: String,
    /// Events in emission order.
    #[serde(default)]
    pub events: Vec<SourceEvent>,
}

/// Event as delivered by the source service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceEvent {
    /// Event coordinates; the source may omit it.
    #[serde(default)]
    pub header: Option<EventHeader>,
    /// Event type discriminator.
    #[serde(default, deserialize_with = "lenient::as_u32")]
    pub event_type: u32,
    /// Size of the event data in bytes.
    #[serde(default, deserialize_with = "lenient::as_u32")]
    pub event_size: u32,
    /// Opaque event data (base64 as delivered by the source).
    #[serde(default)]
    pub event_data: String,
}

/// Coordinates of a source event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventHeader {
    /// Epoch the event was emitted in.
    #[serde(default, deserialize_with = "lenient::as_u32")]
    pub epoch: Epoch,
    /// Tick the event was emitted in.
    #[serde(default, deserialize_with = "lenient::as_u32")]
    pub tick: Tick,
    /// Event id assigned by the source.
    #[serde(default, deserialize_with = "lenient::as_u64")]
    pub event_id: u64,
    /// Digest of the event assigned by the source.
    #[serde(default, deserialize_with = "lenient::as_u64")]
    pub event_digest: u64,
}

/// Event as published to the broker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// Idempotency id, see [`idempotency_id`].
    pub id: String,
    /// Epoch of the event.
    pub epoch: Epoch,
    /// Tick of the event.
    pub tick: Tick,
    /// Source event id.
    pub event_id: u64,
    /// Source event digest.
    pub event_digest: u64,
    /// Hash of the transaction that emitted the event.
    pub transaction_hash: String,
    /// Event type discriminator.
    pub event_type: u32,
    /// Size of the event data in bytes.
    pub event_size: u32,
    /// Opaque event data.
    pub event_data: String,
}

impl Event {
    /// Build the published form of a source event.
    ///
    /// The tick is taken from the enclosing [`TickEvents`] rather than the header,
    /// so all events of one tick share the same partition key.
    pub fn from_source(
        source: &SourceEvent,
        index: usize,
        tick: Tick,
        transaction_hash: &str,
    ) -> Result<Self> {
        let header = source.header.ok_or_else(|| CoreError::MissingHeader {
            index,
            transaction_hash: transaction_hash.to_string(),
        })?;

        Ok(Self {
            id: idempotency_id(
                header.epoch,
                tick,
                header.event_id,
                header.event_digest,
                transaction_hash,
            ),
            epoch: header.epoch,
            tick,
            event_id: header.event_id,
            event_digest: header.event_digest,
            transaction_hash: transaction_hash.to_string(),
            event_type: source.event_type,
            event_size: source.event_size,
            event_data: source.event_data.clone(),
        })
    }

    /// Encode the event as a JSON payload.
    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// Deserializers for integers that JSON gateways may render as strings.
mod lenient {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Number {
        Int(u64),
        Text(String),
    }

    fn parse<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        match Number::deserialize(deserializer)? {
            Number::Int(value) => Ok(value),
            Number::Text(text) => text.parse().map_err(D::Error::custom),
        }
    }

    pub fn as_u64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        parse(deserializer)
    }

    pub fn as_u32<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
        let value = parse(deserializer)?;
        u32::try_from(value).map_err(D::Error::custom)
    }
}
