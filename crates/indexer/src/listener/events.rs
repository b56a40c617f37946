//! Wire types of the source status endpoint.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tickstream_core::{Epoch, ProcessedInterval, SourceStatus, Tick};

/// Response of `GET /v1/status`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    /// The source's processing frontier.
    #[serde(default)]
    pub last_processed_tick: Option<TickInfo>,

    /// Available intervals, grouped by epoch.
    #[serde(default)]
    pub processed_tick_intervals_per_epoch: Vec<EpochIntervals>,
}

/// Epoch and tick of the source frontier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TickInfo {
    /// Last processed tick.
    #[serde(default)]
    pub tick_number: Tick,
    /// Epoch of that tick.
    #[serde(default)]
    pub epoch: Epoch,
}

/// Available intervals of one epoch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EpochIntervals {
    /// Epoch the intervals belong to.
    #[serde(default)]
    pub epoch: Epoch,
    /// Inclusive tick intervals.
    #[serde(default)]
    pub intervals: Vec<IntervalInfo>,
}

/// One inclusive interval as reported by the source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntervalInfo {
    /// First available tick.
    #[serde(default)]
    pub initial_processed_tick: Tick,
    /// Last available tick.
    #[serde(default)]
    pub last_processed_tick: Tick,
}

impl From<StatusResponse> for SourceStatus {
    fn from(response: StatusResponse) -> Self {
        let frontier = response.last_processed_tick.unwrap_or_default();

        let mut intervals: BTreeMap<Epoch, Vec<ProcessedInterval>> = BTreeMap::new();
        for epoch_intervals in response.processed_tick_intervals_per_epoch {
            intervals.entry(epoch_intervals.epoch).or_default().extend(
                epoch_intervals.intervals.iter().map(|interval| {
                    ProcessedInterval::new(
                        interval.initial_processed_tick,
                        interval.last_processed_tick,
                    )
                }),
            );
        }
        // Reconciliation scans intervals in `from` order.
        for list in intervals.values_mut() {
            list.sort_by_key(|interval| interval.from);
        }

        SourceStatus {
            epoch: frontier.epoch,
            tick: frontier.tick_number,
            intervals,
        }
    }
}
