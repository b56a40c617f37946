//! Range reconciliation.
//!
//! Compares what the source reports as available against the local checkpoints and
//! yields the next contiguous run of ticks to process.

use tickstream_core::{Epoch, SourceStatus, TickRange};

use crate::storage::{CheckpointError, CheckpointStore};

/// Compute the next tick range to process.
///
/// The search starts at `min(start_epoch, status.epoch)` and walks epochs upwards
/// until the source frontier. Within an epoch the first interval that extends past
/// the epoch's checkpoint wins; the range starts right after the checkpoint (or at the
/// interval start, whichever is later) and ends at the interval end. Epochs without
/// intervals or without unprocessed ticks are skipped.
///
/// Returns [`TickRange::NONE`] when there is nothing to do. A missing checkpoint
/// counts as "nothing processed yet"; any other store error is returned.
pub async fn reconcile<C>(
    start_epoch: Epoch,
    status: &SourceStatus,
    checkpoints: &C,
) -> Result<TickRange, CheckpointError>
where
    C: CheckpointStore + ?Sized,
{
    let mut search_epoch = start_epoch.min(status.epoch);

    while search_epoch <= status.epoch {
        if let Some(intervals) = status.intervals_for(search_epoch) {
            let last_processed = match checkpoints.get_last_processed_tick(search_epoch).await {
                Ok(tick) => tick,
                Err(CheckpointError::NotFound { .. }) => 0,
                Err(e) => return Err(e),
            };

            if let Some(interval) = intervals.iter().find(|i| i.to > last_processed) {
                return Ok(TickRange::new(
                    interval.from.max(last_processed.saturating_add(1)),
                    interval.to,
                    search_epoch,
                ));
            }
        }

        match search_epoch.checked_add(1) {
            Some(next) => search_epoch = next,
            None => break,
        }
    }

    Ok(TickRange::NONE)
}
