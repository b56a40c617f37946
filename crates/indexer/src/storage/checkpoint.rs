//! Checkpoint storage: last processed tick per epoch.

use async_trait::async_trait;
use thiserror::Error;
use tickstream_core::{Checkpoint, Epoch, Tick};

use super::Storage;

/// Key namespace of the last-processed-tick records.
pub const LAST_PROCESSED_TICK_PREFIX: u8 = 0x00;

/// Errors returned by a [`CheckpointStore`].
#[derive(Debug, Error)]
pub enum CheckpointError {
    /// No checkpoint exists for the epoch. This is the normal state of an epoch
    /// that was never processed and is distinct from a checkpoint at tick 0.
    #[error("No checkpoint stored for epoch {epoch}")]
    NotFound {
        /// Epoch that was looked up.
        epoch: Epoch,
    },

    /// A stored value does not decode as a tick.
    #[error("Corrupt checkpoint for epoch {epoch}: expected 4 bytes, found {len}")]
    Corrupt {
        /// Epoch whose value is corrupt.
        epoch: Epoch,
        /// Length of the stored value.
        len: usize,
    },

    /// The underlying store failed.
    #[error("Checkpoint store error: {0}")]
    Store(#[from] sqlx::Error),
}

/// Durable mapping of epoch → last processed tick.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Persist the last processed tick of `epoch`.
    ///
    /// Must not return `Ok` before the write is synced to disk.
    async fn set_last_processed_tick(&self, epoch: Epoch, tick: Tick)
        -> Result<(), CheckpointError>;

    /// Read the last processed tick of `epoch`.
    ///
    /// Returns [`CheckpointError::NotFound`] when the epoch has no checkpoint.
    async fn get_last_processed_tick(&self, epoch: Epoch) -> Result<Tick, CheckpointError>;
}

/// Key of the checkpoint of `epoch`: prefix byte followed by the big-endian epoch.
pub fn checkpoint_key(epoch: Epoch) -> [u8; 5] {
    let mut key = [0u8; 5];
    key[0] = LAST_PROCESSED_TICK_PREFIX;
    key[1..].copy_from_slice(&epoch.to_be_bytes());
    key
}

fn decode_tick(epoch: Epoch, value: &[u8]) -> Result<Tick, CheckpointError> {
    let bytes: [u8; 4] = value.try_into().map_err(|_| CheckpointError::Corrupt {
        epoch,
        len: value.len(),
    })?;
    Ok(Tick::from_be_bytes(bytes))
}

#[async_trait]
impl CheckpointStore for Storage {
    async fn set_last_processed_tick(
        &self,
        epoch: Epoch,
        tick: Tick,
    ) -> Result<(), CheckpointError> {
        self.kv_set(&checkpoint_key(epoch), &tick.to_be_bytes())
            .await?;
        Ok(())
    }

    async fn get_last_processed_tick(&self, epoch: Epoch) -> Result<Tick, CheckpointError> {
        match self.kv_get(&checkpoint_key(epoch)).await? {
            Some(value) => decode_tick(epoch, &value),
            None => Err(CheckpointError::NotFound { epoch }),
        }
    }
}

impl Storage {
    /// All stored checkpoints, ordered by epoch.
    pub async fn list_checkpoints(&self) -> Result<Vec<Checkpoint>, CheckpointError> {
        let entries = self.kv_scan_prefix(LAST_PROCESSED_TICK_PREFIX).await?;

        let mut checkpoints = Vec::with_capacity(entries.len());
        for (key, value) in entries {
            // Keys of another length share the prefix byte but are not checkpoints.
            let Ok(epoch_bytes) = <[u8; 4]>::try_from(&key[1..]) else {
                continue;
            };
            let epoch = Epoch::from_be_bytes(epoch_bytes);
            checkpoints.push(Checkpoint {
                epoch,
                tick: decode_tick(epoch, &value)?,
            });
        }

        Ok(checkpoints)
    }
}
