//! # Tickstream Core
//!
//! Core types and hashing utilities shared by the tickstream components.
//!
//! The source service partitions its event log into epochs, and each epoch into
//! monotonically increasing ticks. This crate models that log as it is seen by the
//! publisher:
//!
//! - **Source view**: [`SourceStatus`] and the per-epoch [`ProcessedInterval`] lists
//! - **Work units**: [`TickRange`] and [`Checkpoint`]
//! - **Events**: the source wire model ([`TickEvents`]) and the published [`Event`]
//! - **Hashing**: the deterministic idempotency id attached to every published event

#![warn(missing_docs)]

pub mod error;
pub mod hashing;
pub mod types;

pub use error::{CoreError, Result};
pub use hashing::idempotency_id;
pub use types::*;
