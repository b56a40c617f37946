//! Source-side ingestion.
//!
//! This module provides:
//! - The [`EventSource`] capability and its HTTP implementation
//! - Wire types of the source status endpoint
//! - The range reconciler that decides what to process next
//! - The sync engine that walks ranges tick by tick with durable checkpoints

pub mod events;
pub mod provider;
pub mod reconcile;
pub mod sync;

pub use provider::{EventSource, HttpEventSource};
pub use reconcile::reconcile;
pub use sync::{CycleOutcome, SyncEngine, SyncState};
