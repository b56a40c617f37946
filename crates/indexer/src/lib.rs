//! Epoch/tick event log mirroring from the source event service into Kafka.
//!
//! This crate provides:
//! - A client for the source event service (status + per-tick events)
//! - Range reconciliation against durable per-epoch checkpoints
//! - A tick publisher that waits for every delivery before a tick counts as done
//! - The sync loop tying these together, plus metrics and a status endpoint
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────┐
//! │  tickstream-indexer                  │
//! │                                      │
//! │  ┌──────────────────┐                │
//! │  │   Sync Engine    │ ← Source service
//! │  │   (tokio task)   │   /v1/status
//! │  └───┬─────────┬────┘   /v1/getTickEvents
//! │      │         │                     │
//! │  ┌───▼─────┐ ┌─▼──────────────┐      │
//! │  │Reconcile│ │ Tick Publisher │ → Kafka
//! │  └───┬─────┘ └─┬──────────────┘  (barrier per tick)
//! │      │         │                     │
//! │  ┌───▼─────────▼────┐                │
//! │  │ Checkpoint Store │ ← SQLite kv    │
//! │  │ epoch → last tick│   WAL, FULL    │
//! │  └──────────────────┘                │
//! │                                      │
//! │  GET /metrics, GET /status (axum)    │
//! └──────────────────────────────────────┘
//! ```
//!
//! A tick is checkpointed only after all of its messages were confirmed, so a
//! restart never skips a tick; it may resend the tick that was in flight.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod listener;
pub mod metrics;
pub mod publisher;
pub mod shutdown;
pub mod storage;

// Re-export common types
pub use tickstream_core::{types::*, *};
