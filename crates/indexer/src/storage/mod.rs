//! Storage layer for the tickstream indexer.
//!
//! The indexer keeps its durable state in an ordered key-value table inside an
//! embedded SQLite database. Keys start with a one-byte namespace prefix so that
//! entries of one kind sort and scan contiguously:
//!
//! - `0x00 || epoch (u32 BE)` → last processed tick (u32 BE), see [`checkpoint`]
//!
//! Every write is committed with `synchronous = FULL`, so a write that returned
//! successfully survives an immediate crash.

use anyhow::{Context, Result};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::Row;
use std::path::Path;
use std::str::FromStr;
use tracing::info;

pub mod checkpoint;

pub use checkpoint::{CheckpointError, CheckpointStore, LAST_PROCESSED_TICK_PREFIX};

/// Durable store for the indexer.
///
/// Cloning is cheap: clones share the same connection pool.
#[derive(Debug, Clone)]
pub struct Storage {
    pool: SqlitePool,
}

impl Storage {
    /// Open (and create if missing) the store at the given SQLite URL.
    ///
    /// # Example
    /// ```no_run
    /// # use tickstream_indexer::storage::Storage;
    /// # async fn example() -> anyhow::Result<()> {
    /// let storage = Storage::new("sqlite://events-publisher.db").await?;
    /// storage.run_migrations().await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn new(database_url: &str) -> Result<Self> {
        info!("Opening store: {}", database_url);

        let options = SqliteConnectOptions::from_str(database_url)
            .with_context(|| format!("Invalid store URL: {}", database_url))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Full);

        // Single writer; one connection keeps reads ordered after writes.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .connect_with(options)
            .await
            .context("Failed to open store")?;

        info!("Store opened");

        Ok(Self { pool })
    }

    /// Open the store at a specific file path.
    pub async fn new_with_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let database_url = format!("sqlite://{}", path.as_ref().display());
        Self::new(&database_url).await
    }

    /// Run schema migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running store migrations");

        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to run migrations")?;

        Ok(())
    }

    /// Close the connection pool.
    pub async fn close(&self) {
        info!("Closing store");
        self.pool.close().await;
    }

    /// Check that the store answers queries.
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("Store health check failed")?;

        Ok(())
    }

    /// Read the value stored under `key`.
    pub(crate) async fn kv_get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, sqlx::Error> {
        sqlx::query_scalar("SELECT value FROM kv WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
    }

    /// Insert or overwrite the value under `key`.
    pub(crate) async fn kv_set(&self, key: &[u8], value: &[u8]) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO kv (key, value)
            VALUES (?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// All entries whose key starts with `prefix`, in key order.
    pub(crate) async fn kv_scan_prefix(
        &self,
        prefix: u8,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, sqlx::Error> {
        let lower = vec![prefix];
        let rows = match prefix.checked_add(1) {
            Some(next) => {
                sqlx::query("SELECT key, value FROM kv WHERE key >= ? AND key < ? ORDER BY key")
                    .bind(lower)
                    .bind(vec![next])
                    .fetch_all(&self.pool)
                    .await?
            }
            None => {
                sqlx::query("SELECT key, value FROM kv WHERE key >= ? ORDER BY key")
                    .bind(lower)
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        Ok(rows
            .into_iter()
            .map(|row| (row.get("key"), row.get("value")))
            .collect())
    }
}
