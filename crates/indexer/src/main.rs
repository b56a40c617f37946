//! tickstream indexer - mirrors the source event log into Kafka
//!
//! This binary provides:
//! - The sync loop (source status → reconcile → publish → checkpoint)
//! - Prometheus metrics and a JSON status endpoint
//! - Offline inspection of the checkpoint store

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::time::Duration;
use tickstream_indexer::config::{Config, LoggingConfig, StorageConfig};
use tickstream_indexer::listener::{EventSource, HttpEventSource, SyncEngine};
use tickstream_indexer::metrics::{self, SyncMetrics};
use tickstream_indexer::publisher::KafkaProducer;
use tickstream_indexer::shutdown::shutdown_signal;
use tickstream_indexer::storage::Storage;
use tokio::task::JoinHandle;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "tickstream-indexer")]
#[command(version, about = "Mirrors epoch/tick partitioned events into Kafka", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "indexer.toml")]
    config: String,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the indexer service (sync loop + metrics server)
    Run,

    /// Show stored checkpoints and the source frontier
    Status,

    /// Initialize the checkpoint store
    InitDb {
        /// Store URL (defaults to the configured one)
        #[arg(long)]
        database_url: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(&cli.config)?;
    let logging = config
        .as_ref()
        .map(|config| config.logging.clone())
        .unwrap_or_default();
    init_logging(cli.debug, &logging);

    info!("tickstream indexer starting...");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => {
            let config = config.with_context(|| {
                format!("Configuration file {} is required to run", cli.config)
            })?;
            run_indexer(config).await?
        }
        Commands::Status => show_status(config.as_ref()).await?,
        Commands::InitDb { database_url } => {
            let url = database_url.unwrap_or_else(|| storage_config(config.as_ref()).url);
            init_database(&url).await?
        }
    }

    Ok(())
}

/// Load the configuration file; a missing file is not an error.
fn load_config(path: &str) -> Result<Option<Config>> {
    match Config::from_file(path) {
        Ok(config) => Ok(Some(config)),
        Err(e) => {
            // Config::from_file wraps the io error with context
            let is_not_found = e.chain().any(|cause| {
                cause
                    .downcast_ref::<std::io::Error>()
                    .is_some_and(|io_err| io_err.kind() == std::io::ErrorKind::NotFound)
            });

            if is_not_found {
                Ok(None)
            } else {
                Err(e).context("Failed to load config file")
            }
        }
    }
}

fn storage_config(config: Option<&Config>) -> StorageConfig {
    config
        .map(|config| config.storage.clone())
        .unwrap_or_default()
}

/// Initialize tracing subscriber for logging
fn init_logging(debug: bool, logging: &LoggingConfig) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let env_filter = if debug {
        EnvFilter::new("tickstream_indexer=debug,tickstream_core=debug,sqlx=warn")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "tickstream_indexer={0},tickstream_core={0}",
                logging.level
            ))
        })
    };

    let registry = tracing_subscriber::registry().with(env_filter);
    if logging.format == "json" {
        registry.with(fmt::layer().json().with_target(true)).init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_line_number(true))
            .init();
    }
}

/// Main indexer service - runs the sync loop and the metrics server
async fn run_indexer(config: Config) -> Result<()> {
    info!("Configuration loaded successfully");
    info!("  Source: {}", config.source.url);
    info!("  Brokers: {}", config.broker.bootstrap_servers);
    info!("  Topic: {}", config.broker.produce_topic);
    info!("  Store: {}", config.storage.url);
    info!("  Start epoch: {}", config.sync.start_epoch);

    let storage = Storage::new(&config.storage.url)
        .await
        .context("Failed to open checkpoint store")?;
    storage
        .run_migrations()
        .await
        .context("Failed to run migrations")?;

    let producer = KafkaProducer::new(&config.broker)?;
    producer
        .check_connectivity(Duration::from_secs(
            config.broker.startup_check_timeout_secs,
        ))
        .await
        .context("Kafka startup check failed")?;

    let source = HttpEventSource::new(
        &config.source.url,
        Duration::from_secs(config.source.request_timeout_secs),
    )?;

    let shutdown = shutdown_signal()?;

    let prometheus = metrics::init_metrics(&config.metrics.namespace)?;
    let sync_metrics = SyncMetrics::new(&config.metrics.namespace);

    let metrics_handle = if config.metrics.port > 0 {
        let app = metrics::router(Some(prometheus), sync_metrics.clone());
        Some(tokio::spawn(metrics::serve(config.metrics.port, app)))
    } else {
        info!("Metrics server disabled");
        None
    };

    let sync_handle = if config.sync.enabled {
        let engine = SyncEngine::new(
            source,
            producer.clone(),
            storage.clone(),
            sync_metrics,
            config.sync.clone(),
        );
        let start_epoch = config.sync.start_epoch;
        Some(tokio::spawn(async move { engine.run(start_epoch).await }))
    } else {
        info!("Sync loop disabled");
        None
    };

    let abort_handles: Vec<_> = [&sync_handle, &metrics_handle]
        .into_iter()
        .flatten()
        .map(|handle| handle.abort_handle())
        .collect();

    info!("Indexer is running. Press Ctrl+C or send SIGTERM to stop.");

    // Wait for a shutdown signal or task failures
    let result = tokio::select! {
        result = supervise("Sync engine", sync_handle) => result,
        result = supervise("Metrics server", metrics_handle) => result,
        signal = shutdown => {
            info!("Received {}, gracefully shutting down...", signal);
            Ok(())
        }
    };

    for handle in abort_handles {
        handle.abort();
    }
    if let Err(e) = producer.flush(Duration::from_secs(5)).await {
        warn!("{:#}", e);
    }
    storage.close().await;

    result
}

/// Wait for a spawned task; never resolves when there is no task.
async fn supervise(name: &str, handle: Option<JoinHandle<Result<()>>>) -> Result<()> {
    let Some(handle) = handle else {
        return std::future::pending().await;
    };

    match handle.await {
        Ok(Ok(())) => {
            warn!("{} exited unexpectedly", name);
            Ok(())
        }
        Ok(Err(e)) => Err(e).with_context(|| format!("{} failed", name)),
        Err(e) => Err(anyhow::anyhow!("{} task panicked: {}", name, e)),
    }
}

/// Show stored checkpoints and the source frontier
async fn show_status(config: Option<&Config>) -> Result<()> {
    let storage_url = storage_config(config).url;
    info!("Checking indexer status ({})", storage_url);

    let storage = Storage::new(&storage_url)
        .await
        .context("Failed to open checkpoint store")?;
    storage
        .run_migrations()
        .await
        .context("Failed to run migrations")?;

    let checkpoints = storage.list_checkpoints().await?;

    println!("\n=== tickstream Indexer Status ===\n");
    println!("Checkpoints:");
    if checkpoints.is_empty() {
        println!("  No ticks processed yet.");
    }
    for checkpoint in &checkpoints {
        println!(
            "  Epoch {}: last processed tick {}",
            checkpoint.epoch, checkpoint.tick
        );
    }

    if let Some(config) = config {
        println!("\nSource ({}):", config.source.url);
        let status = match HttpEventSource::new(
            &config.source.url,
            Duration::from_secs(config.source.request_timeout_secs),
        ) {
            Ok(source) => source.get_status().await,
            Err(e) => Err(e),
        };
        match status {
            Ok(status) => {
                println!("  Epoch: {}", status.epoch);
                println!("  Last Tick: {}", status.tick);
                for (epoch, intervals) in &status.intervals {
                    let ranges: Vec<String> = intervals
                        .iter()
                        .map(|interval| format!("[{}..={}]", interval.from, interval.to))
                        .collect();
                    println!("  Epoch {} intervals: {}", epoch, ranges.join(" "));
                }
            }
            Err(e) => println!("  Unreachable: {:#}", e),
        }
    }

    println!();

    storage.close().await;

    Ok(())
}

/// Initialize the checkpoint store
async fn init_database(database_url: &str) -> Result<()> {
    info!("Initializing store: {}", database_url);

    let storage = Storage::new(database_url)
        .await
        .context("Failed to open checkpoint store")?;

    storage
        .run_migrations()
        .await
        .context("Failed to run migrations")?;

    storage
        .health_check()
        .await
        .context("Store health check failed")?;

    let checkpoints = storage.list_checkpoints().await?;
    info!("Store initialized successfully!");
    info!("  Epochs with checkpoints: {}", checkpoints.len());

    storage.close().await;

    Ok(())
}
