//! Sync progress metrics and the HTTP endpoint exposing them.
//!
//! Every metric name is prefixed with the configured namespace:
//! - `<ns>_source_epoch`, `<ns>_source_tick`: frontier reported by the source
//! - `<ns>_processed_epoch`, `<ns>_processed_tick`: last checkpointed tick
//! - `<ns>_processed_tick_count`: ticks checkpointed since startup
//! - `<ns>_produced_message_count`: messages confirmed by the broker

use anyhow::Context;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use metrics::{counter, describe_counter, describe_gauge, gauge, Counter, Gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::{Arc, OnceLock, RwLock};
use tickstream_core::{Epoch, Tick};

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn metric_name(namespace: &str, name: &str) -> String {
    format!("{}_{}", namespace, name)
}

/// Install the global Prometheus recorder and describe the sync metrics.
///
/// Must run before [`SyncMetrics::new`], otherwise the handles it creates are
/// not attached to the recorder. Later calls return the installed handle.
pub fn init_metrics(namespace: &str) -> anyhow::Result<PrometheusHandle> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new()
        .install_recorder()
        .context("Failed to install Prometheus recorder")?;

    describe_gauge!(
        metric_name(namespace, "source_epoch"),
        "Current epoch of the source event service"
    );
    describe_gauge!(
        metric_name(namespace, "source_tick"),
        "Last tick processed by the source event service"
    );
    describe_gauge!(
        metric_name(namespace, "processed_epoch"),
        "Epoch of the last published tick"
    );
    describe_gauge!(
        metric_name(namespace, "processed_tick"),
        "Last published and checkpointed tick"
    );
    describe_counter!(
        metric_name(namespace, "processed_tick_count"),
        "Ticks published and checkpointed"
    );
    describe_counter!(
        metric_name(namespace, "produced_message_count"),
        "Messages confirmed by the broker"
    );

    tracing::info!("Prometheus metrics recorder initialized");
    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

/// Snapshot of the sync progress served by `GET /status`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Progress {
    /// Epoch reported by the source.
    pub source_epoch: Epoch,
    /// Tick reported by the source.
    pub source_tick: Tick,
    /// Epoch of the last checkpoint written.
    pub processed_epoch: Epoch,
    /// Tick of the last checkpoint written.
    pub processed_tick: Tick,
    /// Ticks checkpointed since startup.
    pub processed_ticks: u64,
    /// Messages confirmed since startup.
    pub produced_messages: u64,
    /// Error of the last cycle, cleared by the next successful one.
    pub last_error: Option<String>,
}

/// Metric handles of the sync loop plus an in-process progress snapshot.
#[derive(Clone)]
pub struct SyncMetrics {
    source_epoch: Gauge,
    source_tick: Gauge,
    processed_epoch: Gauge,
    processed_tick: Gauge,
    processed_ticks: Counter,
    produced_messages: Counter,
    progress: Arc<RwLock<Progress>>,
}

impl SyncMetrics {
    /// Register the sync metrics under `namespace`.
    pub fn new(namespace: &str) -> Self {
        Self {
            source_epoch: gauge!(metric_name(namespace, "source_epoch")),
            source_tick: gauge!(metric_name(namespace, "source_tick")),
            processed_epoch: gauge!(metric_name(namespace, "processed_epoch")),
            processed_tick: gauge!(metric_name(namespace, "processed_tick")),
            processed_ticks: counter!(metric_name(namespace, "processed_tick_count")),
            produced_messages: counter!(metric_name(namespace, "produced_message_count")),
            progress: Arc::new(RwLock::new(Progress::default())),
        }
    }

    fn update(&self, f: impl FnOnce(&mut Progress)) {
        let mut progress = self
            .progress
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut progress);
    }

    /// Record the source frontier.
    pub fn set_source_tick(&self, epoch: Epoch, tick: Tick) {
        self.source_epoch.set(f64::from(epoch));
        self.source_tick.set(f64::from(tick));
        self.update(|p| {
            p.source_epoch = epoch;
            p.source_tick = tick;
        });
    }

    /// Record the last checkpointed tick.
    pub fn set_processed_tick(&self, epoch: Epoch, tick: Tick) {
        self.processed_epoch.set(f64::from(epoch));
        self.processed_tick.set(f64::from(tick));
        self.update(|p| {
            p.processed_epoch = epoch;
            p.processed_tick = tick;
        });
    }

    /// Count one checkpointed tick.
    pub fn inc_processed_ticks(&self) {
        self.processed_ticks.increment(1);
        self.update(|p| p.processed_ticks += 1);
    }

    /// Count confirmed messages.
    pub fn add_produced_messages(&self, count: usize) {
        if count == 0 {
            return;
        }
        self.produced_messages.increment(count as u64);
        self.update(|p| p.produced_messages += count as u64);
    }

    /// Remember the error of a failed cycle.
    pub fn record_cycle_error(&self, error: &anyhow::Error) {
        let message = format!("{:#}", error);
        self.update(|p| p.last_error = Some(message));
    }

    /// Forget the last cycle error.
    pub fn clear_cycle_error(&self) {
        self.update(|p| p.last_error = None);
    }

    /// Current progress snapshot.
    pub fn progress(&self) -> Progress {
        self.progress
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[derive(Clone)]
struct EndpointState {
    handle: Option<PrometheusHandle>,
    metrics: SyncMetrics,
}

/// Router serving `GET /metrics` (Prometheus text) and `GET /status` (JSON).
pub fn router(handle: Option<PrometheusHandle>, metrics: SyncMetrics) -> Router {
    Router::new()
        .route("/metrics", get(serve_metrics))
        .route("/status", get(serve_status))
        .with_state(EndpointState { handle, metrics })
}

async fn serve_metrics(State(state): State<EndpointState>) -> impl IntoResponse {
    match state.handle {
        Some(handle) => (
            StatusCode::OK,
            [("content-type", "text/plain; charset=utf-8")],
            handle.render(),
        ),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            [("content-type", "text/plain; charset=utf-8")],
            "Metrics not initialized".to_string(),
        ),
    }
}

async fn serve_status(State(state): State<EndpointState>) -> Json<Progress> {
    Json(state.metrics.progress())
}

/// Serve `app` on all interfaces at `port` until the task is dropped.
pub async fn serve(port: u16, app: Router) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind metrics server to {}", addr))?;

    tracing::info!("Metrics server listening on {}", addr);
    axum::serve(listener, app)
        .await
        .context("Metrics server failed")
}
