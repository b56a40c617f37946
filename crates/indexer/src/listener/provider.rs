//! Client for the source event service.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tickstream_core::{SourceStatus, Tick, TickEvents};

use super::events::StatusResponse;

/// Read access to the source event log.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Fetch the source frontier and the available tick intervals per epoch.
    async fn get_status(&self) -> Result<SourceStatus>;

    /// Fetch all events of one tick.
    async fn get_tick_events(&self, tick: Tick) -> Result<TickEvents>;
}

/// HTTP/JSON client of the source event service.
#[derive(Debug, Clone)]
pub struct HttpEventSource {
    client: Client,
    base_url: String,
}

#[derive(Serialize)]
struct TickEventsRequest {
    tick: Tick,
}

impl HttpEventSource {
    /// Create a client for the service at `base_url`.
    pub fn new(base_url: &str, request_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn read_json<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
        what: &str,
    ) -> Result<T> {
        if response.status().is_success() {
            response
                .json()
                .await
                .with_context(|| format!("Failed to parse {} response", what))
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Source service error on {} ({status}): {body}", what)
        }
    }
}

#[async_trait]
impl EventSource for HttpEventSource {
    async fn get_status(&self) -> Result<SourceStatus> {
        let url = format!("{}/v1/status", self.base_url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("Failed to get event status")?;

        let status: StatusResponse = Self::read_json(response, "status").await?;
        Ok(status.into())
    }

    async fn get_tick_events(&self, tick: Tick) -> Result<TickEvents> {
        let url = format!("{}/v1/getTickEvents", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(&TickEventsRequest { tick })
            .send()
            .await
            .with_context(|| format!("Failed to get events of tick {}", tick))?;

        Self::read_json(response, "tick events").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{routing::get, routing::post, Json, Router};
    use serde_json::{json, Value};

    async fn spawn_source(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        format!("http://{}/", addr)
    }

    #[tokio::test]
    async fn test_get_status_and_tick_events() {
        let app = Router::new()
            .route(
                "/v1/status",
                get(|| async {
                    Json(json!({
                        "lastProcessedTick": {"tickNumber": 1234, "epoch": 120},
                        "processedTickIntervalsPerEpoch": [
                            {"epoch": 120, "intervals": [{"initialProcessedTick": 1230, "lastProcessedTick": 1234}]}
                        ]
                    }))
                }),
            )
            .route(
                "/v1/getTickEvents",
                post(|Json(body): Json<Value>| async move {
                    Json(json!({
                        "tick": body["tick"],
                        "txEvents": [{
                            "txId": "tx-1",
                            "events": [{"header": {"epoch": 120, "tick": body["tick"], "eventId": "5", "eventDigest": "6"}}]
                        }]
                    }))
                }),
            );

        let source = HttpEventSource::new(&spawn_source(app).await, Duration::from_secs(5)).unwrap();

        let status = source.get_status().await.unwrap();
        assert_eq!(status.epoch, 120);
        assert_eq!(status.tick, 1234);
        assert_eq!(status.intervals_for(120).unwrap().len(), 1);

        let events = source.get_tick_events(1231).await.unwrap();
        assert_eq!(events.tick, 1231);
        assert_eq!(events.event_count(), 1);
        assert_eq!(events.tx_events[0].events[0].header.unwrap().event_id, 5);
    }

    #[tokio::test]
    async fn test_error_status_is_reported() {
        let app = Router::new().route(
            "/v1/status",
            get(|| async { (axum::http::StatusCode::SERVICE_UNAVAILABLE, "syncing") }),
        );

        let source = HttpEventSource::new(&spawn_source(app).await, Duration::from_secs(5)).unwrap();

        let err = source.get_status().await.unwrap_err();
        let message = format!("{:#}", err);
        assert!(message.contains("503"), "{message}");
        assert!(message.contains("syncing"), "{message}");
    }
}
