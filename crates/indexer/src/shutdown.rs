//! Process shutdown signals.

use anyhow::Result;
use std::future::Future;
use tracing::warn;

/// Install the shutdown signal handlers and return a future that resolves with
/// the name of the first signal received (`"SIGINT"` or `"SIGTERM"`).
///
/// The SIGTERM handler is registered before this returns, so a signal sent
/// after the call is never lost to the default handler.
pub fn shutdown_signal() -> Result<impl Future<Output = &'static str>> {
    #[cfg(unix)]
    let mut terminate = {
        use anyhow::Context;
        use tokio::signal::unix::{signal, SignalKind};

        signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?
    };

    Ok(async move {
        let ctrl_c = async {
            match tokio::signal::ctrl_c().await {
                Ok(()) => "SIGINT",
                Err(e) => {
                    warn!("Failed to listen for Ctrl+C: {}", e);
                    std::future::pending().await
                }
            }
        };

        #[cfg(unix)]
        let terminate = async move {
            terminate.recv().await;
            "SIGTERM"
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<&'static str>();

        tokio::select! {
            signal = ctrl_c => signal,
            signal = terminate => signal,
        }
    })
}
