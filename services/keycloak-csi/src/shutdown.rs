//! Graceful shutdown
//!
//! SIGINT or SIGTERM cancels a root token; the server stops accepting calls
//! and in-flight requests observe the cancellation through their contexts.

use std::future::Future;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Waits for SIGTERM or SIGINT
pub async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C, initiating shutdown"),
        () = terminate => info!("Received SIGTERM, initiating shutdown"),
    }
}

/// Cancels `token` once `signal` resolves.
pub fn cancel_on<S>(signal: S, token: CancellationToken) -> tokio::task::JoinHandle<()>
where
    S: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        tokio::select! {
            () = signal => token.cancel(),
            () = token.cancelled() => {}
        }
    })
}

/// Runs a server until it stops on its own or `token` is cancelled.
///
/// After cancellation the server gets `shutdown_timeout` to drain.
///
/// # Errors
///
/// Returns the server's own error. A drain that outlasts
/// `shutdown_timeout` is logged and reported as `Ok`.
pub async fn run_with_graceful_shutdown<F, E>(
    server_future: F,
    token: CancellationToken,
    shutdown_timeout: Duration,
) -> Result<(), E>
where
    F: Future<Output = Result<(), E>> + Send,
    E: std::fmt::Display,
{
    tokio::pin!(server_future);

    tokio::select! {
        result = &mut server_future => return log_exit(result),
        () = token.cancelled() => info!("Shutdown signal received"),
    }

    match tokio::time::timeout(shutdown_timeout, server_future).await {
        Ok(result) => log_exit(result),
        Err(_) => {
            warn!(
                timeout_secs = shutdown_timeout.as_secs(),
                "Shutdown timeout reached, abandoning in-flight calls"
            );
            Ok(())
        }
    }
}

fn log_exit<E: std::fmt::Display>(result: Result<(), E>) -> Result<(), E> {
    match &result {
        Ok(()) => info!("Server stopped normally"),
        Err(e) => error!(error = %e, "Server error"),
    }
    result
}
