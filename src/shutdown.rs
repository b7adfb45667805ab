use std::sync::Arc;
use std::time::Duration;

use tokio::signal;
use tokio::sync::watch;
use tokio::time::Instant;

use crate::server::AppState;

const DRAIN_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Wait for a shutdown signal (SIGINT or SIGTERM).
pub async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown...");
        }
    }
}

/// Shutdown deadline, published when a signal arrives.
pub type ShutdownDeadline = watch::Receiver<Option<Instant>>;

async fn deadline(mut requested: ShutdownDeadline) -> Instant {
    loop {
        if let Some(deadline) = *requested.borrow_and_update() {
            return deadline;
        }
        if requested.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Resolves once shutdown has been requested and its deadline has passed.
///
/// Meanwhile it reports in-flight pull request actions. Returns how many were
/// still running, never resolving if the requester goes away without asking.
pub async fn grace_period(requested: ShutdownDeadline, state: Arc<AppState>) -> usize {
    let deadline = deadline(requested).await;
    let locks = state.dispatcher.locks();

    loop {
        let in_flight = locks.in_flight();
        if Instant::now() >= deadline {
            return in_flight;
        }
        if in_flight > 0 {
            tracing::info!(count = in_flight, "Waiting for in-flight deployments");
        }
        tokio::time::sleep(DRAIN_POLL_INTERVAL.min(deadline - Instant::now())).await;
    }
}

/// Wait for pull request actions that outlived their delivery, until none
/// remain or `deadline` passes. Returns how many were still running.
pub async fn drain_actions(state: &AppState, deadline: Instant) -> usize {
    let locks = state.dispatcher.locks();
    loop {
        let in_flight = locks.in_flight();
        let now = Instant::now();
        if in_flight == 0 || now >= deadline {
            return in_flight;
        }
        tracing::info!(count = in_flight, "Waiting for in-flight deployments");
        tokio::time::sleep(DRAIN_POLL_INTERVAL.min(deadline - now)).await;
    }
}
