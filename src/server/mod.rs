//! Listener, worker pool and the glue that runs them until shutdown.

pub mod listener;
pub mod pool;
pub mod tracker;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::config::Config;
use crate::error::ServerError;
use crate::router::Router;
use listener::Listener;
use tracker::SessionTracker;

/// Binds the configured endpoint and serves until `shutdown` resolves.
///
/// Accepting stops first; sessions already in flight then get up to the
/// configured grace period to finish before this returns.
pub async fn run<F>(cfg: &Config, threads: usize, shutdown: F) -> Result<(), ServerError>
where
    F: Future<Output = ()>,
{
    let router = Arc::new(Router::with_default_routes(cfg.routing.method_policy));
    let listener = Listener::bind(cfg.endpoint()?, router, cfg.limits.session_limits()).await?;

    serve(listener, threads, cfg.server.shutdown_grace(), shutdown).await;
    Ok(())
}

/// Runs `listener`'s accept loop on the pool until `shutdown` resolves, then
/// drains.
///
/// The accept loop is a task of its own, so accepts complete on the worker
/// threads whatever thread is polling this future.
pub async fn serve<F>(listener: Listener, threads: usize, grace: Duration, shutdown: F)
where
    F: Future<Output = ()>,
{
    let tracker = listener.tracker();

    info!(
        address = %listener.local_addr().ip(),
        port = listener.local_addr().port(),
        threads,
        "Listening on http://{}",
        listener.local_addr()
    );

    let mut accept = tokio::spawn(listener.accept_loop());

    let stopped = tokio::select! {
        res = &mut accept => Some(res),
        _ = shutdown => None,
    };

    match stopped {
        Some(Ok(())) => warn!("accept loop returned"),
        Some(Err(e)) => warn!(error = %e, "accept loop stopped"),
        None => {
            info!("Shutdown signal received, no longer accepting");
            accept.abort();
            // The listening socket closes once the aborted task is gone.
            let _ = accept.await;
        }
    }

    drain(&tracker, grace).await;
}

/// Waits for live sessions to finish, giving up after `grace`.
pub async fn drain(tracker: &SessionTracker, grace: Duration) {
    let in_flight = tracker.active();
    if in_flight == 0 {
        return;
    }

    info!(in_flight, "waiting for sessions to finish");
    if tokio::time::timeout(grace, tracker.wait_idle()).await.is_err() {
        warn!(
            remaining = tracker.active(),
            grace_ms = grace.as_millis() as u64,
            "grace period elapsed, dropping in-flight sessions"
        );
    }
}
