//! OS signal handling.
//!
//! # Responsibilities
//! - SIGINT / SIGTERM: trigger graceful shutdown
//! - SIGHUP: reload the routing document now, not shutdown
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - A failed SIGHUP reload is logged; the published table is left as is
//!   and requests keep re-reading the file

use std::sync::Arc;

use crate::lifecycle::Shutdown;
use crate::routing::RouteStore;

/// Wait for Ctrl+C or SIGTERM, then trigger `shutdown`.
pub async fn shutdown_on_signal(shutdown: Shutdown) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C"),
        _ = terminate => tracing::info!("Received SIGTERM"),
    }
    shutdown.trigger();
}

/// Reload routes on every SIGHUP until shutdown.
#[cfg(unix)]
pub fn spawn_reload_on_hangup(store: Arc<RouteStore>, shutdown: &Shutdown) {
    use tokio::signal::unix::{signal, SignalKind};

    let mut stop = shutdown.subscribe();
    tokio::spawn(async move {
        let mut hangup = match signal(SignalKind::hangup()) {
            Ok(sig) => sig,
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGHUP");
                return;
            }
        };
        loop {
            tokio::select! {
                _ = hangup.recv() => {
                    tracing::info!(path = ?store.source(), "SIGHUP received, reloading routes");
                    reload_routes(&store).await;
                }
                _ = stop.recv() => break,
            }
        }
    });
}

#[cfg(not(unix))]
pub fn spawn_reload_on_hangup(_store: Arc<RouteStore>, _shutdown: &Shutdown) {}

/// Re-read the routing document without blocking the runtime.
#[cfg_attr(not(unix), allow(dead_code))]
async fn reload_routes(store: &RouteStore) {
    if let Err(e) = store.current().await {
        tracing::error!(error = %e, "Route reload failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reload_publishes_new_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("routes.yml");
        std::fs::write(&path, "routes: []\n").unwrap();
        let store = RouteStore::new(&path, Vec::new());

        reload_routes(&store).await;
        assert_eq!(store.published().unwrap().len(), 0);

        std::fs::write(
            &path,
            "routes:\n  - path: /v1/models\n    methods: [GET]\n    upstream_url: https://u1/v1/models\n",
        )
        .unwrap();
        reload_routes(&store).await;
        assert_eq!(store.published().unwrap().len(), 1);

        // A broken document leaves the published table alone.
        std::fs::write(&path, "routes: [ {").unwrap();
        reload_routes(&store).await;
        assert_eq!(store.published().unwrap().len(), 1);
    }
}
