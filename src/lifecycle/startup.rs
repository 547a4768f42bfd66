//! Startup orchestration.
//!
//! # Responsibilities
//! - Validate configuration and the initial routing document
//! - Initialize subsystems in dependency order
//! - Start background tasks (route watcher, signal handlers, metrics)
//! - Bind the listener last and begin accepting traffic
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal, including a broken route file
//! - Listeners start last (traffic only when ready)

use std::sync::Arc;

use tokio::net::TcpListener;

use crate::config::validation::{validate_config, ValidationError};
use crate::config::watcher::RouteWatcher;
use crate::config::{ConfigError, ProxyConfig};
use crate::http::{GatewayError, GatewayServer};
use crate::lifecycle::{signals, Shutdown};
use crate::observability::metrics;
use crate::routing::RouteStore;

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("invalid configuration: {}", join(.0))]
    Invalid(Vec<ValidationError>),

    #[error("route table: {0}")]
    Routes(#[from] ConfigError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("route watcher: {0}")]
    Watch(#[from] notify::Error),

    #[error("listener: {0}")]
    Io(#[from] std::io::Error),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Run the gateway until SIGINT / SIGTERM.
pub async fn run(config: ProxyConfig) -> Result<(), StartupError> {
    validate_config(&config).map_err(StartupError::Invalid)?;

    let store = Arc::new(RouteStore::new(
        &config.routing.routes_path,
        config.routing.aggregate.clone(),
    ));
    let table = store.current().await?;
    tracing::info!(
        routes_path = %config.routing.routes_path,
        routes = table.len(),
        "Routes loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let shutdown = Shutdown::new();
    tokio::spawn(signals::shutdown_on_signal(shutdown.clone()));
    signals::spawn_reload_on_hangup(store.clone(), &shutdown);

    // Held for the life of the server; dropping it stops the watch.
    let _watcher = if config.routing.watch {
        Some(RouteWatcher::new(store.clone()).run()?)
    } else {
        None
    };

    let bind = config.listener.bind_address.clone();
    let server = GatewayServer::new(config, store)?;
    let listener = TcpListener::bind(&bind).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    server.run(listener, shutdown.subscribe()).await?;
    tracing::info!("Shutdown complete");
    Ok(())
}
