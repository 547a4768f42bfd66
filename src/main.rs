//! llm-gateway
//!
//! An OpenAI-compatible routing gateway: one authenticated entry point in
//! front of many LLM backends.
//!
//! # Architecture Overview
//!
//! ```text
//!                     ┌──────────────────────────────────────────────────┐
//!                     │                    GATEWAY                       │
//!   Client Request    │  ┌─────────┐   ┌──────────┐   ┌──────────────┐   │
//!   ──────────────────┼─▶│  auth   │──▶│  route   │──▶│   matcher    │   │
//!                     │  │  gate   │   │  store   │   │  (dispatch)  │   │
//!                     │  └─────────┘   └──────────┘   └──────┬───────┘   │
//!                     │                       single ┌───────┴──────┐    │
//!                     │                              ▼              ▼    │
//!                     │                      ┌────────────┐ ┌──────────┐ │
//!   Client Response   │                      │  stream    │ │aggregator│ │
//!   ◀─────────────────┼──────────────────────│ forwarder  │ │ fan-out  │ │──▶ Upstreams
//!                     │                      └────────────┘ └──────────┘ │
//!                     └──────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;

use llm_gateway::config::{read_config, ProxyConfig};
use llm_gateway::lifecycle::startup;
use llm_gateway::observability::logging::init_logging;

#[derive(Parser, Debug)]
#[command(name = "llm-gateway", version, about = "OpenAI-compatible LLM routing gateway")]
struct Args {
    /// Gateway configuration file (TOML)
    #[arg(short, long, env = "GATEWAY_CONFIG")]
    config: Option<PathBuf>,

    /// Routing document (YAML or TOML); overrides routing.routes_path
    #[arg(short, long, env = "GATEWAY_ROUTES_PATH")]
    routes: Option<String>,

    /// Listen address; overrides listener.bind_address
    #[arg(short, long, env = "GATEWAY_BIND")]
    bind: Option<String>,

    /// Service secret; overrides auth.service_secret
    #[arg(long, env = "GATEWAY_SERVICE_SECRET", hide_env_values = true)]
    service_secret: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => read_config(path)?,
        None => ProxyConfig::default(),
    };
    if let Some(routes) = args.routes {
        config.routing.routes_path = routes;
    }
    if let Some(bind) = args.bind {
        config.listener.bind_address = bind;
    }
    if let Some(secret) = args.service_secret {
        config.auth.service_secret = secret;
    }

    init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "llm-gateway starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        routes_path = %config.routing.routes_path,
        default_timeout_secs = config.timeouts.default_secs,
        "Configuration loaded"
    );

    if let Err(e) = startup::run(config).await {
        tracing::error!(error = %e, "Gateway failed");
        return Err(e.into());
    }
    Ok(())
}
