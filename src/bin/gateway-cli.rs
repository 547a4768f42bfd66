use std::path::{Path, PathBuf};
use std::process::ExitCode;

use axum::http::Method;
use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue};
use serde_json::Value;

use llm_gateway::config::loader::{parse_route_document, RouteFormat};
use llm_gateway::config::{load_config, ProxyConfig};
use llm_gateway::routing::{Dispatch, RouteTable};

#[derive(Parser)]
#[command(name = "gateway-cli")]
#[command(about = "Operator CLI for llm-gateway", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a routing document offline
    Check {
        /// Routing document (YAML or TOML)
        routes: PathBuf,
        /// Gateway config, for its aggregator paths
        #[arg(short, long, env = "GATEWAY_CONFIG")]
        config: Option<PathBuf>,
    },
    /// Show which upstream(s) a request would reach
    Resolve {
        routes: PathBuf,
        method: String,
        path: String,
        #[arg(short, long, env = "GATEWAY_CONFIG")]
        config: Option<PathBuf>,
    },
    /// Merged model list from a running gateway
    Models {
        #[command(flatten)]
        remote: Remote,
    },
    /// Aggregated health from a running gateway
    Health {
        #[command(flatten)]
        remote: Remote,
    },
}

#[derive(clap::Args)]
struct Remote {
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    #[arg(short, long, env = "GATEWAY_SERVICE_SECRET", hide_env_values = true)]
    secret: String,

    #[arg(long, default_value = "x-gateway-secret")]
    secret_header: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Check { routes, config } => check(&routes, config),
        Commands::Resolve {
            routes,
            method,
            path,
            config,
        } => resolve(&routes, config, &method, &path),
        Commands::Models { remote } => fetch(&remote, "/v1/models").await,
        Commands::Health { remote } => fetch(&remote, "/health").await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

type CliResult = Result<(), Box<dyn std::error::Error>>;

fn load_table(routes: &Path, config: Option<PathBuf>) -> Result<RouteTable, Box<dyn std::error::Error>> {
    let config = match config {
        Some(path) => load_config(&path)?,
        None => ProxyConfig::default(),
    };
    let bytes = std::fs::read(routes)?;
    let doc = parse_route_document(&bytes, RouteFormat::from_path(routes))?;
    Ok(RouteTable::build(&doc, &config.routing.aggregate)?)
}

fn check(routes: &Path, config: Option<PathBuf>) -> CliResult {
    let table = load_table(routes, config)?;
    println!("{}: {} route(s) OK", routes.display(), table.len());
    for entry in table.entries() {
        let methods: Vec<_> = entry.methods().iter().map(Method::as_str).collect();
        println!(
            "  {:<7} {:<40} -> {}{}{}",
            methods.join(","),
            entry.pattern().as_str(),
            entry.authority(),
            if entry.is_secure() { "" } else { " (plain http)" },
            if entry.upstream_key().is_some() { " [key]" } else { "" },
        );
    }
    Ok(())
}

fn resolve(routes: &Path, config: Option<PathBuf>, method: &str, path: &str) -> CliResult {
    let table = load_table(routes, config)?;
    let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())?;

    match table.resolve(&method, path)? {
        Dispatch::Single(m) => {
            let url = m.entry.target_url(m.param.as_ref(), None)?;
            println!("single -> {} {}", method, url);
        }
        Dispatch::Aggregate { kind, matches } => {
            println!("aggregate ({:?}) over {} route(s)", kind, matches.len());
            for m in matches {
                println!("  -> {}", m.entry.target_url(m.param.as_ref(), None)?);
            }
        }
    }
    Ok(())
}

async fn fetch(remote: &Remote, path: &str) -> CliResult {
    let mut headers = HeaderMap::new();
    headers.insert(
        reqwest::header::HeaderName::from_bytes(remote.secret_header.as_bytes())?,
        HeaderValue::from_str(&remote.secret)?,
    );

    let res = reqwest::Client::new()
        .get(format!("{}{}", remote.url.trim_end_matches('/'), path))
        .headers(headers)
        .send()
        .await?;
    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> CliResult {
    let status = res.status();
    if !status.is_success() {
        let text = res.text().await.unwrap_or_default();
        return Err(format!("gateway returned {}: {}", status, text).into());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
