//! Shared utilities for integration tests.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::{extract::Request, middleware::Next, response::Response, Router};
use llm_gateway::{GatewayServer, ProxyConfig, RouteStore, Shutdown};
use tempfile::TempDir;
use tokio::net::TcpListener;

pub const SECRET: &str = "test-secret";

/// A mock upstream on an ephemeral loopback port.
pub struct MockUpstream {
    pub addr: SocketAddr,
    calls: Arc<AtomicUsize>,
}

impl MockUpstream {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

/// Serve `app` on 127.0.0.1, counting every request it receives.
pub async fn start_upstream(app: Router) -> MockUpstream {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let app = app.layer(axum::middleware::from_fn(move |req: Request, next: Next| {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            let res: Response = next.run(req).await;
            res
        }
    }));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    MockUpstream { addr, calls }
}

/// A gateway running in-process against a route file in a temp dir.
pub struct TestGateway {
    pub addr: SocketAddr,
    pub routes_path: PathBuf,
    shutdown: Shutdown,
    _dir: TempDir,
}

impl TestGateway {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Replace the route file the way deploy tools do: write aside, rename.
    pub fn write_routes(&self, yaml: &str) {
        let staging = self.routes_path.with_extension("yml.tmp");
        std::fs::write(&staging, yaml).unwrap();
        std::fs::rename(&staging, &self.routes_path).unwrap();
    }
}

impl Drop for TestGateway {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

pub async fn start_gateway(routes_yaml: &str) -> TestGateway {
    start_gateway_with(routes_yaml, |_| {}).await
}

pub async fn start_gateway_with(routes_yaml: &str, tweak: impl FnOnce(&mut ProxyConfig)) -> TestGateway {
    let dir = tempfile::tempdir().unwrap();
    let routes_path = dir.path().join("routes.yml");
    std::fs::write(&routes_path, routes_yaml).unwrap();

    let mut config = ProxyConfig::default();
    config.auth.service_secret = SECRET.to_string();
    config.routing.routes_path = routes_path.to_string_lossy().into_owned();
    config.routing.watch = false;
    config.security.insecure_upstream_allowlist = vec!["127.0.0.1".to_string()];
    tweak(&mut config);

    let store = Arc::new(RouteStore::new(&routes_path, config.routing.aggregate.clone()));
    let server = GatewayServer::new(config, store).unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let rx = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, rx).await;
    });

    TestGateway {
        addr,
        routes_path,
        shutdown,
        _dir: dir,
    }
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}

/// One route entry as YAML.
pub fn route(path: &str, methods: &str, upstream_url: &str, key: Option<&str>) -> String {
    let mut s = format!(
        "  - path: {}\n    methods: [{}]\n    upstream_url: {}\n",
        path, methods, upstream_url
    );
    if let Some(key) = key {
        s.push_str(&format!("    upstream_key: {}\n", key));
    }
    s
}

pub fn routes(entries: &[String]) -> String {
    if entries.is_empty() {
        return "routes: []\n".to_string();
    }
    format!("routes:\n{}", entries.concat())
}
