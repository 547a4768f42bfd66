//! HTTP server setup and request dispatch.
//!
//! # Responsibilities
//! - Create the Axum Router: one fallback handler serves every path
//! - Wire up middleware (request ID, tracing, auth gate)
//! - Resolve each request against a fresh route table
//! - Dispatch to the Stream Forwarder or the Aggregator
//! - Record request metrics
//!
//! # Design Decisions
//! - No fixed path list: whatever the route table holds is servable
//! - No global request timeout layer; it would cut off long streams.
//!   Deadlines are per request and owned by the forwarder
//! - Auth runs before routing so unauthenticated callers learn nothing
//!   about the route table

use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Body,
    extract::State,
    http::{HeaderName, Request},
    middleware,
    response::{IntoResponse, Response},
    Json, Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::aggregate::{distinct_upstreams, fan_out, merge_health, merge_models, FanOut};
use crate::config::schema::{AggregateKind, ProxyConfig};
use crate::http::forward::{Forwarder, Outbound};
use crate::http::request::{propagate_request_id_layer, request_id, set_request_id_layer};
use crate::http::response::GatewayError;
use crate::observability::metrics;
use crate::resilience::TimeoutPolicy;
use crate::routing::{Dispatch, RouteStore};
use crate::security::{auth_middleware, AuthGate, Authenticated};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<RouteStore>,
    pub forwarder: Forwarder,
    pub timeouts: TimeoutPolicy,
    /// Secret carriers and timeout controls; never forwarded.
    pub gateway_only: Arc<[HeaderName]>,
    /// Per-upstream health for callers that skipped the gate.
    pub public_health_details: bool,
}

/// HTTP server for the gateway.
pub struct GatewayServer {
    router: Router,
    config: ProxyConfig,
}

impl GatewayServer {
    /// Build the server. Fails closed when the service secret is unset.
    pub fn new(config: ProxyConfig, store: Arc<RouteStore>) -> Result<Self, GatewayError> {
        if config.auth.service_secret.is_empty() {
            return Err(GatewayError::Config("auth.service_secret is not set".to_string()));
        }

        let gate = Arc::new(AuthGate::from_config(&config.auth)?);
        let timeouts = TimeoutPolicy::from_config(&config.timeouts)?;
        let gateway_only: Arc<[HeaderName]> = gate
            .carrier_headers()
            .cloned()
            .chain(std::iter::once(timeouts.header().clone()))
            .collect();

        let state = AppState {
            store,
            forwarder: Forwarder::from_config(&config)?,
            timeouts,
            gateway_only,
            public_health_details: config.auth.public_health_details,
        };

        let router = Self::build_router(state, gate);
        Ok(Self { router, config })
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(state: AppState, gate: Arc<AuthGate>) -> Router {
        Router::new()
            .fallback(dispatch_handler)
            .with_state(state)
            .layer(middleware::from_fn_with_state(gate, auth_middleware))
            .layer(
                ServiceBuilder::new()
                    .layer(set_request_id_layer())
                    .layer(TraceLayer::new_for_http().make_span_with(
                        |request: &Request<Body>| {
                            tracing::info_span!(
                                "request",
                                method = %request.method(),
                                path = %request.uri().path(),
                                request_id = %request_id(request.headers()),
                            )
                        },
                    ))
                    .layer(propagate_request_id_layer()),
            )
    }

    /// The router, for serving it some other way (tests, embedding).
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// Serve until the shutdown channel fires, then drain in-flight requests.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Every request lands here after the auth gate.
async fn dispatch_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start = Instant::now();
    let method = request.method().clone();

    let (kind, result) = dispatch(&state, request).await;
    let response = match result {
        Ok(response) => response,
        Err(e) => {
            tracing::debug!(error = %e, "Request failed in gateway");
            e.into_response()
        }
    };

    metrics::record_request(method.as_str(), response.status().as_u16(), kind, start);
    response
}

async fn dispatch(state: &AppState, request: Request<Body>) -> (&'static str, Result<Response, GatewayError>) {
    let table = match state.store.current().await {
        Ok(table) => table,
        Err(e) => return ("none", Err(e.into())),
    };

    let (parts, body) = request.into_parts();
    let decision = match table.resolve(&parts.method, parts.uri.path()) {
        Ok(decision) => decision,
        Err(e) => {
            tracing::debug!(method = %parts.method, path = %parts.uri.path(), "No route matched");
            return ("none", Err(e));
        }
    };

    let timeout = match state.timeouts.derive(parts.uri.query(), &parts.headers) {
        Ok(timeout) => timeout,
        Err(e) => return ("none", Err(e)),
    };

    match decision {
        Dispatch::Single(route) => {
            tracing::debug!(
                upstream = %route.entry.authority(),
                pattern = %route.entry.pattern().as_str(),
                "Forwarding"
            );
            let query = state.timeouts.strip_control(parts.uri.query());
            let outbound = Outbound {
                method: parts.method,
                headers: parts.headers,
                query: query.as_deref(),
                gateway_only: &state.gateway_only,
                timeout,
            };
            ("single", state.forwarder.forward(&route, outbound, body).await)
        }
        Dispatch::Aggregate { kind, matches } => {
            let targets = distinct_upstreams(matches);
            tracing::debug!(kind = ?kind, upstreams = targets.len(), "Aggregating");
            let query = state.timeouts.strip_control(parts.uri.query());
            let plan = FanOut {
                kind,
                query: query.as_deref(),
                headers: &parts.headers,
                gateway_only: &state.gateway_only,
                per_upstream: state.timeouts.aggregate_upstream(),
                deadline: tokio::time::Instant::now() + timeout,
            };
            let results = fan_out(&state.forwarder, &targets, &plan).await;

            let body = match kind {
                AggregateKind::Models => merge_models(&results),
                AggregateKind::Health => {
                    let details = state.public_health_details
                        || parts.extensions.get::<Authenticated>().is_some();
                    let (status, body) = merge_health(&results, details);
                    tracing::info!(status = ?status, upstreams = results.len(), "Health aggregated");
                    body
                }
            };
            ("aggregate", Ok(Json(body).into_response()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use tower::ServiceExt;

    fn server(routes_yaml: &str) -> (GatewayServer, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("routes.yml");
        std::fs::write(&path, routes_yaml).unwrap();

        let mut config = ProxyConfig::default();
        config.auth.service_secret = "s3cret".into();
        let store = Arc::new(RouteStore::new(path, config.routing.aggregate.clone()));
        (GatewayServer::new(config, store).unwrap(), dir)
    }

    #[test]
    fn test_refuses_to_start_without_secret() {
        let store = Arc::new(RouteStore::new("routes.yml", Vec::new()));
        assert!(matches!(
            GatewayServer::new(ProxyConfig::default(), store),
            Err(GatewayError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_unauthenticated_request_rejected() {
        let (server, _dir) = server("routes: []\n");
        let response = server
            .router()
            .oneshot(Request::get("/v1/models").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response.headers().contains_key("x-request-id"));
    }

    #[tokio::test]
    async fn test_empty_models_aggregate() {
        let (server, _dir) = server("routes: []\n");
        let response = server
            .router()
            .oneshot(
                Request::get("/v1/models")
                    .header("x-gateway-secret", "s3cret")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(response.into_body(), 1 << 16).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["object"], "list");
        assert_eq!(json["data"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_exempt_health_hides_upstreams() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("routes.yml");
        std::fs::write(&path, "routes: []\n").unwrap();

        let mut config = ProxyConfig::default();
        config.auth.service_secret = "s3cret".into();
        config.auth.exempt_paths = vec!["/health".into()];
        let store = Arc::new(RouteStore::new(path, config.routing.aggregate.clone()));
        let router = GatewayServer::new(config, store).unwrap().router();

        let anonymous = router
            .clone()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(anonymous.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(anonymous.into_body(), 1 << 16).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json, serde_json::json!({"status": "healthy"}));

        let authenticated = router
            .oneshot(
                Request::get("/health")
                    .header("x-gateway-secret", "s3cret")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let bytes = axum::body::to_bytes(authenticated.into_body(), 1 << 16).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["upstreams"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_missing_route_file_is_500() {
        let (server, dir) = server("routes: []\n");
        std::fs::remove_file(dir.path().join("routes.yml")).unwrap();

        let response = server
            .router()
            .oneshot(
                Request::get("/v1/models")
                    .header("x-gateway-secret", "s3cret")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
