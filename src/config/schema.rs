//! Configuration schema definitions.
//!
//! This module defines the process-wide configuration for the gateway and
//! the on-disk shape of the routing document. All types derive Serde traits
//! for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the gateway.
///
/// Read once at startup and never mutated afterwards. Routing lives in a
/// separate, hot-reloadable document referenced by `routing.routes_path`.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Inbound authentication.
    pub auth: AuthConfig,

    /// Routing source and aggregator endpoints.
    pub routing: RoutingConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Body-size and transport-security policy.
    pub security: SecurityConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Inbound authentication configuration.
#[derive(Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Secret every caller must present. Empty is rejected at startup.
    pub service_secret: String,

    /// Dedicated header carrying the secret.
    pub secret_header: String,

    /// Exact paths that bypass the auth gate.
    pub exempt_paths: Vec<String>,

    /// Show per-upstream health to callers without the secret. Off by
    /// default: an exempt health path then reports only the verdict.
    pub public_health_details: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            service_secret: String::new(),
            secret_header: "x-gateway-secret".to_string(),
            exempt_paths: Vec::new(),
            public_health_details: false,
        }
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("service_secret", &"<redacted>")
            .field("secret_header", &self.secret_header)
            .field("exempt_paths", &self.exempt_paths)
            .field("public_health_details", &self.public_health_details)
            .finish()
    }
}

/// Kind of merge an aggregator endpoint performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregateKind {
    /// Union of model identifiers across upstreams.
    Models,
    /// Per-upstream status plus an overall verdict.
    Health,
}

/// A path designated to fan out to every matching upstream.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct AggregatePathConfig {
    pub path: String,
    pub kind: AggregateKind,
}

/// Routing source configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Path to the routing document (YAML or TOML).
    pub routes_path: String,

    /// Watch the routing document and reload proactively on change.
    pub watch: bool,

    /// Aggregator endpoints.
    pub aggregate: Vec<AggregatePathConfig>,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            routes_path: "routes.yml".to_string(),
            watch: true,
            aggregate: vec![
                AggregatePathConfig {
                    path: "/v1/models".to_string(),
                    kind: AggregateKind::Models,
                },
                AggregatePathConfig {
                    path: "/health".to_string(),
                    kind: AggregateKind::Health,
                },
            ],
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Upstream timeout when the caller supplies none, in seconds.
    pub default_secs: u64,

    /// Ceiling applied to caller-supplied timeouts, in seconds.
    pub max_secs: u64,

    /// Connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Budget of each individual call in an aggregate, in seconds.
    pub aggregate_upstream_secs: u64,

    /// Query parameter carrying a per-request timeout.
    pub query_param: String,

    /// Header carrying a per-request timeout.
    pub header: String,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            default_secs: 600,
            max_secs: 3600,
            connect_secs: 10,
            aggregate_upstream_secs: 10,
            query_param: "timeout".to_string(),
            header: "x-request-timeout".to_string(),
        }
    }
}

/// Security policy for forwarded traffic.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Maximum inbound body size in bytes.
    pub max_body_size: u64,

    /// Hosts that may be reached over plain `http://`.
    pub insecure_upstream_allowlist: Vec<String>,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_body_size: 100 * 1024 * 1024, // 100MB
            insecure_upstream_allowlist: Vec::new(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log line format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Root of the routing document.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct RouteDocument {
    #[serde(default)]
    pub routes: Vec<RouteConfig>,
}

/// One raw route as written by the operator.
///
/// Turned into a validated [`crate::routing::RouteEntry`] at load time.
#[derive(Clone, Deserialize, Serialize)]
pub struct RouteConfig {
    /// Exact path or a path with one `{param}` segment.
    pub path: String,

    /// HTTP verbs, case-insensitive.
    pub methods: Vec<String>,

    /// Absolute URL of the backend endpoint.
    pub upstream_url: String,

    /// Credential for the upstream. Absent means none is injected.
    #[serde(default)]
    pub upstream_key: Option<String>,

    /// Header carrying the credential.
    #[serde(default = "default_key_header")]
    pub upstream_key_header: String,

    /// Prepended to the credential in the header value.
    #[serde(default = "default_key_prefix")]
    pub upstream_key_prefix: String,
}

fn default_key_header() -> String {
    "Authorization".to_string()
}

fn default_key_prefix() -> String {
    "Bearer ".to_string()
}

impl std::fmt::Debug for RouteConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteConfig")
            .field("path", &self.path)
            .field("methods", &self.methods)
            .field("upstream_url", &self.upstream_url)
            .field("upstream_key", &self.upstream_key.as_ref().map(|_| "<redacted>"))
            .field("upstream_key_header", &self.upstream_key_header)
            .field("upstream_key_prefix", &self.upstream_key_prefix)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_uses_defaults() {
        let config: ProxyConfig = toml::from_str(
            r#"
            [auth]
            service_secret = "s3cret"
            "#,
        )
        .unwrap();

        assert_eq!(config.auth.secret_header, "x-gateway-secret");
        assert_eq!(config.timeouts.default_secs, 600);
        assert_eq!(config.routing.aggregate.len(), 2);
        assert_eq!(config.routing.aggregate[1].kind, AggregateKind::Health);
    }

    #[test]
    fn route_defaults_to_bearer_authorization() {
        let doc: RouteDocument = serde_yaml::from_str(
            "routes:\n  - path: /v1/embeddings\n    methods: [post]\n    upstream_url: https://u/v1/embeddings\n    upstream_key: k\n",
        )
        .unwrap();

        let route = &doc.routes[0];
        assert_eq!(route.upstream_key_header, "Authorization");
        assert_eq!(route.upstream_key_prefix, "Bearer ");
    }

    #[test]
    fn debug_output_redacts_credentials() {
        let mut config = ProxyConfig::default();
        config.auth.service_secret = "top-secret".into();
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("top-secret"));

        let route = RouteConfig {
            path: "/x".into(),
            methods: vec!["GET".into()],
            upstream_url: "https://u/x".into(),
            upstream_key: Some("sk-live".into()),
            upstream_key_header: default_key_header(),
            upstream_key_prefix: default_key_prefix(),
        };
        assert!(!format!("{:?}", route).contains("sk-live"));
    }
}
