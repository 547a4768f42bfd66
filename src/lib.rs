//! OpenAI-compatible LLM routing gateway library.

pub mod aggregate;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod routing;
pub mod security;

pub use config::schema::ProxyConfig;
pub use http::GatewayServer;
pub use lifecycle::Shutdown;
pub use routing::RouteStore;
