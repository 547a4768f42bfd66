//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware stack)
//!     → request.rs (request ID)
//!     → security::auth (service secret)
//!     → server.rs dispatch (fresh route table, resolve)
//!     → forward.rs (single upstream, streamed) | aggregate (fan-out, merged)
//!     → response.rs (gateway errors as OpenAI-style bodies)
//!     → Send to client
//! ```

pub mod forward;
pub mod request;
pub mod response;
pub mod server;

pub use forward::Forwarder;
pub use request::X_REQUEST_ID;
pub use response::GatewayError;
pub use server::GatewayServer;
