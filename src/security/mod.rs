//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → auth.rs (service secret, before any routing)
//!     → limits.rs (declared and streamed body size)
//!     → headers.rs (strip gateway credentials and hop-by-hop headers,
//!                   inject the upstream credential)
//!     → Forward
//! ```
//!
//! # Design Decisions
//! - Fail closed: an unset secret rejects everything
//! - Secrets compared in constant time
//! - Callers never see upstream credentials; upstreams never see the
//!   gateway secret

pub mod auth;
pub mod headers;
pub mod limits;

pub use auth::{auth_middleware, AuthGate, Authenticated, SecretExtractor};
