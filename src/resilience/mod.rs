//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Request to backend:
//!     → timeouts.rs (derive and enforce the per-request deadline)
//!     → On expiry: 504, no retry
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every external call has a deadline
//! - No retries inside the gateway: request bodies are streamed and cannot
//!   be replayed; resiliency policy belongs to the caller

pub mod timeouts;

pub use timeouts::TimeoutPolicy;
