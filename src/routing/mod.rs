//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Routing document (YAML/TOML on disk)
//!     → store.rs (read, fingerprint, swap in new table when changed)
//!     → entry.rs (validate each route, precompute credential header)
//!     → router.rs (compile into an immutable RouteTable)
//!
//! Incoming Request (method, path)
//!     → router.rs (collect matching entries in registration order)
//!     → matcher.rs (literal and `{param}` segment matching)
//!     → Return: Dispatch::Single, Dispatch::Aggregate, or NotFound
//! ```
//!
//! # Design Decisions
//! - Tables are immutable; reloads publish a whole new table
//! - No regex in hot path (segment matching only)
//! - Deterministic: same input always matches same route

pub mod entry;
pub mod matcher;
pub mod router;
pub mod store;

pub use entry::RouteEntry;
pub use matcher::{PathParam, PathPattern};
pub use router::{Dispatch, RouteMatch, RouteTable};
pub use store::RouteStore;
