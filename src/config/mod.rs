//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! gateway config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ProxyConfig (validated, immutable for the process lifetime)
//!
//! routing document (YAML/TOML)
//!     → loader.rs (parse into RouteDocument)
//!     → routing::RouteStore (compile, publish)
//!
//! On change:
//!     watcher.rs detects a write to the routing document
//!     → RouteStore::reload
//!     → atomic swap of the published RouteTable
//! ```
//!
//! # Design Decisions
//! - Process config is loaded once; only routes are hot-reloaded
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, read_config, ConfigError};
pub use schema::ProxyConfig;
pub use schema::RouteConfig;
pub use schema::RouteDocument;
