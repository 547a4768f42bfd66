//! Aggregator endpoints.
//!
//! # Data Flow
//! ```text
//! Dispatch::Aggregate { kind, matches }
//!     → fanout.rs (dedupe upstreams, one concurrent call each, own budget)
//!     → Vec<AggregationResult> in route-table order
//!     → merge.rs (models union / health report)
//!     → JSON response
//! ```
//!
//! # Design Decisions
//! - One failing upstream never fails the aggregate; it becomes an error
//!   result in the merged body
//! - Results are ordered by the route table, not by completion, so merges
//!   are reproducible
//! - Upstreams are identified by authority plus a key fingerprint; raw keys
//!   never appear in responses, logs or metrics

pub mod fanout;
pub mod merge;

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::routing::RouteEntry;

pub use fanout::{distinct_upstreams, fan_out, FanOut};
pub use merge::{merge_health, merge_models, HealthStatus};

/// Public name of a physical upstream: `host[:port]#<key fingerprint>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(into = "String")]
pub struct UpstreamIdentity {
    authority: String,
    fingerprint: Option<String>,
}

impl UpstreamIdentity {
    pub fn of(entry: &RouteEntry) -> Self {
        Self {
            authority: entry.authority(),
            fingerprint: entry.upstream_key().map(key_fingerprint),
        }
    }

    pub fn authority(&self) -> &str {
        &self.authority
    }
}

impl fmt::Display for UpstreamIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.fingerprint {
            Some(fp) => write!(f, "{}#{}", self.authority, fp),
            None => write!(f, "{}#-", self.authority),
        }
    }
}

impl From<UpstreamIdentity> for String {
    fn from(id: UpstreamIdentity) -> Self {
        id.to_string()
    }
}

/// First 8 hex digits of SHA-256 of the key.
fn key_fingerprint(key: &str) -> String {
    let digest = Sha256::digest(key.as_bytes());
    digest[..4].iter().map(|b| format!("{:02x}", b)).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Ok,
    Error,
}

/// Outcome of one upstream call inside an aggregate.
#[derive(Debug, Clone)]
pub struct AggregationResult {
    pub upstream: UpstreamIdentity,
    pub outcome: Outcome,
    /// Upstream HTTP status, when a response arrived at all.
    pub http_status: Option<u16>,
    /// Parsed body on success.
    pub payload: Option<serde_json::Value>,
    pub error: Option<String>,
    pub latency: Duration,
}

impl AggregationResult {
    pub fn is_ok(&self) -> bool {
        self.outcome == Outcome::Ok
    }
}
