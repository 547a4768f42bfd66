//! Route table lookup and dispatch.
//!
//! # Responsibilities
//! - Compile a routing document into an immutable `RouteTable`
//! - Look up every entry matching (method, path), in registration order
//! - Decide between single-route dispatch and aggregator fan-out
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - O(n) scan over entries (acceptable for typical route counts)
//! - Explicit NotFound rather than silent default
//! - Ambiguous non-aggregator routes: first registered wins, loudly

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use axum::http::Method;

use crate::config::loader::ConfigError;
use crate::config::schema::{AggregateKind, AggregatePathConfig, RouteDocument};
use crate::config::validation::ValidationError;
use crate::http::response::GatewayError;
use crate::routing::entry::RouteEntry;
use crate::routing::matcher::{normalize_path, PathParam};

/// An entry selected for a request, with its captured path parameter.
#[derive(Debug, Clone)]
pub struct RouteMatch {
    pub entry: Arc<RouteEntry>,
    pub param: Option<PathParam>,
}

/// What the dispatch layer should do with a request.
#[derive(Debug, Clone)]
pub enum Dispatch {
    /// Forward to exactly one upstream.
    Single(RouteMatch),
    /// Fan out to every matching upstream and merge. May be empty.
    Aggregate {
        kind: AggregateKind,
        matches: Vec<RouteMatch>,
    },
}

/// The full, immutable set of route entries in effect at a point in time.
#[derive(Debug, Default)]
pub struct RouteTable {
    entries: Vec<Arc<RouteEntry>>,
    aggregate: HashMap<String, AggregateKind>,
}

impl RouteTable {
    /// Compile and validate a routing document.
    pub fn build(doc: &RouteDocument, aggregate: &[AggregatePathConfig]) -> Result<Self, ConfigError> {
        let aggregate: HashMap<String, AggregateKind> = aggregate
            .iter()
            .map(|a| (normalize_path(&a.path), a.kind))
            .collect();

        let mut errors = Vec::new();
        let mut entries = Vec::with_capacity(doc.routes.len());
        for (i, raw) in doc.routes.iter().enumerate() {
            match RouteEntry::from_config(i, raw) {
                Ok(entry) => entries.push((i, entry)),
                Err(mut e) => errors.append(&mut e),
            }
        }

        check_bindings(&entries, &aggregate, &mut errors);
        if !errors.is_empty() {
            return Err(ConfigError::Validation(errors));
        }

        Ok(Self {
            entries: entries.into_iter().map(|(_, e)| Arc::new(e)).collect(),
            aggregate,
        })
    }

    pub fn entries(&self) -> &[Arc<RouteEntry>] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Aggregator kind of a path, if it is designated as one.
    pub fn aggregate_kind(&self, path: &str) -> Option<AggregateKind> {
        self.aggregate.get(&normalize_path(path)).copied()
    }

    /// Every entry matching (method, path), in registration order.
    pub fn matches(&self, method: &Method, path: &str) -> Vec<RouteMatch> {
        let path = normalize_path(path);
        self.entries
            .iter()
            .filter(|entry| entry.allows(method))
            .filter_map(|entry| {
                entry.pattern().matches(&path).map(|param| RouteMatch {
                    entry: entry.clone(),
                    param,
                })
            })
            .collect()
    }

    /// Resolve a request into a dispatch decision.
    ///
    /// Only `GET` fans out on an aggregator path, even with no registered
    /// upstreams, so callers always receive a well-formed (possibly empty)
    /// aggregate. Other verbs there dispatch like any other path.
    pub fn resolve(&self, method: &Method, path: &str) -> Result<Dispatch, GatewayError> {
        let mut matches = self.matches(method, path);

        if let Some(kind) = self.aggregate_kind(path) {
            if method.as_str().eq_ignore_ascii_case(Method::GET.as_str()) {
                return Ok(Dispatch::Aggregate { kind, matches });
            }
        }

        match matches.len() {
            0 => Err(GatewayError::NotFound {
                method: method.to_string(),
                path: path.to_string(),
            }),
            1 => Ok(Dispatch::Single(matches.remove(0))),
            n => {
                tracing::warn!(
                    path = %path,
                    method = %method,
                    candidates = n,
                    "Multiple routes match a non-aggregator path; using first registered"
                );
                Ok(Dispatch::Single(matches.remove(0)))
            }
        }
    }
}

/// Reject exact duplicates and warn about ambiguous non-aggregator bindings.
fn check_bindings(
    entries: &[(usize, RouteEntry)],
    aggregate: &HashMap<String, AggregateKind>,
    errors: &mut Vec<ValidationError>,
) {
    // Exact duplicates are never legitimate, aggregator or not.
    let mut seen: HashSet<(&str, &Method, &str, Option<&str>)> = HashSet::new();
    let mut bindings: HashMap<(&str, &Method), usize> = HashMap::new();
    for (i, entry) in entries {
        for method in entry.methods() {
            let identity = (
                entry.pattern().as_str(),
                method,
                entry.upstream_url(),
                entry.upstream_key(),
            );
            if !seen.insert(identity) {
                errors.push(ValidationError::new(
                    format!("routes[{}]", i),
                    format!(
                        "duplicate route {} {} -> {}",
                        method,
                        entry.pattern().as_str(),
                        entry.upstream_url()
                    ),
                ));
            }
            *bindings.entry((entry.pattern().as_str(), method)).or_default() += 1;
        }
    }

    if !errors.is_empty() {
        return;
    }
    for ((path, method), count) in &bindings {
        let fans_out = aggregate.contains_key(*path) && **method == Method::GET;
        if *count > 1 && !fans_out {
            tracing::warn!(
                path = %path,
                method = %method,
                bindings = count,
                "Ambiguous route on non-aggregator path; first registered entry wins"
            );
        }
    }
}
