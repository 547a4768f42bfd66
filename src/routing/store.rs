//! Hot-reloadable route table.
//!
//! # Responsibilities
//! - Read the routing document on demand (every request) and on change events
//! - Skip reparsing when the document's contents are unchanged
//! - Publish each new table by atomically swapping a single reference
//!
//! # Design Decisions
//! - Tables are never mutated; readers hold an `Arc` snapshot for the whole
//!   request, so a concurrent reload can never mix old and new entries
//! - Change detection uses a SHA-256 of the contents, not mtimes, so the
//!   cached path is exactly as correct as reparsing
//! - A broken document fails closed: callers get the error, never the
//!   previous table

use std::path::{Path, PathBuf};
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use sha2::{Digest, Sha256};

use crate::config::loader::{parse_route_document, ConfigError, RouteFormat};
use crate::config::schema::AggregatePathConfig;
use crate::observability::metrics;
use crate::routing::router::RouteTable;

type Fingerprint = [u8; 32];

struct Snapshot {
    fingerprint: Fingerprint,
    table: Arc<RouteTable>,
}

/// Owner of the currently published route table.
pub struct RouteStore {
    source: PathBuf,
    format: RouteFormat,
    aggregate: Vec<AggregatePathConfig>,
    current: ArcSwapOption<Snapshot>,
}

impl RouteStore {
    /// Create a store for the routing document at `source`. Nothing is read
    /// until the first `current()` / `reload()`.
    pub fn new(source: impl Into<PathBuf>, aggregate: Vec<AggregatePathConfig>) -> Self {
        let source = source.into();
        Self {
            format: RouteFormat::from_path(&source),
            source,
            aggregate,
            current: ArcSwapOption::empty(),
        }
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Fresh table for one request.
    ///
    /// Re-reads the document; reuses the published table when the contents
    /// are unchanged.
    pub async fn current(&self) -> Result<Arc<RouteTable>, ConfigError> {
        let bytes = tokio::fs::read(&self.source).await.map_err(|e| {
            tracing::error!(path = ?self.source, error = %e, "Failed to read route table");
            metrics::record_route_reload("error");
            ConfigError::Io(e)
        })?;
        self.install(&bytes)
    }

    /// Synchronous reload, for the file watcher thread.
    pub fn reload(&self) -> Result<Arc<RouteTable>, ConfigError> {
        let bytes = std::fs::read(&self.source).map_err(|e| {
            metrics::record_route_reload("error");
            ConfigError::Io(e)
        })?;
        self.install(&bytes)
    }

    /// Table most recently published, without touching the source.
    pub fn published(&self) -> Option<Arc<RouteTable>> {
        self.current.load_full().map(|s| s.table.clone())
    }

    fn install(&self, bytes: &[u8]) -> Result<Arc<RouteTable>, ConfigError> {
        let fingerprint: Fingerprint = Sha256::digest(bytes).into();

        if let Some(snapshot) = &*self.current.load() {
            if snapshot.fingerprint == fingerprint {
                return Ok(snapshot.table.clone());
            }
        }

        let table = parse_route_document(bytes, self.format)
            .and_then(|doc| RouteTable::build(&doc, &self.aggregate))
            .map_err(|e| {
                tracing::error!(path = ?self.source, error = %e, "Route table rejected");
                metrics::record_route_reload("error");
                e
            })?;

        let table = Arc::new(table);
        self.current.store(Some(Arc::new(Snapshot {
            fingerprint,
            table: table.clone(),
        })));

        tracing::info!(path = ?self.source, routes = table.len(), "Route table loaded");
        metrics::record_route_reload("ok");
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::RoutingConfig;
    use axum::http::Method;
    use std::fs;

    const ONE: &str = "routes:\n  - path: /v1/chat/completions\n    methods: [POST]\n    upstream_url: http://u1/x\n    upstream_key: K1\n";
    const TWO: &str = "routes:\n  - path: /v1/chat/completions\n    methods: [POST]\n    upstream_url: http://u2/x\n    upstream_key: K2\n";

    fn store_with(contents: &str) -> (tempfile::TempDir, RouteStore) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("routes.yml");
        fs::write(&path, contents).unwrap();
        let store = RouteStore::new(path, RoutingConfig::default().aggregate);
        (dir, store)
    }

    #[tokio::test]
    async fn unchanged_source_reuses_table() {
        let (_dir, store) = store_with(ONE);

        let first = store.current().await.unwrap();
        let second = store.current().await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn reload_is_idempotent() {
        let (dir, store) = store_with(ONE);
        let first = store.current().await.unwrap();

        // Same contents rewritten: identical matching behaviour.
        fs::write(dir.path().join("routes.yml"), ONE).unwrap();
        let second = store.reload().unwrap();

        let a = first.matches(&Method::POST, "/v1/chat/completions");
        let b = second.matches(&Method::POST, "/v1/chat/completions");
        assert_eq!(a.len(), b.len());
        assert_eq!(a[0].entry.upstream_url(), b[0].entry.upstream_url());
    }

    #[tokio::test]
    async fn changed_source_is_picked_up() {
        let (dir, store) = store_with(ONE);
        let old = store.current().await.unwrap();

        fs::write(dir.path().join("routes.yml"), TWO).unwrap();
        let new = store.current().await.unwrap();

        assert!(!Arc::ptr_eq(&old, &new));
        // The old snapshot is untouched for whoever still holds it.
        assert_eq!(old.entries()[0].upstream_url(), "http://u1/x");
        assert_eq!(new.entries()[0].upstream_url(), "http://u2/x");
    }

    #[tokio::test]
    async fn broken_source_fails_closed() {
        let (dir, store) = store_with(ONE);
        store.current().await.unwrap();

        fs::write(dir.path().join("routes.yml"), "routes: [ {").unwrap();
        assert!(store.current().await.is_err());

        fs::remove_file(dir.path().join("routes.yml")).unwrap();
        assert!(matches!(store.current().await, Err(ConfigError::Io(_))));
    }

    #[tokio::test]
    async fn concurrent_readers_see_whole_tables() {
        let (dir, store) = store_with(ONE);
        let store = Arc::new(store);
        let path = dir.path().join("routes.yml");

        let mut readers = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            readers.push(tokio::spawn(async move {
                for _ in 0..50 {
                    if let Ok(table) = store.current().await {
                        let m = table.matches(&Method::POST, "/v1/chat/completions");
                        let entry = &m.first().expect("table always has the route").entry;
                        // URL and key always come from the same document.
                        match entry.upstream_url() {
                            "http://u1/x" => assert_eq!(entry.upstream_key(), Some("K1")),
                            "http://u2/x" => assert_eq!(entry.upstream_key(), Some("K2")),
                            other => panic!("unexpected upstream {}", other),
                        }
                    }
                }
            }));
        }
        let staging = dir.path().join("routes.yml.tmp");
        for i in 0..50 {
            // Publish by rename so readers never see a half-written file.
            fs::write(&staging, if i % 2 == 0 { TWO } else { ONE }).unwrap();
            fs::rename(&staging, &path).unwrap();
            tokio::task::yield_now().await;
        }
        for r in readers {
            r.await.unwrap();
        }
    }
}
