//! Routing document watcher for hot reload.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};

use crate::routing::RouteStore;

/// Watches the routing document and republishes the route table on change.
///
/// Requests re-read the document anyway; the watcher keeps the published
/// table warm and surfaces broken edits in the logs as soon as they land.
pub struct RouteWatcher {
    path: PathBuf,
    store: Arc<RouteStore>,
}

impl RouteWatcher {
    pub fn new(store: Arc<RouteStore>) -> Self {
        Self {
            path: store.source().to_path_buf(),
            store,
        }
    }

    /// Start watching in a background thread. Dropping the returned watcher
    /// stops it.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let store = self.store.clone();
        let file_name = self.path.file_name().map(ToOwned::to_owned);

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if !(event.kind.is_modify() || event.kind.is_create()) {
                        return;
                    }
                    let ours = event
                        .paths
                        .iter()
                        .any(|p| p.file_name().map(ToOwned::to_owned) == file_name);
                    if !ours {
                        return;
                    }
                    tracing::info!("Route file change detected, reloading...");
                    if let Err(e) = store.reload() {
                        tracing::error!(error = %e, "Route reload failed; requests fail until the file is fixed");
                    }
                }
                Err(e) => tracing::error!("Watch error: {:?}", e),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        // Editors and deploy tools replace the file by rename, so watch the
        // directory rather than the inode.
        watcher.watch(watch_dir(&self.path), RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?self.path, "Route watcher started");
        Ok(watcher)
    }
}

fn watch_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}
