//! Development-mode file watching.
//!
//! Artifact changes under the app root are debounced; once the tree has been
//! quiet for the configured window the route table is rebuilt, swapped in,
//! and every live client is told to reload.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::app::App;
use crate::routing::is_artifact_path;

/// How often pending changes are checked while events are quiet.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Collects changed paths until none has changed for `window`.
#[derive(Debug)]
pub struct Debouncer {
    window: Duration,
    pending: HashMap<PathBuf, Instant>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: HashMap::new(),
        }
    }

    pub fn record(&mut self, path: PathBuf, at: Instant) {
        self.pending.insert(path, at);
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Take the batch if the most recent change is older than the window.
    ///
    /// A burst is released as a whole, never piecemeal, so one burst causes
    /// one rebuild.
    pub fn take_ready(&mut self, now: Instant) -> Option<Vec<PathBuf>> {
        let latest = self.pending.values().max()?;
        if now.duration_since(*latest) < self.window {
            return None;
        }
        let mut paths: Vec<PathBuf> = self.pending.drain().map(|(path, _)| path).collect();
        paths.sort();
        Some(paths)
    }
}

/// Watch `app`'s root until the watcher channel closes.
pub async fn watch(app: Arc<App>) -> notify::Result<()> {
    let root = app.config().app_root.clone();
    let extensions = app.config().extensions.clone();
    let (tx, mut rx) = mpsc::channel::<notify::Result<Event>>(256);

    // The callback runs on notify's own thread.
    let mut watcher = RecommendedWatcher::new(
        move |res| {
            let _ = tx.blocking_send(res);
        },
        Config::default(),
    )?;
    watcher.watch(&root, RecursiveMode::Recursive)?;
    info!(root = %root.display(), "watching for changes");

    let mut debouncer = Debouncer::new(Duration::from_millis(app.config().debounce_ms));

    loop {
        if let Some(paths) = debouncer.take_ready(Instant::now()) {
            debug!(changed = paths.len(), "artifacts changed");
            match app.rebuild_routes() {
                Ok(_) => {
                    let told = app.reload_clients();
                    info!(clients = told, "reload sent");
                }
                Err(error) => warn!(%error, "route rebuild failed, keeping previous table"),
            }
        }

        match tokio::time::timeout(POLL_INTERVAL, rx.recv()).await {
            Ok(Some(Ok(event))) => {
                let now = Instant::now();
                for path in event.paths {
                    if is_artifact_path(&path, &extensions) {
                        debouncer.record(path, now);
                    }
                }
            }
            Ok(Some(Err(error))) => warn!(%error, "watch error"),
            Ok(None) => break,
            Err(_) => {}
        }
    }

    Ok(())
}
