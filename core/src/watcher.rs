//! Filesystem watcher feeding the update pipeline.
//!
//! Lifecycle is Stopped -> Watching -> Stopped. `start` resolves each
//! configured path to its nearest existing ancestor directory and
//! registers a recursive watch; create/modify events on `.ini`/`.txt`
//! files pass a per-path debounce and are queued for the consumer.
//! `stop` drops all watches and debounce state and is idempotent.
//!
//! The notify callback runs on the watch backend's own thread; the
//! debounce map is shared with it behind a mutex, and qualifying
//! events cross into async land over an unbounded channel.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use hashbrown::HashMap;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

pub struct SaveWatcher {
    tx: Option<UnboundedSender<PathBuf>>,
    rx: UnboundedReceiver<PathBuf>,
    watchers: Vec<RecommendedWatcher>,
    debounce: Arc<Mutex<HashMap<PathBuf, Instant>>>,
    window: Duration,
}

impl SaveWatcher {
    pub fn new(window: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx: Some(tx),
            rx,
            watchers: Vec::new(),
            debounce: Arc::new(Mutex::new(HashMap::new())),
            window,
        }
    }

    pub fn is_watching(&self) -> bool {
        !self.watchers.is_empty()
    }

    /// Start watching the resolved roots of `raw_paths`. Restarts
    /// cleanly if already watching. Returns the number of roots under
    /// watch.
    pub fn start(&mut self, raw_paths: &[String]) -> usize {
        self.stop();

        // stop() tore the channel down; rebuild it for this session.
        let (tx, rx) = mpsc::unbounded_channel();
        self.tx = Some(tx);
        self.rx = rx;

        let mut roots: HashSet<PathBuf> = HashSet::new();
        for raw in raw_paths {
            // Placeholder segments never exist on disk; climbing to the
            // nearest real ancestor covers them too.
            if let Some(root) = nearest_existing_dir(Path::new(raw)) {
                roots.insert(root);
            } else {
                tracing::warn!(path = raw, "no existing ancestor, not watching");
            }
        }

        for root in roots {
            match self.watch_root(&root, self.tx.clone()) {
                Ok(watcher) => {
                    tracing::info!(root = %root.display(), "watching save root");
                    self.watchers.push(watcher);
                }
                Err(e) => {
                    tracing::error!(root = %root.display(), error = %e, "failed to watch root");
                }
            }
        }
        self.watchers.len()
    }

    fn watch_root(
        &self,
        root: &Path,
        tx: Option<UnboundedSender<PathBuf>>,
    ) -> notify::Result<RecommendedWatcher> {
        let debounce = Arc::clone(&self.debounce);
        let window = self.window;

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let event = match res {
                Ok(event) => event,
                Err(e) => {
                    tracing::warn!(error = %e, "watch backend error");
                    return;
                }
            };
            if !matches!(
                event.kind,
                EventKind::Create(_) | EventKind::Modify(_) | EventKind::Any
            ) {
                return;
            }
            for path in event.paths {
                if !is_save_candidate(&path) {
                    continue;
                }
                if !debounce_admit(&debounce, &path, window) {
                    tracing::trace!(path = %path.display(), "debounced");
                    continue;
                }
                // Receiver gone means we are shutting down; ignore.
                if let Some(tx) = &tx {
                    let _ = tx.send(path);
                }
            }
        })?;
        watcher.watch(root, RecursiveMode::Recursive)?;
        Ok(watcher)
    }

    /// Next debounced save-file event. `None` after `stop`.
    pub async fn next_event(&mut self) -> Option<PathBuf> {
        self.rx.recv().await
    }

    pub fn stop(&mut self) {
        self.watchers.clear();
        self.tx = None;
        self.debounce.lock().unwrap().clear();
    }
}

impl Drop for SaveWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Watcher-level extension filter: the formats games write live in
/// `.ini`/`.txt` files.
fn is_save_candidate(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some(ext) if ext.eq_ignore_ascii_case("ini") || ext.eq_ignore_ascii_case("txt")
    )
}

/// Admit the path unless it fired within the debounce window.
fn debounce_admit(
    debounce: &Mutex<HashMap<PathBuf, Instant>>,
    path: &Path,
    window: Duration,
) -> bool {
    let now = Instant::now();
    let mut map = debounce.lock().unwrap();
    if let Some(last) = map.get(path) {
        if now.duration_since(*last) < window {
            return false;
        }
    }
    map.insert(path.to_path_buf(), now);
    true
}

/// Climb parent directories until one exists.
fn nearest_existing_dir(path: &Path) -> Option<PathBuf> {
    let mut current = Some(path);
    while let Some(p) = current {
        if p.is_dir() {
            return Some(p.to_path_buf());
        }
        current = p.parent();
    }
    None
}
