// ABOUTME: Watch module for monitoring presentation and asset directories
// ABOUTME: Feeds debounced file system events to a change callback, ignoring dotfiles

use log::{debug, info, warn};
use std::path::{Component, Path, PathBuf};
use std::sync::mpsc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use notify_debouncer_full::{DebounceEventResult, Debouncer, FileIdMap, new_debouncer};

use crate::errors::{DeckError, Result};

/// Coalescing window of the underlying file system debouncer.
const EVENT_TIMEOUT: Duration = Duration::from_millis(100);

/// Keeps the file system watcher and its event thread alive.
pub struct FileWatcher {
    debouncer: Option<Debouncer<RecommendedWatcher, FileIdMap>>,
    worker: Option<JoinHandle<()>>,
}

impl FileWatcher {
    /// Watch `roots` recursively and call `on_change` for every event batch
    /// that touches a non-hidden path.
    pub fn start<F>(roots: &[PathBuf], on_change: F) -> Result<Self>
    where
        F: Fn(&[PathBuf]) + Send + 'static,
    {
        let (tx, rx) = mpsc::channel::<DebounceEventResult>();
        let mut debouncer = new_debouncer(EVENT_TIMEOUT, None, tx)
            .map_err(|e| DeckError::Watch(format!("Failed to create file watcher: {}", e)))?;

        let mut watched = Vec::new();
        for root in roots {
            if !root.is_dir() {
                debug!("Skipping missing watch root {:?}", root);
                continue;
            }
            debouncer
                .watcher()
                .watch(root, RecursiveMode::Recursive)
                .map_err(|e| {
                    DeckError::Watch(format!("Failed to start watching {:?}: {}", root, e))
                })?;
            info!("Watching for changes in {:?}", root);
            watched.push(root.clone());
        }

        let worker = thread::Builder::new()
            .name("deckhand-watch".to_string())
            .spawn(move || {
                for result in rx {
                    match result {
                        Ok(events) => {
                            let changed: Vec<PathBuf> = events
                                .iter()
                                .flat_map(|event| event.paths.iter())
                                .filter(|path| !is_hidden(path, &watched))
                                .cloned()
                                .collect();
                            if changed.is_empty() {
                                continue;
                            }
                            for path in &changed {
                                debug!("File updated: {:?}", path);
                            }
                            on_change(&changed);
                        }
                        Err(errors) => {
                            for error in errors {
                                warn!("Watcher error: {}", error);
                            }
                        }
                    }
                }
            })?;

        Ok(Self {
            debouncer: Some(debouncer),
            worker: Some(worker),
        })
    }
}

impl Drop for FileWatcher {
    fn drop(&mut self) {
        // Dropping the debouncer closes the channel and ends the event thread.
        self.debouncer.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

/// `true` when any component below the watched root starts with a dot.
pub fn is_hidden(path: &Path, roots: &[PathBuf]) -> bool {
    let relative = roots
        .iter()
        .find_map(|root| path.strip_prefix(root).ok())
        .unwrap_or(path);
    relative.components().any(|component| match component {
        Component::Normal(name) => name.to_string_lossy().starts_with('.'),
        _ => false,
    })
}
