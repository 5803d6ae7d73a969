//! Generic, reusable file-watch infrastructure.
//!
//! Provides [`KeyedWatcher`] — a debouncing file watcher that bridges OS
//! filesystem events into per-key domain triggers via a caller-supplied
//! `classify` closure. Each key (for example a module directory name) is
//! debounced independently with a trailing quiet window: a burst of events
//! against the same key collapses into exactly one trigger, fired once the
//! key has been quiet for the whole window.
//!
//! # Example
//!
//! ```no_run
//! use std::path::PathBuf;
//! use std::time::Duration;
//! use lattice_file_watch::{KeyedWatcherBuilder, RecursiveMode};
//!
//! let root = PathBuf::from("/srv/modules");
//! let watcher = KeyedWatcherBuilder::new()
//!     .debounce_window(Duration::from_millis(500))
//!     .build(move |event: &notify::Event| {
//!         event
//!             .paths
//!             .iter()
//!             .filter_map(|p| {
//!                 let rel = p.strip_prefix(&root).ok()?;
//!                 Some(rel.components().next()?.as_os_str().to_string_lossy().into_owned())
//!             })
//!             .collect()
//!     })
//!     .unwrap();
//!
//! let mut rx = watcher.subscribe();
//! watcher.watch("/srv/modules".into(), RecursiveMode::Recursive);
//! ```

use std::collections::HashMap;
use std::hash::Hash;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio::time::sleep_until;
use tracing::debug;
use tracing::warn;

pub use notify::RecursiveMode;
use notify::Watcher;

const DEFAULT_DEBOUNCE_WINDOW: Duration = Duration::from_millis(500);
const DEFAULT_CHANNEL_CAPACITY: usize = 128;

// ---------------------------------------------------------------------------
// DebouncedKeys
// ---------------------------------------------------------------------------

/// Per-key trailing debounce: each touch pushes that key's deadline out to
/// `now + window`; a key fires once its deadline elapses untouched.
pub struct DebouncedKeys<K> {
    deadlines: HashMap<K, Instant>,
    window: Duration,
}

impl<K: Eq + Hash + Clone> DebouncedKeys<K> {
    pub fn new(window: Duration) -> Self {
        Self {
            deadlines: HashMap::new(),
            window,
        }
    }

    /// Record activity on a key, resetting its quiet window.
    pub fn touch(&mut self, key: K, now: Instant) {
        self.deadlines.insert(key, now + self.window);
    }

    /// Return all keys whose quiet window has elapsed, removing them.
    pub fn take_ready(&mut self, now: Instant) -> Vec<K> {
        let ready: Vec<K> = self
            .deadlines
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &ready {
            self.deadlines.remove(key);
        }
        ready
    }

    /// Return all pending keys regardless of their window (e.g. on shutdown).
    pub fn take_pending(&mut self) -> Vec<K> {
        self.deadlines.drain().map(|(key, _)| key).collect()
    }

    /// The earliest deadline among pending keys, or `None` if nothing is
    /// pending.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.deadlines.values().min().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.deadlines.is_empty()
    }
}

// ---------------------------------------------------------------------------
// WatcherInner
// ---------------------------------------------------------------------------

struct WatcherInner {
    watcher: notify::RecommendedWatcher,
    watched_paths: HashMap<PathBuf, RecursiveMode>,
}

// ---------------------------------------------------------------------------
// KeyedWatcher<K>
// ---------------------------------------------------------------------------

/// Debouncing file watcher: bridges OS events into per-key triggers.
///
/// `K` is the key type produced by the caller-supplied `classify` closure.
pub struct KeyedWatcher<K> {
    inner: Option<Mutex<WatcherInner>>,
    tx: broadcast::Sender<K>,
}

impl<K: Clone + Send + 'static> KeyedWatcher<K> {
    /// Subscribe to debounced key triggers emitted by this watcher.
    pub fn subscribe(&self) -> broadcast::Receiver<K> {
        self.tx.subscribe()
    }

    /// Start watching `path` for filesystem changes.
    pub fn watch(&self, path: PathBuf, mode: RecursiveMode) {
        let Some(inner) = &self.inner else {
            return;
        };
        if !path.exists() {
            return;
        }
        let mut guard = match inner.lock() {
            Ok(g) => g,
            Err(e) => e.into_inner(),
        };
        if let Some(existing) = guard.watched_paths.get(&path) {
            if *existing == RecursiveMode::Recursive || *existing == mode {
                return;
            }
            // Upgrading from NonRecursive → Recursive: unwatch first.
            if let Err(err) = guard.watcher.unwatch(&path) {
                warn!("failed to unwatch {}: {err}", path.display());
            }
        }
        if let Err(err) = guard.watcher.watch(&path, mode) {
            warn!("failed to watch {}: {err}", path.display());
            return;
        }
        guard.watched_paths.insert(path, mode);
    }

    /// Stop watching `path`.
    pub fn unwatch(&self, path: &Path) {
        let Some(inner) = &self.inner else {
            return;
        };
        let mut guard = match inner.lock() {
            Ok(g) => g,
            Err(e) => e.into_inner(),
        };
        if guard.watched_paths.remove(path).is_some() {
            if let Err(err) = guard.watcher.unwatch(path) {
                warn!("failed to unwatch {}: {err}", path.display());
            }
        }
    }
}

// ---------------------------------------------------------------------------
// KeyedWatcherBuilder<K>
// ---------------------------------------------------------------------------

/// Builder for [`KeyedWatcher`].
pub struct KeyedWatcherBuilder<K> {
    debounce_window: Duration,
    channel_capacity: usize,
    _marker: std::marker::PhantomData<K>,
}

impl<K: Clone + Eq + Hash + Send + 'static> Default for KeyedWatcherBuilder<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Clone + Eq + Hash + Send + 'static> KeyedWatcherBuilder<K> {
    pub fn new() -> Self {
        Self {
            debounce_window: DEFAULT_DEBOUNCE_WINDOW,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            _marker: std::marker::PhantomData,
        }
    }

    /// Set the per-key quiet window (default: 500ms).
    pub fn debounce_window(mut self, window: Duration) -> Self {
        self.debounce_window = window;
        self
    }

    /// Set the broadcast channel capacity (default: 128).
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    /// Build a live watcher.
    ///
    /// `classify` maps a raw [`notify::Event`] to the keys it touches;
    /// returning an empty vec drops the event.
    pub fn build<C>(self, classify: C) -> notify::Result<KeyedWatcher<K>>
    where
        C: Fn(&notify::Event) -> Vec<K> + Send + 'static,
    {
        let (raw_tx, raw_rx) = mpsc::unbounded_channel();
        let watcher = notify::recommended_watcher(move |res| {
            let _ = raw_tx.send(res);
        })?;
        let (tx, _) = broadcast::channel(self.channel_capacity);
        let keyed = KeyedWatcher {
            inner: Some(Mutex::new(WatcherInner {
                watcher,
                watched_paths: HashMap::new(),
            })),
            tx: tx.clone(),
        };
        spawn_event_loop(raw_rx, tx, self.debounce_window, classify);
        Ok(keyed)
    }

    /// Build a no-op watcher (for tests). Subscribe returns a receiver that
    /// never fires; `watch`/`unwatch` are safe no-ops.
    pub fn build_noop(self) -> KeyedWatcher<K> {
        let (tx, _) = broadcast::channel(1);
        KeyedWatcher { inner: None, tx }
    }
}

// ---------------------------------------------------------------------------
// Event loop
// ---------------------------------------------------------------------------

fn spawn_event_loop<K, C>(
    mut raw_rx: mpsc::UnboundedReceiver<notify::Result<notify::Event>>,
    tx: broadcast::Sender<K>,
    window: Duration,
    classify: C,
) where
    K: Clone + Eq + Hash + Send + 'static,
    C: Fn(&notify::Event) -> Vec<K> + Send + 'static,
{
    let Ok(handle) = Handle::try_current() else {
        warn!("file watcher loop skipped: no Tokio runtime available");
        return;
    };
    handle.spawn(async move {
        let mut pending = DebouncedKeys::new(window);

        loop {
            let now = Instant::now();
            let timer_deadline = pending.next_deadline().unwrap_or_else(|| {
                // Far future — only wake on channel activity.
                now + Duration::from_secs(60 * 60 * 24 * 365)
            });
            let timer = sleep_until(timer_deadline);
            tokio::pin!(timer);

            tokio::select! {
                res = raw_rx.recv() => {
                    match res {
                        Some(Ok(event)) => {
                            debug!(
                                event_kind = ?event.kind,
                                event_paths = ?event.paths,
                                "file watcher received filesystem event"
                            );
                            let now = Instant::now();
                            for key in classify(&event) {
                                pending.touch(key, now);
                            }
                        }
                        Some(Err(err)) => {
                            warn!("file watcher error: {err}");
                        }
                        None => {
                            // Channel closed — flush pending keys.
                            for key in pending.take_pending() {
                                let _ = tx.send(key);
                            }
                            break;
                        }
                    }
                }
                _ = &mut timer => {
                    for key in pending.take_ready(Instant::now()) {
                        let _ = tx.send(key);
                    }
                }
            }
        }
    });
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
#[path = "lib.test.rs"]
mod tests;
