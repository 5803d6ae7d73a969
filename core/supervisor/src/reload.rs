//! Hot reload: debounced filesystem watching over the module root.
//!
//! Raw filesystem events under the module root are attributed to the
//! top-level module directory they fall under and debounced per module name
//! by `lattice-file-watch`. Each trigger is then mapped to a supervisor
//! action: manifest gone ⇒ unload, new manifest in an unknown directory ⇒
//! load, change to a loaded module ⇒ reload.

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Weak;
use std::time::Duration;

use lattice_file_watch::KeyedWatcher;
use lattice_file_watch::KeyedWatcherBuilder;
use lattice_file_watch::RecursiveMode;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::manifest::MODULE_MANIFEST;
use crate::supervisor::Supervisor;

const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

/// Watches a module root directory and drives load/unload/reload cycles.
///
/// Holds only a `Weak` supervisor reference; the watcher goes quiet once
/// the supervisor is dropped.
pub struct HotReload {
    root: PathBuf,
    watcher: KeyedWatcher<String>,
}

impl HotReload {
    /// Start watching `root` with the default 500ms debounce window.
    pub fn start(supervisor: &Arc<Supervisor>, root: &Path) -> notify::Result<Self> {
        Self::start_with_debounce(supervisor, root, DEFAULT_DEBOUNCE)
    }

    pub fn start_with_debounce(
        supervisor: &Arc<Supervisor>,
        root: &Path,
        debounce: Duration,
    ) -> notify::Result<Self> {
        let root = root.to_path_buf();
        let classify_root = root.clone();
        let watcher = KeyedWatcherBuilder::new()
            .debounce_window(debounce)
            .build(move |event: &notify::Event| {
                let mut keys: Vec<String> = event
                    .paths
                    .iter()
                    .filter_map(|path| module_name_for(&classify_root, path))
                    .collect();
                keys.dedup();
                keys
            })?;
        watcher.watch(root.clone(), RecursiveMode::Recursive);

        let rx = watcher.subscribe();
        spawn_trigger_loop(Arc::downgrade(supervisor), root.clone(), rx);
        info!(root = %root.display(), "hot reload watching module root");
        Ok(Self { root, watcher })
    }

    /// The module root being watched.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Stop watching. Dropping `HotReload` has the same effect.
    pub fn stop(self) {
        self.watcher.unwatch(&self.root);
    }
}

/// Attribute an event path to the top-level module directory it falls under.
fn module_name_for(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let first = rel.components().next()?;
    let name = first.as_os_str().to_string_lossy().into_owned();
    (!name.is_empty()).then_some(name)
}

fn spawn_trigger_loop(
    supervisor: Weak<Supervisor>,
    root: PathBuf,
    mut rx: tokio::sync::broadcast::Receiver<String>,
) {
    tokio::spawn(async move {
        loop {
            let name = match rx.recv().await {
                Ok(name) => name,
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "hot reload fell behind, triggers dropped");
                    continue;
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => return,
            };
            let Some(sup) = supervisor.upgrade() else {
                return;
            };

            let manifest_present = root.join(&name).join(MODULE_MANIFEST).is_file();
            let loaded = sup.is_loaded(&name).await;
            let result = match (manifest_present, loaded) {
                (true, true) => {
                    info!(module = %name, "module changed on disk, reloading");
                    sup.reload_module(&name).await
                }
                (true, false) => {
                    info!(module = %name, "new module appeared on disk, loading");
                    sup.load_module(&root.join(&name)).await
                }
                (false, true) => {
                    info!(module = %name, "module manifest removed, unloading");
                    sup.unload_module(&name).await
                }
                (false, false) => {
                    debug!(module = %name, "ignoring change in non-module directory");
                    Ok(())
                }
            };
            if let Err(e) = result {
                warn!(module = %name, "hot reload action failed: {e}");
            }
        }
    });
}

#[cfg(test)]
#[path = "reload.test.rs"]
mod tests;
