//! The supervisor: owns the table of loaded modules and their lifecycle.
//!
//! One [`Supervisor`] instance is constructed explicitly at process start
//! (via [`SupervisorBuilder`]) and passed to consumers; there is no ambient
//! global. The supervisor composes the manifest loader, the worker host, the
//! message bridge, the data proxy, and the restart policy, and publishes
//! lifecycle transitions as [`ModuleEvent`]s on a broadcast channel.
//!
//! Per-unit message pumps hold only a `Weak` reference back to the
//! supervisor, so dropping the last external `Arc` tears everything down.

use std::collections::HashMap;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;

use chrono::DateTime;
use chrono::Utc;
use snafu::IntoError;
use tokio::sync::Mutex;
use tokio::sync::RwLock;
use tokio::sync::broadcast;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use lattice_protocol::HookEvent;
use lattice_protocol::LogLevel;
use lattice_protocol::ModuleState;
use lattice_protocol::ModuleStatus;
use lattice_protocol::QueryOutcome;
use lattice_protocol::RequestId;
use lattice_protocol::WorkerMessage;
use lattice_worker::MessageBridge;
use lattice_worker::ModuleRegistry;
use lattice_worker::WorkerHandle;
use lattice_worker::WorkerSender;
use lattice_worker::spawn_worker;

use crate::error::Result;
use crate::error::supervisor_error;
use crate::health::RestartPolicy;
use crate::manifest::ModuleManifest;
use crate::proxy::DataProxy;
use crate::proxy::ExtractionSink;
use crate::proxy::ExtractionStore;
use crate::proxy::NullSink;
use crate::proxy::NullStore;
use crate::proxy::ProxyBinding;

const DEFAULT_UNLOAD_GRACE: Duration = Duration::from_secs(2);
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Lifecycle and health events published for operator tooling.
#[derive(Debug, Clone)]
pub enum ModuleEvent {
    /// A module directory was loaded and its execution unit spawned.
    Loaded { module: String },
    /// The module finished initializing and accepts hook calls.
    Ready { module: String },
    /// The module was unloaded and removed from the table.
    Unloaded { module: String },
    /// The module's execution unit failed.
    Failed { module: String, error: String },
    /// A restart was scheduled after a failure.
    RestartScheduled {
        module: String,
        attempt: u32,
        delay: Duration,
    },
    /// The restart budget is exhausted or an operator disabled the module.
    Disabled { module: String },
    /// One hook call to the module failed or timed out; dispatch continued.
    CallFailed {
        module: String,
        hook: HookEvent,
        error: String,
    },
    /// A configuration update was pushed to the module.
    ConfigUpdated { module: String },
}

/// Supervisor-owned runtime record for one module.
struct ManagedModule {
    manifest: ModuleManifest,
    handle: Option<WorkerHandle>,
    state: ModuleState,
    restart_count: u32,
    last_error: Option<String>,
    last_error_at: Option<DateTime<Utc>>,
    loaded_at: DateTime<Utc>,
    load_seq: u64,
    dir: PathBuf,
    unload_tx: Option<oneshot::Sender<()>>,
    restart_task: Option<JoinHandle<()>>,
}

impl ManagedModule {
    fn status(&self, name: &str) -> ModuleStatus {
        ModuleStatus {
            name: name.to_string(),
            version: self.manifest.version.clone(),
            state: self.state,
            restart_count: self.restart_count,
            last_error: self.last_error.clone(),
            last_error_at: self.last_error_at,
            loaded_at: self.loaded_at,
            dir: self.dir.clone(),
        }
    }
}

/// One ready module selected for a hook invocation, with everything dispatch
/// needs captured outside the module-table lock.
#[derive(Clone)]
pub(crate) struct DispatchTarget {
    pub module: String,
    pub sender: WorkerSender,
    pub priority: i32,
    pub blocking: bool,
    pub timeout: Duration,
    pub load_seq: u64,
}

/// Builder for [`Supervisor`].
pub struct SupervisorBuilder {
    registry: ModuleRegistry,
    store: Arc<dyn ExtractionStore>,
    sink: Arc<dyn ExtractionSink>,
    policy: RestartPolicy,
    unload_grace: Duration,
}

impl SupervisorBuilder {
    pub fn new(registry: ModuleRegistry) -> Self {
        Self {
            registry,
            store: Arc::new(NullStore),
            sink: Arc::new(NullSink),
            policy: RestartPolicy::default(),
            unload_grace: DEFAULT_UNLOAD_GRACE,
        }
    }

    /// Inject the external extraction store the data proxy reads from.
    pub fn with_store(mut self, store: Arc<dyn ExtractionStore>) -> Self {
        self.store = store;
        self
    }

    /// Inject the external sink that receives emitted extractions.
    pub fn with_sink(mut self, sink: Arc<dyn ExtractionSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_restart_policy(mut self, policy: RestartPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Grace period for the unload/unloaded handshake before forced
    /// termination.
    pub fn with_unload_grace(mut self, grace: Duration) -> Self {
        self.unload_grace = grace;
        self
    }

    pub fn build(self) -> Arc<Supervisor> {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Arc::new(Supervisor {
            registry: self.registry,
            bridge: MessageBridge::new(),
            proxy: DataProxy::new(self.store),
            sink: self.sink,
            policy: self.policy,
            unload_grace: self.unload_grace,
            modules: RwLock::new(HashMap::new()),
            next_seq: AtomicU64::new(0),
            in_flight: Mutex::new(HashMap::new()),
            events,
        })
    }
}

/// Owns the module table and composes the engine's components.
pub struct Supervisor {
    registry: ModuleRegistry,
    pub(crate) bridge: MessageBridge,
    proxy: DataProxy,
    sink: Arc<dyn ExtractionSink>,
    pub(crate) policy: RestartPolicy,
    unload_grace: Duration,
    modules: RwLock<HashMap<String, ManagedModule>>,
    next_seq: AtomicU64,
    /// call_id → binding for hook calls currently in flight, consulted when
    /// routing `db_query` messages through the proxy.
    in_flight: Mutex<HashMap<RequestId, ProxyBinding>>,
    events: broadcast::Sender<ModuleEvent>,
}

impl Supervisor {
    /// Subscribe to lifecycle and health events.
    pub fn subscribe(&self) -> broadcast::Receiver<ModuleEvent> {
        self.events.subscribe()
    }

    pub(crate) fn publish(&self, event: ModuleEvent) {
        // No subscribers is fine; events are advisory.
        let _ = self.events.send(event);
    }

    /// Load the module in `dir` and spawn its execution unit.
    ///
    /// Returns once the spawn is initiated; the `Ready` transition is
    /// asynchronous and observable via [`ModuleEvent::Ready`]. Fails if a
    /// module with the same name is already loaded.
    pub async fn load_module(self: &Arc<Self>, dir: &Path) -> Result<()> {
        let manifest = ModuleManifest::load(dir)?;
        self.insert_and_spawn(manifest, dir.to_path_buf(), 0).await
    }

    async fn insert_and_spawn(
        self: &Arc<Self>,
        manifest: ModuleManifest,
        dir: PathBuf,
        restart_count: u32,
    ) -> Result<()> {
        let name = manifest.name.clone();
        let factory = self.registry.factory(manifest.entry()).ok_or_else(|| {
            supervisor_error::UnknownEntrySnafu {
                name: name.clone(),
                entry: manifest.entry().to_string(),
            }
            .build()
        })?;

        let mut modules = self.modules.write().await;
        if modules.contains_key(&name) {
            return supervisor_error::AlreadyLoadedSnafu { name }.fail();
        }

        let config = manifest.default_config();
        let (handle, rx) =
            spawn_worker(&name, factory, config).map_err(|source| {
                supervisor_error::WorkerSnafu { name: name.clone() }.into_error(source)
            })?;
        let load_seq = self.next_seq.fetch_add(1, Ordering::Relaxed);

        modules.insert(name.clone(), ManagedModule {
            manifest,
            handle: Some(handle),
            state: ModuleState::Starting,
            restart_count,
            last_error: None,
            last_error_at: None,
            loaded_at: Utc::now(),
            load_seq,
            dir,
            unload_tx: None,
            restart_task: None,
        });
        drop(modules);

        self.spawn_pump(name.clone(), load_seq, rx);
        info!(module = %name, "module loaded, execution unit starting");
        self.publish(ModuleEvent::Loaded { module: name });
        Ok(())
    }

    /// Gracefully unload a module and remove it from the table.
    ///
    /// Sends `unload`, waits up to the grace period for `unloaded`, then
    /// forcibly terminates the unit by dropping its handle regardless of
    /// acknowledgment. Idempotent while already stopping.
    pub async fn unload_module(&self, name: &str) -> Result<()> {
        let pending = {
            let mut modules = self.modules.write().await;
            let record = modules
                .get_mut(name)
                .ok_or_else(|| supervisor_error::NotLoadedSnafu { name }.build())?;
            if record.state == ModuleState::Stopping {
                // Another unload is already in progress.
                return Ok(());
            }
            if let Some(task) = record.restart_task.take() {
                task.abort();
            }
            record.state = ModuleState::Stopping;
            let sender = record.handle.as_ref().map(WorkerHandle::clone_sender);
            sender.map(|sender| {
                let (tx, rx) = oneshot::channel();
                record.unload_tx = Some(tx);
                (sender, rx)
            })
        };

        if let Some((sender, ack)) = pending {
            if sender.send(WorkerMessage::Unload).is_ok()
                && tokio::time::timeout(self.unload_grace, ack).await.is_err()
            {
                warn!(module = %name, "unload acknowledgment never arrived, terminating");
            }
        }

        // Removal drops the handle, closing the unit's channels either way.
        self.modules.write().await.remove(name);
        info!(module = %name, "module unloaded");
        self.publish(ModuleEvent::Unloaded {
            module: name.to_string(),
        });
        Ok(())
    }

    /// Unload then load again from the same source directory.
    pub async fn reload_module(self: &Arc<Self>, name: &str) -> Result<()> {
        let dir = {
            let modules = self.modules.read().await;
            let record = modules
                .get(name)
                .ok_or_else(|| supervisor_error::NotLoadedSnafu { name }.build())?;
            record.dir.clone()
        };
        self.unload_module(name).await?;
        self.load_module(&dir).await
    }

    /// Exclude a module from dispatch immediately. The module stays in the
    /// table (and its unit stays up) but is never selected for hooks.
    pub async fn disable_module(&self, name: &str) -> Result<()> {
        let mut modules = self.modules.write().await;
        let record = modules
            .get_mut(name)
            .ok_or_else(|| supervisor_error::NotLoadedSnafu { name }.build())?;
        if let Some(task) = record.restart_task.take() {
            task.abort();
        }
        record.state = ModuleState::Disabled;
        drop(modules);
        info!(module = %name, "module disabled");
        self.publish(ModuleEvent::Disabled {
            module: name.to_string(),
        });
        Ok(())
    }

    /// Bring a disabled module back by re-running a full load from its
    /// source directory. Resets the restart budget.
    pub async fn enable_module(self: &Arc<Self>, name: &str) -> Result<()> {
        let dir = {
            let mut modules = self.modules.write().await;
            let record = modules
                .get_mut(name)
                .ok_or_else(|| supervisor_error::NotLoadedSnafu { name }.build())?;
            if record.state != ModuleState::Disabled {
                return supervisor_error::NotDisabledSnafu {
                    name,
                    state: record.state.to_string(),
                }
                .fail();
            }
            let dir = record.dir.clone();
            // Drop the old record (and any still-running unit) outright.
            modules.remove(name);
            dir
        };
        info!(module = %name, "re-enabling module");
        self.load_module(&dir).await
    }

    /// Push a configuration update to a loaded module (one-way).
    pub async fn update_module_config(&self, name: &str, config: serde_json::Value) -> Result<()> {
        let sender = {
            let modules = self.modules.read().await;
            let record = modules
                .get(name)
                .ok_or_else(|| supervisor_error::NotLoadedSnafu { name }.build())?;
            record.handle.as_ref().map(WorkerHandle::clone_sender)
        };
        let Some(sender) = sender else {
            return supervisor_error::NotLoadedSnafu { name }.fail();
        };
        sender
            .send(WorkerMessage::ConfigUpdate { config })
            .map_err(|source| supervisor_error::WorkerSnafu { name }.into_error(source))?;
        self.publish(ModuleEvent::ConfigUpdated {
            module: name.to_string(),
        });
        Ok(())
    }

    /// Read-only snapshot of every managed module, ordered by load sequence.
    /// Never blocks on in-flight hook calls.
    pub async fn module_statuses(&self) -> Vec<ModuleStatus> {
        let modules = self.modules.read().await;
        let mut rows: Vec<(u64, ModuleStatus)> = modules
            .iter()
            .map(|(name, record)| (record.load_seq, record.status(name)))
            .collect();
        rows.sort_by_key(|(seq, _)| *seq);
        rows.into_iter().map(|(_, status)| status).collect()
    }

    /// Returns `true` if a module with this name is in the table.
    pub async fn is_loaded(&self, name: &str) -> bool {
        self.modules.read().await.contains_key(name)
    }

    /// Ready modules declaring `hook`, sorted by (priority, load order).
    pub(crate) async fn hook_targets(&self, hook: HookEvent) -> Vec<DispatchTarget> {
        let modules = self.modules.read().await;
        let mut targets: Vec<DispatchTarget> = modules
            .iter()
            .filter(|(_, record)| {
                record.state == ModuleState::Ready && record.manifest.handles(hook)
            })
            .filter_map(|(name, record)| {
                let handle = record.handle.as_ref()?;
                Some(DispatchTarget {
                    module: name.clone(),
                    sender: handle.clone_sender(),
                    priority: record.manifest.priority_for(hook),
                    blocking: record.manifest.blocking_for(hook),
                    timeout: record.manifest.timeout_for(hook),
                    load_seq: record.load_seq,
                })
            })
            .collect();
        targets.sort_by_key(|t| (t.priority, t.load_seq));
        targets
    }

    pub(crate) async fn begin_call(&self, call_id: RequestId, binding: ProxyBinding) {
        self.in_flight.lock().await.insert(call_id, binding);
    }

    pub(crate) async fn end_call(&self, call_id: &RequestId) {
        self.in_flight.lock().await.remove(call_id);
    }

    // -----------------------------------------------------------------------
    // Unit message pump
    // -----------------------------------------------------------------------

    /// Spawn the task that pumps one unit's outbound messages into the
    /// supervisor. `load_seq` guards against a stale pump mutating a record
    /// that has since been replaced by a reload or enable.
    fn spawn_pump(
        self: &Arc<Self>,
        module: String,
        load_seq: u64,
        mut rx: mpsc::UnboundedReceiver<WorkerMessage>,
    ) {
        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                let Some(sup) = weak.upgrade() else { return };
                sup.on_unit_message(&module, load_seq, msg).await;
            }
            // Stream end: the unit thread exited.
            if let Some(sup) = weak.upgrade() {
                sup.on_unit_exit(&module, load_seq).await;
            }
        });
    }

    async fn on_unit_message(self: &Arc<Self>, module: &str, load_seq: u64, msg: WorkerMessage) {
        match msg {
            WorkerMessage::Ready => {
                let mut modules = self.modules.write().await;
                if let Some(record) = modules.get_mut(module) {
                    if record.load_seq == load_seq && record.state == ModuleState::Starting {
                        record.state = ModuleState::Ready;
                        drop(modules);
                        info!(module = %module, "module ready");
                        self.publish(ModuleEvent::Ready {
                            module: module.to_string(),
                        });
                    }
                }
            }
            WorkerMessage::HookResult {
                request_id,
                outcome,
            } => {
                self.bridge.resolve(&request_id, outcome).await;
            }
            WorkerMessage::Extraction { extraction } => {
                self.sink.record(extraction);
            }
            WorkerMessage::Log { level, message } => match level {
                LogLevel::Debug => debug!(module = %module, "{message}"),
                LogLevel::Info => info!(module = %module, "{message}"),
                LogLevel::Warn => warn!(module = %module, "{message}"),
                LogLevel::Error => error!(module = %module, "{message}"),
            },
            WorkerMessage::DbQuery {
                request_id,
                call_id,
                query,
            } => {
                let binding = self.in_flight.lock().await.get(&call_id).cloned();
                let outcome = match binding {
                    Some(binding) => self.proxy.execute(&binding, &query),
                    None => QueryOutcome::Denied {
                        reason: "query is not bound to an active hook call".to_string(),
                    },
                };
                let sender = {
                    let modules = self.modules.read().await;
                    modules
                        .get(module)
                        .and_then(|r| r.handle.as_ref())
                        .map(WorkerHandle::clone_sender)
                };
                if let Some(sender) = sender {
                    if let Err(e) = sender.send_db_response(request_id, outcome) {
                        debug!(module = %module, "failed to deliver db response: {e}");
                    }
                }
            }
            WorkerMessage::Unloaded => {
                let mut modules = self.modules.write().await;
                if let Some(record) = modules.get_mut(module) {
                    if record.load_seq == load_seq {
                        if let Some(tx) = record.unload_tx.take() {
                            let _ = tx.send(());
                        }
                    }
                }
            }
            WorkerMessage::Error { message } => {
                warn!(module = %module, "execution unit reported failure: {message}");
                let mut modules = self.modules.write().await;
                if let Some(record) = modules.get_mut(module) {
                    if record.load_seq == load_seq {
                        record.last_error = Some(message);
                        record.last_error_at = Some(Utc::now());
                    }
                }
            }
            other => {
                debug!(module = %module, "ignoring unexpected unit message: {other:?}");
            }
        }
    }

    /// A unit's message stream ended. Expected during unload; anything else
    /// is a crash handled by the restart policy.
    fn on_unit_exit<'a>(
        self: &'a Arc<Self>,
        module: &'a str,
        load_seq: u64,
    ) -> std::pin::Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(async move {
            let mut modules = self.modules.write().await;
            let Some(record) = modules.get_mut(module) else {
                return;
            };
            if record.load_seq != load_seq
                || record.state == ModuleState::Stopping
                || record.state == ModuleState::Disabled
            {
                return;
            }

            record.handle = None;
            record.restart_count += 1;
            let attempt = record.restart_count;
            let error = record
                .last_error
                .clone()
                .unwrap_or_else(|| "execution unit exited abnormally".to_string());
            record.last_error = Some(error.clone());
            record.last_error_at = Some(Utc::now());

            if self.policy.exhausted(attempt) {
                record.state = ModuleState::Disabled;
                drop(modules);
                error!(module = %module, attempt, "restart budget exhausted, disabling module");
                self.publish(ModuleEvent::Failed {
                    module: module.to_string(),
                    error,
                });
                self.publish(ModuleEvent::Disabled {
                    module: module.to_string(),
                });
                return;
            }

            record.state = ModuleState::Error;
            let delay = self.policy.delay_for(attempt);
            let weak = Arc::downgrade(self);
            let name = module.to_string();
            record.restart_task = Some(tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                if let Some(sup) = weak.upgrade() {
                    sup.respawn(&name).await;
                }
            }));
            drop(modules);

            warn!(module = %module, attempt, ?delay, "execution unit failed, restart scheduled");
            self.publish(ModuleEvent::Failed {
                module: module.to_string(),
                error,
            });
            self.publish(ModuleEvent::RestartScheduled {
                module: module.to_string(),
                attempt,
                delay,
            });
        })
    }

    /// Respawn a crashed module's execution unit after its backoff delay,
    /// preserving `restart_count`.
    async fn respawn(self: &Arc<Self>, name: &str) {
        let spec = {
            let modules = self.modules.read().await;
            modules.get(name).and_then(|record| {
                (record.state == ModuleState::Error)
                    .then(|| (record.manifest.clone(), record.load_seq))
            })
        };
        let Some((manifest, old_seq)) = spec else {
            // Unloaded or disabled while the backoff slept.
            return;
        };
        let Some(factory) = self.registry.factory(manifest.entry()) else {
            error!(module = %name, entry = %manifest.entry(), "factory vanished, cannot respawn");
            return;
        };

        match spawn_worker(name, factory, manifest.default_config()) {
            Ok((handle, rx)) => {
                let mut modules = self.modules.write().await;
                let Some(record) = modules.get_mut(name) else {
                    return;
                };
                if record.load_seq != old_seq || record.state != ModuleState::Error {
                    // The table changed under us; discard the fresh unit.
                    return;
                }
                let load_seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
                record.handle = Some(handle);
                record.state = ModuleState::Starting;
                record.loaded_at = Utc::now();
                record.load_seq = load_seq;
                record.restart_task = None;
                drop(modules);
                info!(module = %name, "execution unit respawned");
                self.spawn_pump(name.to_string(), load_seq, rx);
            }
            Err(e) => {
                {
                    let mut modules = self.modules.write().await;
                    if let Some(record) = modules.get_mut(name) {
                        record.last_error = Some(e.to_string());
                        record.last_error_at = Some(Utc::now());
                    }
                }
                // Counts as another failed start.
                self.on_unit_exit(name, old_seq).await;
            }
        }
    }
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("policy", &self.policy)
            .field("unload_grace", &self.unload_grace)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[path = "supervisor.test.rs"]
mod tests;
