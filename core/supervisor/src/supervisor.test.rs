use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::Value;
use serde_json::json;
use tokio::sync::broadcast;

use lattice_protocol::HookContext;
use lattice_protocol::HookResult;
use lattice_protocol::ModuleState;
use lattice_worker::Module;
use lattice_worker::ModuleApi;
use lattice_worker::ModuleRegistry;
use lattice_worker::WorkerError;

use crate::error::SupervisorError;
use crate::health::RestartPolicy;
use crate::supervisor::ModuleEvent;
use crate::supervisor::Supervisor;
use crate::supervisor::SupervisorBuilder;

struct Well;

impl Module for Well {
    fn handle(
        &mut self,
        _ctx: &HookContext,
        _api: &mut dyn ModuleApi,
    ) -> lattice_worker::error::Result<HookResult> {
        Ok(HookResult::ok())
    }
}

struct FailingLoad;

impl Module for FailingLoad {
    fn on_load(&mut self, _config: &Value) -> lattice_worker::error::Result<()> {
        Err(WorkerError::handler("refuses to start"))
    }

    fn handle(
        &mut self,
        _ctx: &HookContext,
        _api: &mut dyn ModuleApi,
    ) -> lattice_worker::error::Result<HookResult> {
        Ok(HookResult::ok())
    }
}

struct SlowUnload;

impl Module for SlowUnload {
    fn handle(
        &mut self,
        _ctx: &HookContext,
        _api: &mut dyn ModuleApi,
    ) -> lattice_worker::error::Result<HookResult> {
        Ok(HookResult::ok())
    }

    fn on_unload(&mut self) {
        std::thread::sleep(Duration::from_millis(200));
    }
}

struct ConfigCapture {
    seen: Arc<Mutex<Option<Value>>>,
}

impl Module for ConfigCapture {
    fn handle(
        &mut self,
        _ctx: &HookContext,
        _api: &mut dyn ModuleApi,
    ) -> lattice_worker::error::Result<HookResult> {
        Ok(HookResult::ok())
    }

    fn on_config_update(&mut self, config: &Value) {
        *self.seen.lock().unwrap() = Some(config.clone());
    }
}

fn write_module(root: &Path, name: &str) -> PathBuf {
    write_module_with(root, name, json!({}))
}

fn write_module_with(root: &Path, name: &str, extra: Value) -> PathBuf {
    let dir = root.join(name);
    std::fs::create_dir_all(&dir).unwrap();
    let mut manifest = json!({
        "name": name,
        "version": "1.0.0",
        "hooks": ["chat:message"]
    });
    if let (Value::Object(base), Value::Object(extra)) = (&mut manifest, extra) {
        base.extend(extra);
    }
    std::fs::write(
        dir.join("module.json"),
        serde_json::to_string_pretty(&manifest).unwrap(),
    )
    .unwrap();
    dir
}

async fn wait_for<F>(rx: &mut broadcast::Receiver<ModuleEvent>, mut pred: F) -> ModuleEvent
where
    F: FnMut(&ModuleEvent) -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let event = rx.recv().await.unwrap();
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .expect("event never arrived")
}

fn well_supervisor() -> Arc<Supervisor> {
    let mut registry = ModuleRegistry::new();
    registry.register("well", || Box::new(Well));
    SupervisorBuilder::new(registry).build()
}

#[tokio::test(flavor = "multi_thread")]
async fn load_reaches_ready_asynchronously() {
    let sup = well_supervisor();
    let mut events = sup.subscribe();
    let root = tempfile::tempdir().unwrap();
    let dir = write_module_with(root.path(), "well", json!({}));

    sup.load_module(&dir).await.unwrap();
    wait_for(&mut events, |e| matches!(e, ModuleEvent::Ready { module } if module == "well")).await;

    let statuses = sup.module_statuses().await;
    assert_eq!(statuses.len(), 1);
    assert_eq!(statuses[0].name, "well");
    assert_eq!(statuses[0].state, ModuleState::Ready);
    assert_eq!(statuses[0].restart_count, 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn duplicate_name_is_rejected_without_touching_the_loaded_module() {
    let sup = well_supervisor();
    let mut events = sup.subscribe();
    let root = tempfile::tempdir().unwrap();
    let dir = write_module(root.path(), "well");

    sup.load_module(&dir).await.unwrap();
    wait_for(&mut events, |e| matches!(e, ModuleEvent::Ready { .. })).await;

    match sup.load_module(&dir).await {
        Err(SupervisorError::AlreadyLoaded { name }) => assert_eq!(name, "well"),
        other => panic!("expected already-loaded, got {other:?}"),
    }
    assert_eq!(sup.module_statuses().await[0].state, ModuleState::Ready);
}

#[tokio::test(flavor = "multi_thread")]
async fn unknown_entry_point_is_rejected() {
    let sup = well_supervisor();
    let root = tempfile::tempdir().unwrap();
    let dir = write_module(root.path(), "mystery");

    match sup.load_module(&dir).await {
        Err(SupervisorError::UnknownEntry { entry, .. }) => assert_eq!(entry, "mystery"),
        other => panic!("expected unknown-entry, got {other:?}"),
    }
    assert!(sup.module_statuses().await.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn unload_removes_the_module() {
    let sup = well_supervisor();
    let mut events = sup.subscribe();
    let root = tempfile::tempdir().unwrap();
    let dir = write_module(root.path(), "well");

    sup.load_module(&dir).await.unwrap();
    wait_for(&mut events, |e| matches!(e, ModuleEvent::Ready { .. })).await;

    sup.unload_module("well").await.unwrap();
    assert!(sup.module_statuses().await.is_empty());
    assert!(!sup.is_loaded("well").await);

    match sup.unload_module("well").await {
        Err(SupervisorError::NotLoaded { .. }) => {}
        other => panic!("expected not-loaded, got {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn unload_while_stopping_is_idempotent() {
    let mut registry = ModuleRegistry::new();
    registry.register("slow", || Box::new(SlowUnload));
    let sup = SupervisorBuilder::new(registry)
        .with_unload_grace(Duration::from_secs(2))
        .build();
    let mut events = sup.subscribe();
    let root = tempfile::tempdir().unwrap();
    let dir = write_module_with(root.path(), "slow", json!({}));

    sup.load_module(&dir).await.unwrap();
    wait_for(&mut events, |e| matches!(e, ModuleEvent::Ready { .. })).await;

    // First unload enters Stopping and waits on the slow acknowledgment.
    let first = {
        let sup = Arc::clone(&sup);
        tokio::spawn(async move { sup.unload_module("slow").await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Second unload sees Stopping and returns immediately without error.
    sup.unload_module("slow").await.unwrap();
    first.await.unwrap().unwrap();
    assert!(!sup.is_loaded("slow").await);
}

#[tokio::test(flavor = "multi_thread")]
async fn crashing_module_backs_off_then_disables() {
    let mut registry = ModuleRegistry::new();
    registry.register("crasher", || Box::new(FailingLoad));
    let sup = SupervisorBuilder::new(registry)
        .with_restart_policy(RestartPolicy {
            max_restarts: 2,
            base_delay_ms: 10,
            cap_delay_ms: 40,
        })
        .build();
    let mut events = sup.subscribe();
    let root = tempfile::tempdir().unwrap();
    let dir = write_module_with(root.path(), "crasher", json!({}));

    sup.load_module(&dir).await.unwrap();

    let mut failures = 0;
    let mut delays: Vec<Duration> = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match events.recv().await.unwrap() {
                ModuleEvent::Failed { .. } => failures += 1,
                ModuleEvent::RestartScheduled { delay, .. } => delays.push(delay),
                ModuleEvent::Disabled { .. } => return,
                _ => {}
            }
        }
    })
    .await
    .expect("module never disabled");

    // Initial start plus two retries, each observed as a failure.
    assert_eq!(failures, 3);
    assert_eq!(delays, vec![Duration::from_millis(10), Duration::from_millis(20)]);

    let statuses = sup.module_statuses().await;
    assert_eq!(statuses[0].state, ModuleState::Disabled);
    assert_eq!(statuses[0].restart_count, 3);
    assert!(statuses[0].last_error.as_deref().unwrap().contains("refuses to start"));
}

#[tokio::test(flavor = "multi_thread")]
async fn disable_then_enable_reloads_from_source() {
    let sup = well_supervisor();
    let mut events = sup.subscribe();
    let root = tempfile::tempdir().unwrap();
    let dir = write_module(root.path(), "well");

    sup.load_module(&dir).await.unwrap();
    wait_for(&mut events, |e| matches!(e, ModuleEvent::Ready { .. })).await;

    sup.disable_module("well").await.unwrap();
    assert_eq!(sup.module_statuses().await[0].state, ModuleState::Disabled);

    sup.enable_module("well").await.unwrap();
    wait_for(&mut events, |e| matches!(e, ModuleEvent::Ready { .. })).await;
    let statuses = sup.module_statuses().await;
    assert_eq!(statuses[0].state, ModuleState::Ready);
    assert_eq!(statuses[0].restart_count, 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn enable_requires_disabled_state() {
    let sup = well_supervisor();
    let mut events = sup.subscribe();
    let root = tempfile::tempdir().unwrap();
    let dir = write_module(root.path(), "well");

    sup.load_module(&dir).await.unwrap();
    wait_for(&mut events, |e| matches!(e, ModuleEvent::Ready { .. })).await;

    match sup.enable_module("well").await {
        Err(SupervisorError::NotDisabled { state, .. }) => assert_eq!(state, "ready"),
        other => panic!("expected not-disabled, got {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn config_update_reaches_the_module() {
    let seen = Arc::new(Mutex::new(None));
    let capture = Arc::clone(&seen);
    let mut registry = ModuleRegistry::new();
    registry.register("tunable", move || {
        Box::new(ConfigCapture {
            seen: Arc::clone(&capture),
        })
    });
    let sup = SupervisorBuilder::new(registry).build();
    let mut events = sup.subscribe();
    let root = tempfile::tempdir().unwrap();
    let dir = write_module_with(root.path(), "tunable", json!({}));

    sup.load_module(&dir).await.unwrap();
    wait_for(&mut events, |e| matches!(e, ModuleEvent::Ready { .. })).await;

    sup.update_module_config("tunable", json!({ "verbosity": 3 }))
        .await
        .unwrap();
    wait_for(&mut events, |e| matches!(e, ModuleEvent::ConfigUpdated { .. })).await;

    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            if seen.lock().unwrap().as_ref() == Some(&json!({ "verbosity": 3 })) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("config never reached the module");
}

#[tokio::test(flavor = "multi_thread")]
async fn statuses_are_ordered_by_load_sequence() {
    let mut registry = ModuleRegistry::new();
    registry.register("well", || Box::new(Well));
    let sup = SupervisorBuilder::new(registry).build();
    let mut events = sup.subscribe();
    let root = tempfile::tempdir().unwrap();

    for name in ["zeta", "alpha", "mid"] {
        let dir = write_module_with(root.path(), name, json!({ "entry": "well" }));
        sup.load_module(&dir).await.unwrap();
        wait_for(&mut events, |e| matches!(e, ModuleEvent::Ready { module } if module == name))
            .await;
    }

    let names: Vec<String> = sup
        .module_statuses()
        .await
        .into_iter()
        .map(|s| s.name)
        .collect();
    assert_eq!(names, vec!["zeta", "alpha", "mid"]);
}
