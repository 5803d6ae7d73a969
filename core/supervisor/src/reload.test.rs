use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::json;

use lattice_protocol::HookContext;
use lattice_protocol::HookResult;
use lattice_worker::Module;
use lattice_worker::ModuleApi;
use lattice_worker::ModuleRegistry;

use crate::reload::HotReload;
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

fn supervisor() -> Arc<Supervisor> {
    let mut registry = ModuleRegistry::new();
    registry.register("well", || Box::new(Well));
    SupervisorBuilder::new(registry).build()
}

fn write_module(root: &Path, name: &str) {
    let dir = root.join(name);
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(
        dir.join("module.json"),
        serde_json::to_string_pretty(&json!({
            "name": name,
            "version": "1.0.0",
            "entry": "well",
            "hooks": ["chat:message"]
        }))
        .unwrap(),
    )
    .unwrap();
}

async fn wait_ready(sup: &Arc<Supervisor>, name: &str) {
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let statuses = sup.module_statuses().await;
            if statuses
                .iter()
                .any(|s| s.name == name && s.state == lattice_protocol::ModuleState::Ready)
            {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("module '{name}' never became ready"));
}

#[tokio::test(flavor = "multi_thread")]
async fn new_manifest_on_disk_loads_the_module() {
    let sup = supervisor();
    let root = tempfile::tempdir().unwrap();
    let _watch = HotReload::start_with_debounce(&sup, root.path(), Duration::from_millis(100))
        .unwrap();

    write_module(root.path(), "well");
    wait_ready(&sup, "well").await;
    assert!(sup.is_loaded("well").await);
}

#[tokio::test(flavor = "multi_thread")]
async fn rapid_edits_collapse_into_one_reload() {
    let sup = supervisor();
    let root = tempfile::tempdir().unwrap();
    write_module(root.path(), "well");
    sup.load_module(&root.path().join("well")).await.unwrap();
    wait_ready(&sup, "well").await;

    let mut events = sup.subscribe();
    let _watch = HotReload::start_with_debounce(&sup, root.path(), Duration::from_millis(200))
        .unwrap();

    // Three edits inside one debounce window.
    for _ in 0..3 {
        write_module(root.path(), "well");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    // Exactly one unload/load cycle fires once the window goes quiet.
    let mut loads = 0;
    let observe = tokio::time::timeout(Duration::from_secs(3), async {
        loop {
            if let Ok(ModuleEvent::Loaded { .. }) = events.recv().await {
                loads += 1;
            }
        }
    })
    .await;
    assert!(observe.is_err(), "observation window should expire");
    assert_eq!(loads, 1);
    wait_ready(&sup, "well").await;
}

#[tokio::test(flavor = "multi_thread")]
async fn deleted_manifest_unloads_the_module() {
    let sup = supervisor();
    let root = tempfile::tempdir().unwrap();
    write_module(root.path(), "well");
    sup.load_module(&root.path().join("well")).await.unwrap();
    wait_ready(&sup, "well").await;

    let _watch = HotReload::start_with_debounce(&sup, root.path(), Duration::from_millis(100))
        .unwrap();
    std::fs::remove_file(root.path().join("well").join("module.json")).unwrap();

    tokio::time::timeout(Duration::from_secs(10), async {
        while sup.is_loaded("well").await {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("module was never unloaded");
}
