use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::Value;
use serde_json::json;

use lattice_protocol::Extraction;
use lattice_protocol::HookContext;
use lattice_protocol::HookEvent;
use lattice_protocol::HookResult;
use lattice_protocol::MessageBody;
use lattice_protocol::Modifications;
use lattice_worker::Module;
use lattice_worker::ModuleApi;
use lattice_worker::ModuleRegistry;

use crate::supervisor::ModuleEvent;
use crate::supervisor::Supervisor;
use crate::supervisor::SupervisorBuilder;

/// Appends its own name to a shared order log on every call.
struct OrderProbe {
    name: String,
    log: Arc<Mutex<Vec<String>>>,
}

impl Module for OrderProbe {
    fn handle(
        &mut self,
        _ctx: &HookContext,
        _api: &mut dyn ModuleApi,
    ) -> lattice_worker::error::Result<HookResult> {
        self.log.lock().unwrap().push(self.name.clone());
        Ok(HookResult::ok())
    }
}

/// Appends a suffix to the in-flight message so ordering is observable in
/// the folded modifications.
struct Tagger {
    tag: String,
}

impl Module for Tagger {
    fn handle(
        &mut self,
        ctx: &HookContext,
        _api: &mut dyn ModuleApi,
    ) -> lattice_worker::error::Result<HookResult> {
        let content = ctx.message.as_ref().map(|m| m.content.as_str()).unwrap_or("");
        Ok(HookResult::modified(Modifications {
            message: Some(MessageBody::new(format!("{content}+{}", self.tag))),
            ..Default::default()
        }))
    }
}

struct Blocker;

impl Module for Blocker {
    fn handle(
        &mut self,
        _ctx: &HookContext,
        _api: &mut dyn ModuleApi,
    ) -> lattice_worker::error::Result<HookResult> {
        let mut result = HookResult::block_with_response("policy", "ask a teacher");
        if let HookResult::Block { extractions, .. } = &mut result {
            extractions.push(Extraction::new("blocked", json!({})));
        }
        Ok(result)
    }
}

struct Emitter;

impl Module for Emitter {
    fn handle(
        &mut self,
        _ctx: &HookContext,
        api: &mut dyn ModuleApi,
    ) -> lattice_worker::error::Result<HookResult> {
        api.emit(Extraction::new("seen", json!({})));
        Ok(HookResult::ok())
    }
}

/// Sleeps past its timeout, then tries to modify the message.
struct Sloth;

impl Module for Sloth {
    fn handle(
        &mut self,
        _ctx: &HookContext,
        _api: &mut dyn ModuleApi,
    ) -> lattice_worker::error::Result<HookResult> {
        std::thread::sleep(Duration::from_millis(300));
        Ok(HookResult::modified(Modifications {
            message: Some(MessageBody::new("too late")),
            ..Default::default()
        }))
    }
}

/// Records the message content it observed.
struct Spy {
    seen: Arc<Mutex<Vec<String>>>,
}

impl Module for Spy {
    fn handle(
        &mut self,
        ctx: &HookContext,
        _api: &mut dyn ModuleApi,
    ) -> lattice_worker::error::Result<HookResult> {
        let content = ctx.message.as_ref().map(|m| m.content.clone()).unwrap_or_default();
        self.seen.lock().unwrap().push(content);
        // A non-blocking module's result must never affect the aggregate.
        Ok(HookResult::block("spy tantrum"))
    }
}

fn write_module(root: &Path, name: &str, manifest: Value) {
    let dir = root.join(name);
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(
        dir.join("module.json"),
        serde_json::to_string_pretty(&manifest).unwrap(),
    )
    .unwrap();
}

async fn load_all(sup: &Arc<Supervisor>, root: &Path, names: &[&str]) {
    let mut events = sup.subscribe();
    for name in names {
        sup.load_module(&root.join(name)).await.unwrap();
    }
    let mut ready = 0;
    tokio::time::timeout(Duration::from_secs(5), async {
        while ready < names.len() {
            if let Ok(ModuleEvent::Ready { .. }) = events.recv().await {
                ready += 1;
            }
        }
    })
    .await
    .expect("modules never became ready");
}

fn blocking_manifest(name: &str, priority: i32) -> Value {
    json!({
        "name": name,
        "version": "1.0.0",
        "hooks": ["chat:message"],
        "priorities": { "chat:message": priority },
        "blocking": { "chat:message": true }
    })
}

#[tokio::test(flavor = "multi_thread")]
async fn blocking_modules_run_in_ascending_priority_order() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut registry = ModuleRegistry::new();
    for name in ["third", "first", "second"] {
        let log = Arc::clone(&log);
        registry.register(name, move || {
            Box::new(OrderProbe {
                name: name.to_string(),
                log: Arc::clone(&log),
            })
        });
    }
    let sup = SupervisorBuilder::new(registry).build();
    let root = tempfile::tempdir().unwrap();
    write_module(root.path(), "third", blocking_manifest("third", 30));
    write_module(root.path(), "first", blocking_manifest("first", 10));
    write_module(root.path(), "second", blocking_manifest("second", 20));
    load_all(&sup, root.path(), &["third", "first", "second"]).await;

    let result = sup.execute_hook(HookContext::new(HookEvent::ChatMessage)).await;
    assert!(!result.is_block());
    assert_eq!(*log.lock().unwrap(), vec!["first", "second", "third"]);
}

#[tokio::test(flavor = "multi_thread")]
async fn equal_priority_ties_break_by_load_order() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut registry = ModuleRegistry::new();
    for name in ["one", "two", "three"] {
        let log = Arc::clone(&log);
        registry.register(name, move || {
            Box::new(OrderProbe {
                name: name.to_string(),
                log: Arc::clone(&log),
            })
        });
    }
    let sup = SupervisorBuilder::new(registry).build();
    let root = tempfile::tempdir().unwrap();
    for name in ["one", "two", "three"] {
        write_module(root.path(), name, blocking_manifest(name, 50));
    }
    load_all(&sup, root.path(), &["one", "two", "three"]).await;

    for _ in 0..3 {
        log.lock().unwrap().clear();
        sup.execute_hook(HookContext::new(HookEvent::ChatMessage)).await;
        assert_eq!(*log.lock().unwrap(), vec!["one", "two", "three"]);
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn block_short_circuits_with_extractions_so_far() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut registry = ModuleRegistry::new();
    registry.register("emitter", || Box::new(Emitter));
    registry.register("blocker", || Box::new(Blocker));
    {
        let log = Arc::clone(&log);
        registry.register("after", move || {
            Box::new(OrderProbe {
                name: "after".to_string(),
                log: Arc::clone(&log),
            })
        });
    }
    let sup = SupervisorBuilder::new(registry).build();
    let root = tempfile::tempdir().unwrap();
    write_module(root.path(), "emitter", blocking_manifest("emitter", 10));
    write_module(root.path(), "blocker", blocking_manifest("blocker", 20));
    write_module(root.path(), "after", blocking_manifest("after", 30));
    load_all(&sup, root.path(), &["emitter", "blocker", "after"]).await;

    let result = sup.execute_hook(HookContext::new(HookEvent::ChatMessage)).await;
    match result {
        HookResult::Block {
            reason,
            response,
            extractions,
        } => {
            assert_eq!(reason, "policy");
            assert_eq!(response.as_deref(), Some("ask a teacher"));
            let kinds: Vec<&str> = extractions.iter().map(|e| e.kind.as_str()).collect();
            assert_eq!(kinds, vec!["seen", "blocked"]);
        }
        HookResult::Continue { .. } => panic!("expected block"),
    }
    // The module after the blocker never ran.
    assert!(log.lock().unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn timed_out_module_is_skipped_and_reported() {
    let mut registry = ModuleRegistry::new();
    registry.register("sloth", || Box::new(Sloth));
    registry.register("tagger", || {
        Box::new(Tagger {
            tag: "tagged".to_string(),
        })
    });
    let sup = SupervisorBuilder::new(registry).build();
    let mut events = sup.subscribe();
    let root = tempfile::tempdir().unwrap();
    write_module(
        root.path(),
        "sloth",
        json!({
            "name": "sloth",
            "version": "1.0.0",
            "hooks": ["chat:message"],
            "priorities": { "chat:message": 10 },
            "blocking": { "chat:message": true },
            "timeouts": { "chat:message": 50 }
        }),
    );
    write_module(root.path(), "tagger", blocking_manifest("tagger", 20));
    load_all(&sup, root.path(), &["sloth", "tagger"]).await;

    let ctx = HookContext::new(HookEvent::ChatMessage).with_message("hi");
    let result = sup.execute_hook(ctx).await;
    match result {
        HookResult::Continue { modifications, .. } => {
            // The sloth's late modification is excluded; the tagger's lands.
            assert_eq!(modifications.message.unwrap().content, "hi+tagged");
        }
        HookResult::Block { .. } => panic!("expected continue"),
    }

    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            if let Ok(ModuleEvent::CallFailed { module, hook, .. }) = events.recv().await {
                assert_eq!(module, "sloth");
                assert_eq!(hook, HookEvent::ChatMessage);
                return;
            }
        }
    })
    .await
    .expect("timeout was never reported as a health event");
}

#[tokio::test(flavor = "multi_thread")]
async fn no_matching_modules_yields_plain_continue() {
    let sup = SupervisorBuilder::new(ModuleRegistry::new()).build();
    let result = sup.execute_hook(HookContext::new(HookEvent::SessionEnd)).await;
    match result {
        HookResult::Continue {
            modifications,
            extractions,
        } => {
            assert!(modifications.is_empty());
            assert!(extractions.is_empty());
        }
        HookResult::Block { .. } => panic!("expected continue"),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn non_blocking_module_sees_threaded_context_and_cannot_block() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let mut registry = ModuleRegistry::new();
    registry.register("tagger", || {
        Box::new(Tagger {
            tag: "redacted".to_string(),
        })
    });
    {
        let seen = Arc::clone(&seen);
        registry.register("spy", move || {
            Box::new(Spy {
                seen: Arc::clone(&seen),
            })
        });
    }
    let sup = SupervisorBuilder::new(registry).build();
    let root = tempfile::tempdir().unwrap();
    write_module(root.path(), "tagger", blocking_manifest("tagger", 10));
    write_module(
        root.path(),
        "spy",
        json!({
            "name": "spy",
            "version": "1.0.0",
            "hooks": ["chat:message"],
            "priorities": { "chat:message": 90 },
            "blocking": { "chat:message": false }
        }),
    );
    load_all(&sup, root.path(), &["tagger", "spy"]).await;

    let ctx = HookContext::new(HookEvent::ChatMessage).with_message("raw");
    let result = sup.execute_hook(ctx).await;
    // The spy returned block, but non-blocking results never affect the
    // aggregate.
    match result {
        HookResult::Continue { modifications, .. } => {
            assert_eq!(modifications.message.unwrap().content, "raw+redacted");
        }
        HookResult::Block { .. } => panic!("expected continue"),
    }

    // The spy eventually observed the already-tagged content.
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            if seen.lock().unwrap().first().map(String::as_str) == Some("raw+redacted") {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("spy never saw the threaded context");
}
