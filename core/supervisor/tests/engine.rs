//! End-to-end engine scenario: a blocking safety module redacts PII before
//! the AI call, a non-blocking logging module observes the redacted context,
//! and the emitted extraction reaches the persistence sink.

use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use serde_json::json;

use lattice_protocol::Extraction;
use lattice_protocol::HookContext;
use lattice_protocol::HookEvent;
use lattice_protocol::HookResult;
use lattice_protocol::MessageBody;
use lattice_protocol::Modifications;
use lattice_supervisor::ExtractionSink;
use lattice_supervisor::ModuleEvent;
use lattice_supervisor::Supervisor;
use lattice_supervisor::SupervisorBuilder;
use lattice_worker::Module;
use lattice_worker::ModuleApi;
use lattice_worker::ModuleRegistry;

/// Replaces the SSN in the user message and flags it as an extraction.
struct SafetyModule;

impl Module for SafetyModule {
    fn handle(
        &mut self,
        ctx: &HookContext,
        api: &mut dyn ModuleApi,
    ) -> lattice_worker::error::Result<HookResult> {
        let content = ctx.message.as_ref().map(|m| m.content.as_str()).unwrap_or("");
        if !content.contains("123-45-6789") {
            return Ok(HookResult::ok());
        }
        api.emit(Extraction::new("pii_detected", json!({ "kind": "ssn" })));
        Ok(HookResult::modified(Modifications {
            message: Some(MessageBody::new(content.replace("123-45-6789", "[SSN]"))),
            ..Default::default()
        }))
    }
}

/// Records what it saw; runs off the critical path.
struct LoggingModule {
    seen: Arc<Mutex<Vec<String>>>,
}

impl Module for LoggingModule {
    fn handle(
        &mut self,
        ctx: &HookContext,
        api: &mut dyn ModuleApi,
    ) -> lattice_worker::error::Result<HookResult> {
        let content = ctx.message.as_ref().map(|m| m.content.clone()).unwrap_or_default();
        self.seen.lock().unwrap().push(content);
        api.emit(Extraction::new("chat_logged", json!({})));
        Ok(HookResult::ok())
    }
}

/// Collects the extraction stream the engine hands to persistence.
#[derive(Default)]
struct MemorySink {
    records: Mutex<Vec<Extraction>>,
}

impl ExtractionSink for MemorySink {
    fn record(&self, extraction: Extraction) {
        self.records.lock().unwrap().push(extraction);
    }
}

fn write_module(root: &Path, name: &str, manifest: serde_json::Value) {
    let dir = root.join(name);
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(
        dir.join("module.json"),
        serde_json::to_string_pretty(&manifest).unwrap(),
    )
    .unwrap();
}

async fn wait_ready(sup: &Arc<Supervisor>, count: usize) {
    let mut events = sup.subscribe();
    let mut ready = 0;
    tokio::time::timeout(Duration::from_secs(5), async {
        while ready < count {
            if let Ok(ModuleEvent::Ready { .. }) = events.recv().await {
                ready += 1;
            }
        }
    })
    .await
    .expect("modules never became ready");
}

#[tokio::test(flavor = "multi_thread")]
async fn safety_redaction_flows_through_the_whole_engine() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::new(MemorySink::default());

    let mut registry = ModuleRegistry::new();
    registry.register("safety", || Box::new(SafetyModule));
    {
        let seen = Arc::clone(&seen);
        registry.register("logging", move || {
            Box::new(LoggingModule {
                seen: Arc::clone(&seen),
            })
        });
    }
    let sup = SupervisorBuilder::new(registry)
        .with_sink(Arc::<MemorySink>::clone(&sink))
        .build();

    let root = tempfile::tempdir().unwrap();
    write_module(
        root.path(),
        "safety",
        json!({
            "name": "safety",
            "version": "1.0.0",
            "hooks": ["chat:before_ai"],
            "priorities": { "chat:before_ai": 10 },
            "timeouts": { "chat:before_ai": 3000 }
        }),
    );
    write_module(
        root.path(),
        "logging",
        json!({
            "name": "logging",
            "version": "1.0.0",
            "hooks": ["chat:before_ai"],
            "priorities": { "chat:before_ai": 90 },
            "blocking": { "chat:before_ai": false }
        }),
    );
    sup.load_module(&root.path().join("safety")).await.unwrap();
    sup.load_module(&root.path().join("logging")).await.unwrap();
    wait_ready(&sup, 2).await;

    let ctx = HookContext::new(HookEvent::ChatBeforeAi)
        .with_session_id("sess-1")
        .with_user_id("u1")
        .with_message("my ssn is 123-45-6789");
    let result = sup.execute_hook(ctx).await;

    // The synchronous aggregate carries the redaction and only the safety
    // module's extraction.
    match result {
        HookResult::Continue {
            modifications,
            extractions,
        } => {
            assert_eq!(
                modifications.message.as_ref().unwrap().content,
                "my ssn is [SSN]"
            );
            assert_eq!(extractions.len(), 1);
            assert_eq!(extractions[0].kind, "pii_detected");
            assert_eq!(extractions[0].module.as_deref(), Some("safety"));
            assert_eq!(extractions[0].session_id.as_deref(), Some("sess-1"));
        }
        HookResult::Block { reason, .. } => panic!("unexpected block: {reason}"),
    }

    // The logging module eventually observes the redacted content, never the
    // raw SSN.
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            let snapshot = seen.lock().unwrap().clone();
            if !snapshot.is_empty() {
                assert_eq!(snapshot, vec!["my ssn is [SSN]".to_string()]);
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("logging module never ran");

    // Both modules' extractions reach the persistence sink via the one-way
    // stream.
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            let kinds: Vec<String> = sink
                .records
                .lock()
                .unwrap()
                .iter()
                .map(|e| e.kind.clone())
                .collect();
            if kinds.contains(&"pii_detected".to_string())
                && kinds.contains(&"chat_logged".to_string())
            {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("extractions never reached the sink");

    let statuses = sup.module_statuses().await;
    assert_eq!(statuses.len(), 2);
}
