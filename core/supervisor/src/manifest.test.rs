use std::path::Path;
use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::json;

use lattice_protocol::HookEvent;

use crate::error::SupervisorError;
use crate::manifest::DEFAULT_PRIORITY;
use crate::manifest::MODULE_MANIFEST;
use crate::manifest::ModuleManifest;

fn write_manifest(dir: &Path, value: serde_json::Value) {
    std::fs::write(
        dir.join(MODULE_MANIFEST),
        serde_json::to_string_pretty(&value).unwrap(),
    )
    .unwrap();
}

#[test]
fn loads_a_full_manifest() {
    let dir = tempfile::tempdir().unwrap();
    write_manifest(
        dir.path(),
        json!({
            "name": "safety",
            "version": "1.2.0",
            "entry": "pii_guard",
            "hooks": ["chat:before_ai", "chat:message"],
            "priorities": { "chat:before_ai": 10 },
            "blocking": { "chat:message": true },
            "timeouts": { "chat:before_ai": 3000 },
            "defaults": { "redact": true },
            "limits": { "max_memory_mb": 128, "max_execution_ms": 2000 },
            "dependencies": ["logging"]
        }),
    );

    let manifest = ModuleManifest::load(dir.path()).unwrap();
    assert_eq!(manifest.name, "safety");
    assert_eq!(manifest.entry(), "pii_guard");
    assert!(manifest.handles(HookEvent::ChatBeforeAi));
    assert!(!manifest.handles(HookEvent::ToolBefore));
    assert_eq!(manifest.priority_for(HookEvent::ChatBeforeAi), 10);
    assert_eq!(manifest.priority_for(HookEvent::ChatMessage), DEFAULT_PRIORITY);
    assert!(manifest.blocking_for(HookEvent::ChatMessage));
    assert_eq!(manifest.dependencies, vec!["logging".to_string()]);
}

#[test]
fn applies_defaults_for_optional_fields() {
    let dir = tempfile::tempdir().unwrap();
    write_manifest(
        dir.path(),
        json!({ "name": "logging", "version": "0.1.0", "hooks": ["chat:before_ai", "tool:after"] }),
    );

    let manifest = ModuleManifest::load(dir.path()).unwrap();
    assert_eq!(manifest.entry(), "logging");
    assert_eq!(manifest.priority_for(HookEvent::ToolAfter), DEFAULT_PRIORITY);
    // Blocking defaults come from the event class.
    assert!(manifest.blocking_for(HookEvent::ChatBeforeAi));
    assert!(!manifest.blocking_for(HookEvent::ToolAfter));
    assert_eq!(
        manifest.timeout_for(HookEvent::ChatBeforeAi),
        Duration::from_millis(5_000)
    );
    assert!(manifest.limits.is_empty());
}

#[test]
fn missing_manifest_file_is_a_structured_error() {
    let dir = tempfile::tempdir().unwrap();
    match ModuleManifest::load(dir.path()) {
        Err(SupervisorError::ManifestMissing { .. }) => {}
        other => panic!("expected manifest-missing, got {other:?}"),
    }
}

#[test]
fn malformed_json_is_a_parse_error() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join(MODULE_MANIFEST), "{ not json").unwrap();
    match ModuleManifest::load(dir.path()) {
        Err(SupervisorError::ManifestParse { .. }) => {}
        other => panic!("expected parse error, got {other:?}"),
    }
}

#[test]
fn rejects_bad_semver() {
    let dir = tempfile::tempdir().unwrap();
    write_manifest(
        dir.path(),
        json!({ "name": "m", "version": "1.2", "hooks": ["chat:message"] }),
    );
    match ModuleManifest::load(dir.path()) {
        Err(SupervisorError::ManifestInvalid { reason, .. }) => {
            assert!(reason.contains("semver"), "{reason}");
        }
        other => panic!("expected invalid manifest, got {other:?}"),
    }
}

#[test]
fn rejects_unknown_hook_name() {
    let dir = tempfile::tempdir().unwrap();
    write_manifest(
        dir.path(),
        json!({ "name": "m", "version": "1.0.0", "hooks": ["chat:summon_demon"] }),
    );
    match ModuleManifest::load(dir.path()) {
        Err(SupervisorError::ManifestParse { .. }) => {}
        other => panic!("expected parse error for unknown hook, got {other:?}"),
    }
}

#[test]
fn rejects_ordering_keys_for_undeclared_hooks() {
    let dir = tempfile::tempdir().unwrap();
    write_manifest(
        dir.path(),
        json!({
            "name": "m",
            "version": "1.0.0",
            "hooks": ["chat:message"],
            "priorities": { "tool:before": 5 }
        }),
    );
    match ModuleManifest::load(dir.path()) {
        Err(SupervisorError::ManifestInvalid { reason, .. }) => {
            assert!(reason.contains("priorities"), "{reason}");
        }
        other => panic!("expected invalid manifest, got {other:?}"),
    }
}

#[test]
fn rejects_empty_hooks() {
    let dir = tempfile::tempdir().unwrap();
    write_manifest(dir.path(), json!({ "name": "m", "version": "1.0.0", "hooks": [] }));
    assert!(matches!(
        ModuleManifest::load(dir.path()),
        Err(SupervisorError::ManifestInvalid { .. })
    ));
}

#[test]
fn timeouts_are_clamped_and_capped() {
    let dir = tempfile::tempdir().unwrap();
    write_manifest(
        dir.path(),
        json!({
            "name": "m",
            "version": "1.0.0",
            "hooks": ["chat:message", "tool:before"],
            "timeouts": { "chat:message": 10_000_000 },
            "limits": { "max_execution_ms": 2000 }
        }),
    );
    let manifest = ModuleManifest::load(dir.path()).unwrap();
    // Clamped to the global max, then capped by the module's own limit.
    assert_eq!(
        manifest.timeout_for(HookEvent::ChatMessage),
        Duration::from_millis(2000)
    );
    assert_eq!(
        manifest.timeout_for(HookEvent::ToolBefore),
        Duration::from_millis(2000)
    );
}
