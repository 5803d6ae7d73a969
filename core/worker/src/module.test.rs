use pretty_assertions::assert_eq;
use serde_json::json;

use lattice_protocol::HookEvent;

use super::*;

struct EchoModule;

impl Module for EchoModule {
    fn handle(&mut self, ctx: &HookContext, api: &mut dyn ModuleApi) -> Result<HookResult> {
        api.emit(Extraction::new("echo", json!({"hook": ctx.hook.as_str()})));
        Ok(HookResult::ok())
    }
}

#[derive(Default)]
struct RecordingApi {
    emitted: Vec<Extraction>,
    logged: Vec<(LogLevel, String)>,
}

impl ModuleApi for RecordingApi {
    fn emit(&mut self, extraction: Extraction) {
        self.emitted.push(extraction);
    }

    fn log(&mut self, level: LogLevel, message: &str) {
        self.logged.push((level, message.to_string()));
    }

    fn query(&mut self, _query: ExtractionQuery) -> Result<QueryReply> {
        Ok(QueryReply::Extractions { items: Vec::new() })
    }
}

#[test]
fn test_module_emits_through_api() {
    let mut module = EchoModule;
    let mut api = RecordingApi::default();
    let ctx = HookContext::new(HookEvent::ChatMessage);

    let result = module.handle(&ctx, &mut api).expect("handle");
    assert!(!result.is_block());
    assert_eq!(api.emitted.len(), 1);
    assert_eq!(api.emitted[0].kind, "echo");
}

#[test]
fn test_registry_register_and_lookup() {
    let mut registry = ModuleRegistry::new();
    assert!(registry.is_empty());

    registry.register("echo", || Box::new(EchoModule));
    assert!(registry.contains("echo"));
    assert!(!registry.contains("missing"));
    assert_eq!(registry.len(), 1);

    let factory = registry.factory("echo").expect("factory");
    let mut module = factory();
    let mut api = RecordingApi::default();
    let ctx = HookContext::new(HookEvent::SessionStart);
    assert!(module.handle(&ctx, &mut api).is_ok());
}

#[test]
fn test_register_replaces_existing_entry() {
    let mut registry = ModuleRegistry::new();
    registry.register("echo", || Box::new(EchoModule));
    registry.register("echo", || Box::new(EchoModule));
    assert_eq!(registry.len(), 1);
}
