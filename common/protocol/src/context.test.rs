use pretty_assertions::assert_eq;
use serde_json::json;

use super::*;

#[test]
fn test_builder_chains() {
    let ctx = HookContext::new(HookEvent::ChatBeforeAi)
        .with_session_id("s1")
        .with_user_id("u1")
        .with_class_id("c1")
        .with_message("hello");

    assert_eq!(ctx.hook, HookEvent::ChatBeforeAi);
    assert_eq!(ctx.session_id.as_deref(), Some("s1"));
    assert_eq!(ctx.user_id.as_deref(), Some("u1"));
    assert_eq!(ctx.class_id.as_deref(), Some("c1"));
    assert_eq!(ctx.message, Some(MessageBody::new("hello")));
    assert!(ctx.response.is_none());
}

#[test]
fn test_request_ids_are_unique() {
    assert_ne!(RequestId::new(), RequestId::new());
}

#[test]
fn test_apply_replaces_only_modified_fields() {
    let mut ctx = HookContext::new(HookEvent::ChatBeforeAi)
        .with_message("my ssn is 123-45-6789")
        .with_response("original");

    let mods = Modifications {
        message: Some(MessageBody::new("my ssn is [SSN]")),
        response: None,
        output: None,
    };
    ctx.apply(&mods);

    assert_eq!(ctx.message, Some(MessageBody::new("my ssn is [SSN]")));
    assert_eq!(ctx.response, Some(MessageBody::new("original")));
}

#[test]
fn test_serde_omits_absent_fields() {
    let ctx = HookContext::new(HookEvent::ToolBefore).with_tool("calculator", json!({"a": 1}));
    let value = serde_json::to_value(&ctx).expect("serialize");

    assert_eq!(value["hook"], "tool:before");
    assert_eq!(value["tool_name"], "calculator");
    assert!(value.get("session_id").is_none());
    assert!(value.get("message").is_none());
}
