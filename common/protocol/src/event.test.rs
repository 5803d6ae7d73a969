use std::str::FromStr;

use pretty_assertions::assert_eq;

use super::*;

#[test]
fn test_as_str_round_trips_through_from_str() {
    for event in HookEvent::ALL {
        assert_eq!(HookEvent::from_str(event.as_str()), Ok(event));
    }
}

#[test]
fn test_from_str_rejects_unknown_names() {
    let err = HookEvent::from_str("chat:between_ai").expect_err("should not parse");
    assert_eq!(err.name, "chat:between_ai");
    assert!(err.to_string().contains("unknown hook name"));
}

#[test]
fn test_serde_uses_colon_names() {
    let json = serde_json::to_string(&HookEvent::ChatBeforeAi).expect("serialize");
    assert_eq!(json, "\"chat:before_ai\"");

    let event: HookEvent = serde_json::from_str("\"session:start\"").expect("deserialize");
    assert_eq!(event, HookEvent::SessionStart);
}

#[test]
fn test_only_ai_hooks_block_by_default() {
    assert!(HookEvent::ChatBeforeAi.default_blocking());
    assert!(HookEvent::ChatAfterAi.default_blocking());
    assert!(!HookEvent::ChatMessage.default_blocking());
    assert!(!HookEvent::SessionStart.default_blocking());
    assert!(!HookEvent::ToolAfter.default_blocking());
}
