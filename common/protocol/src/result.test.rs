use pretty_assertions::assert_eq;
use serde_json::json;

use super::*;

#[test]
fn test_continue_serializes_with_action_tag() {
    let value = serde_json::to_value(HookResult::ok()).expect("serialize");
    assert_eq!(value, json!({"action": "continue"}));
}

#[test]
fn test_block_serializes_reason_and_response() {
    let result = HookResult::block_with_response("pii detected", "Please rephrase.");
    let value = serde_json::to_value(&result).expect("serialize");
    assert_eq!(
        value,
        json!({
            "action": "block",
            "reason": "pii detected",
            "response": "Please rephrase."
        })
    );
}

#[test]
fn test_deserialize_defaults_optional_fields() {
    let result: HookResult = serde_json::from_value(json!({"action": "continue"})).expect("parse");
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

#[test]
fn test_merge_later_fields_win() {
    let mut acc = Modifications {
        message: Some(MessageBody::new("first")),
        response: None,
        output: Some(json!(1)),
    };
    acc.merge(Modifications {
        message: Some(MessageBody::new("second")),
        response: Some(MessageBody::new("resp")),
        output: None,
    });

    assert_eq!(acc.message, Some(MessageBody::new("second")));
    assert_eq!(acc.response, Some(MessageBody::new("resp")));
    assert_eq!(acc.output, Some(json!(1)));
}

#[test]
fn test_is_block() {
    assert!(HookResult::block("x").is_block());
    assert!(!HookResult::ok().is_block());
}
