use pretty_assertions::assert_eq;
use serde_json::json;

use super::*;
use crate::event::HookEvent;

#[test]
fn test_execute_hook_wire_format() {
    let ctx = HookContext::new(HookEvent::ChatMessage).with_session_id("s1");
    let msg = WorkerMessage::ExecuteHook {
        request_id: RequestId::from("req-1"),
        ctx,
    };
    let value = serde_json::to_value(&msg).expect("serialize");
    assert_eq!(value["type"], "execute_hook");
    assert_eq!(value["request_id"], "req-1");
    assert_eq!(value["ctx"]["hook"], "chat:message");
}

#[test]
fn test_hook_result_round_trip() {
    let msg = WorkerMessage::HookResult {
        request_id: RequestId::from("req-2"),
        outcome: HookCallOutcome::Ok {
            result: HookResult::block("nope"),
        },
    };
    let value = serde_json::to_value(&msg).expect("serialize");
    assert_eq!(value["type"], "hook_result");
    assert_eq!(value["outcome"]["status"], "ok");
    assert_eq!(value["outcome"]["result"]["action"], "block");

    let back: WorkerMessage = serde_json::from_value(value).expect("parse");
    match back {
        WorkerMessage::HookResult { request_id, .. } => {
            assert_eq!(request_id.as_str(), "req-2");
        }
        other => panic!("unexpected message: {other:?}"),
    }
}

#[test]
fn test_unit_messages_without_payload() {
    assert_eq!(
        serde_json::to_value(WorkerMessage::Unload).expect("serialize"),
        json!({"type": "unload"})
    );
    assert_eq!(
        serde_json::to_value(WorkerMessage::Unloaded).expect("serialize"),
        json!({"type": "unloaded"})
    );
    assert_eq!(
        serde_json::to_value(WorkerMessage::Ready).expect("serialize"),
        json!({"type": "ready"})
    );
}

#[test]
fn test_unknown_message_type_fails_to_parse() {
    // Receivers treat a parse failure as an unrecognized message: logged and
    // ignored, never a crash.
    let result: Result<WorkerMessage, _> =
        serde_json::from_value(json!({"type": "teleport", "to": "mars"}));
    assert!(result.is_err());
}

#[test]
fn test_query_outcome_denied() {
    let outcome = QueryOutcome::Denied {
        reason: "user scope mismatch".to_string(),
    };
    let value = serde_json::to_value(&outcome).expect("serialize");
    assert_eq!(value["status"], "denied");
}
