use pretty_assertions::assert_eq;
use serde_json::json;

use super::*;

#[test]
fn test_kind_serializes_as_type() {
    let extraction = Extraction::new("pii_detected", json!({"field": "ssn"}));
    let value = serde_json::to_value(&extraction).expect("serialize");
    assert_eq!(
        value,
        json!({"type": "pii_detected", "data": {"field": "ssn"}})
    );
}

#[test]
fn test_scope_builders() {
    let extraction = Extraction::new("quiz_answer", json!({}))
        .with_session_id("s1")
        .with_user_id("u1")
        .with_run_id("r1");

    assert_eq!(extraction.session_id.as_deref(), Some("s1"));
    assert_eq!(extraction.user_id.as_deref(), Some("u1"));
    assert_eq!(extraction.run_id.as_deref(), Some("r1"));
    assert!(extraction.module.is_none());
}

#[test]
fn test_deserialize_accepts_missing_scopes() {
    let extraction: Extraction =
        serde_json::from_value(json!({"type": "note", "data": 42})).expect("parse");
    assert_eq!(extraction.kind, "note");
    assert_eq!(extraction.data, json!(42));
    assert!(extraction.session_id.is_none());
}
