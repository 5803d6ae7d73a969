use pretty_assertions::assert_eq;
use serde_json::json;

use super::*;

#[test]
fn test_user_extractions_carries_user_scope() {
    let query = ExtractionQuery::UserExtractions {
        user_id: "u1".to_string(),
        class_id: "c1".to_string(),
    };
    assert_eq!(query.scoped_user_id(), Some("u1"));
}

#[test]
fn test_session_query_has_no_user_scope() {
    let query = ExtractionQuery::SessionExtractions {
        session_id: "s1".to_string(),
    };
    assert_eq!(query.scoped_user_id(), None);
}

#[test]
fn test_by_type_scope_follows_filter() {
    let query = ExtractionQuery::ByType {
        kind: "pii_detected".to_string(),
        session_id: None,
        user_id: Some("u2".to_string()),
        limit: Some(10),
    };
    assert_eq!(query.scoped_user_id(), Some("u2"));
}

#[test]
fn test_query_wire_format() {
    let query = ExtractionQuery::ByType {
        kind: "note".to_string(),
        session_id: Some("s1".to_string()),
        user_id: None,
        limit: None,
    };
    let value = serde_json::to_value(&query).expect("serialize");
    assert_eq!(
        value,
        json!({"op": "by_type", "type": "note", "session_id": "s1"})
    );
}

#[test]
fn test_reply_round_trip() {
    let reply = QueryReply::Count { count: 3 };
    let value = serde_json::to_value(&reply).expect("serialize");
    let back: QueryReply = serde_json::from_value(value).expect("parse");
    assert_eq!(back, reply);
}
