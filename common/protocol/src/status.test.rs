use pretty_assertions::assert_eq;

use super::*;

#[test]
fn test_state_display() {
    assert_eq!(ModuleState::Starting.to_string(), "starting");
    assert_eq!(ModuleState::Ready.to_string(), "ready");
    assert_eq!(ModuleState::Disabled.to_string(), "disabled");
}

#[test]
fn test_state_serde_round_trip() {
    for state in [
        ModuleState::Starting,
        ModuleState::Ready,
        ModuleState::Error,
        ModuleState::Stopping,
        ModuleState::Disabled,
    ] {
        let value = serde_json::to_value(state).expect("serialize");
        assert_eq!(value, serde_json::json!(state.as_str()));
        let back: ModuleState = serde_json::from_value(value).expect("parse");
        assert_eq!(back, state);
    }
}

#[test]
fn test_status_snapshot_serializes() {
    let status = ModuleStatus {
        name: "safety".to_string(),
        version: "1.0.0".to_string(),
        state: ModuleState::Ready,
        restart_count: 2,
        last_error: Some("boom".to_string()),
        last_error_at: Some(Utc::now()),
        loaded_at: Utc::now(),
        dir: PathBuf::from("/modules/safety"),
    };
    let value = serde_json::to_value(&status).expect("serialize");
    assert_eq!(value["state"], "ready");
    assert_eq!(value["restart_count"], 2);
}
