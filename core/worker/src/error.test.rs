use std::time::Duration;

use pretty_assertions::assert_eq;

use super::*;

#[test]
fn test_display_carries_module_name() {
    let err = WorkerError::UnitGone {
        module: "safety".to_string(),
    };
    assert_eq!(err.to_string(), "execution unit for module 'safety' is gone");
}

#[test]
fn test_timeout_display() {
    let err = WorkerError::CallTimeout {
        module: "logger".to_string(),
        timeout: Duration::from_secs(3),
    };
    assert!(err.to_string().contains("logger"));
    assert!(err.to_string().contains("3s"));
}

#[test]
fn test_handler_constructor() {
    let err = WorkerError::handler("division by zero");
    assert_eq!(err.to_string(), "module handler failed: division by zero");
}
