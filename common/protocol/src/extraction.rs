//! Module-emitted extractions.
//!
//! An extraction is a structured fact a module records for external
//! persistence or analytics. It is write-only from the module's perspective:
//! the engine forwards it to a persistence collaborator and never interprets
//! the payload.

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

/// A structured fact emitted by a module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Extraction {
    /// The extraction type, e.g. `"pii_detected"` or `"vocabulary_word"`.
    #[serde(rename = "type")]
    pub kind: String,

    /// Arbitrary JSON payload.
    pub data: Value,

    /// Session scope, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    /// Run scope, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,

    /// User scope, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    /// Name of the emitting module. Stamped by the host, never trusted from
    /// module code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
}

impl Extraction {
    /// Creates an unscoped extraction of the given kind.
    pub fn new(kind: impl Into<String>, data: Value) -> Self {
        Self {
            kind: kind.into(),
            data,
            session_id: None,
            run_id: None,
            user_id: None,
            module: None,
        }
    }

    /// Sets the session scope and returns `self` for chaining.
    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Sets the run scope and returns `self` for chaining.
    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    /// Sets the user scope and returns `self` for chaining.
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }
}

#[cfg(test)]
#[path = "extraction.test.rs"]
mod tests;
