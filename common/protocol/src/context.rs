//! Hook invocation context.
//!
//! A [`HookContext`] is assembled by the orchestrator for one hook invocation
//! and passed by value across the execution-unit boundary. Modules never hold
//! a live reference to host state.

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::event::HookEvent;
use crate::result::Modifications;

/// A unique identifier correlating a request to its response across the
/// execution-unit boundary.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(pub String);

impl RequestId {
    /// Create a new request ID with a random UUID.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Get the inner string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A chat message or AI response body carried in a context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageBody {
    /// The text content.
    pub content: String,
}

impl MessageBody {
    /// Creates a body from any string-like content.
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }
}

/// Context passed to modules for one hook invocation.
///
/// Constructed by the orchestrator; the dispatch engine threads it through
/// the blocking chain, applying each module's modifications before the next
/// module runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HookContext {
    /// Identifies this hook invocation (shared by every module call it fans
    /// out to).
    pub request_id: RequestId,

    /// The hook being dispatched.
    pub hook: HookEvent,

    /// When the orchestrator assembled this context.
    pub timestamp: DateTime<Utc>,

    /// The session this invocation belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    /// The user the module is being invoked for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    /// The class the session belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_id: Option<String>,

    /// An orchestrator-defined run grouping multiple invocations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,

    /// The tool name, for tool hooks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,

    /// The tool input JSON, for tool hooks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_input: Option<Value>,

    /// The in-flight user message, for chat hooks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<MessageBody>,

    /// The in-flight AI response, for post-AI hooks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<MessageBody>,
}

impl HookContext {
    /// Creates a new context for the given hook with a fresh request id.
    pub fn new(hook: HookEvent) -> Self {
        Self {
            request_id: RequestId::new(),
            hook,
            timestamp: Utc::now(),
            session_id: None,
            user_id: None,
            class_id: None,
            run_id: None,
            tool_name: None,
            tool_input: None,
            message: None,
            response: None,
        }
    }

    /// Sets the session ID and returns `self` for chaining.
    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Sets the user ID and returns `self` for chaining.
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Sets the class ID and returns `self` for chaining.
    pub fn with_class_id(mut self, class_id: impl Into<String>) -> Self {
        self.class_id = Some(class_id.into());
        self
    }

    /// Sets the run ID and returns `self` for chaining.
    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    /// Sets the tool name and input, returning `self` for chaining.
    pub fn with_tool(mut self, name: impl Into<String>, input: Value) -> Self {
        self.tool_name = Some(name.into());
        self.tool_input = Some(input);
        self
    }

    /// Sets the user message and returns `self` for chaining.
    pub fn with_message(mut self, content: impl Into<String>) -> Self {
        self.message = Some(MessageBody::new(content));
        self
    }

    /// Sets the AI response and returns `self` for chaining.
    pub fn with_response(mut self, content: impl Into<String>) -> Self {
        self.response = Some(MessageBody::new(content));
        self
    }

    /// Applies a module's modifications to this context so later modules in
    /// the blocking chain observe them.
    pub fn apply(&mut self, modifications: &Modifications) {
        if let Some(message) = &modifications.message {
            self.message = Some(message.clone());
        }
        if let Some(response) = &modifications.response {
            self.response = Some(response.clone());
        }
    }
}

#[cfg(test)]
#[path = "context.test.rs"]
mod tests;
