//! Hook event types.
//!
//! Defines the lifecycle points at which modules can be invoked. The set is
//! closed: manifests naming an unknown hook fail validation instead of being
//! silently accepted.

use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;

/// A named extension point at which registered modules may observe or modify
/// in-flight data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HookEvent {
    /// A tutoring session has started.
    #[serde(rename = "session:start")]
    SessionStart,
    /// A tutoring session has ended.
    #[serde(rename = "session:end")]
    SessionEnd,
    /// A user chat message was received.
    #[serde(rename = "chat:message")]
    ChatMessage,
    /// About to send the conversation to the AI. Blocking by default.
    #[serde(rename = "chat:before_ai")]
    ChatBeforeAi,
    /// An AI response arrived, before it is shown to the user. Blocking by default.
    #[serde(rename = "chat:after_ai")]
    ChatAfterAi,
    /// Before a tool call executes.
    #[serde(rename = "tool:before")]
    ToolBefore,
    /// After a tool call completes.
    #[serde(rename = "tool:after")]
    ToolAfter,
}

impl HookEvent {
    /// All hook events, in a stable order.
    pub const ALL: [HookEvent; 7] = [
        Self::SessionStart,
        Self::SessionEnd,
        Self::ChatMessage,
        Self::ChatBeforeAi,
        Self::ChatAfterAi,
        Self::ToolBefore,
        Self::ToolAfter,
    ];

    /// Returns the string representation of this event.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SessionStart => "session:start",
            Self::SessionEnd => "session:end",
            Self::ChatMessage => "chat:message",
            Self::ChatBeforeAi => "chat:before_ai",
            Self::ChatAfterAi => "chat:after_ai",
            Self::ToolBefore => "tool:before",
            Self::ToolAfter => "tool:after",
        }
    }

    /// Whether modules handling this hook block the host by default.
    ///
    /// Pre/post-AI hooks sit on the critical path and default to blocking;
    /// everything else defaults to fire-and-forget.
    pub fn default_blocking(&self) -> bool {
        matches!(self, Self::ChatBeforeAi | Self::ChatAfterAi)
    }
}

impl std::fmt::Display for HookEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error returned when parsing an unrecognized hook name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownHookError {
    /// The name that failed to parse.
    pub name: String,
}

impl std::fmt::Display for UnknownHookError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown hook name: {}", self.name)
    }
}

impl std::error::Error for UnknownHookError {}

impl FromStr for HookEvent {
    type Err = UnknownHookError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        HookEvent::ALL
            .iter()
            .find(|e| e.as_str() == s)
            .copied()
            .ok_or_else(|| UnknownHookError {
                name: s.to_string(),
            })
    }
}

#[cfg(test)]
#[path = "event.test.rs"]
mod tests;
