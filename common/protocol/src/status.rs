//! Module lifecycle states and operator-facing snapshots.

use std::path::PathBuf;

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

/// Lifecycle state of a managed module.
///
/// `Starting → Ready` on successful initialization; `Error → Starting` after
/// a backoff delay while the restart budget lasts; `Disabled` is terminal
/// until a manual enable; `Stopping` precedes removal from the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleState {
    /// Execution unit spawned, waiting for its ready signal.
    Starting,
    /// Accepting hook calls.
    Ready,
    /// Crashed; a restart may be scheduled.
    Error,
    /// Graceful unload in progress.
    Stopping,
    /// Restart budget exhausted or manually disabled; excluded from dispatch
    /// until manually re-enabled.
    Disabled,
}

impl ModuleState {
    /// Returns the string representation of this state.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Ready => "ready",
            Self::Error => "error",
            Self::Stopping => "stopping",
            Self::Disabled => "disabled",
        }
    }
}

impl std::fmt::Display for ModuleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Read-only snapshot of one managed module, for operator tooling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleStatus {
    /// Unique module name.
    pub name: String,
    /// Declared version.
    pub version: String,
    /// Current lifecycle state.
    pub state: ModuleState,
    /// Crashes observed so far. Never reset by a successful start.
    pub restart_count: u32,
    /// Last recorded failure, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// When the last failure was recorded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error_at: Option<DateTime<Utc>>,
    /// When the current execution unit was spawned.
    pub loaded_at: DateTime<Utc>,
    /// Source directory the module was loaded from.
    pub dir: PathBuf,
}

#[cfg(test)]
#[path = "status.test.rs"]
mod tests;
