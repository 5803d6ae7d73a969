//! Module manifest loading and validation.
//!
//! Each module directory carries a `module.json` declaring the module's
//! identity, the hooks it handles, and its per-hook ordering, blocking, and
//! timeout overrides. Loading is a pure parse+validate step; a module whose
//! manifest fails validation never reaches the `starting` state.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use snafu::ResultExt;

use lattice_protocol::HookEvent;

use crate::error::Result;
use crate::error::supervisor_error;

/// Manifest file name inside a module directory.
pub const MODULE_MANIFEST: &str = "module.json";

/// Priority applied when the manifest declares none for a hook. Lower runs
/// earlier.
pub const DEFAULT_PRIORITY: i32 = 50;

/// Per-call timeout applied when the manifest declares none for a hook.
pub const DEFAULT_TIMEOUT_MS: u64 = 5_000;

/// Upper bound on any configured hook timeout.
pub const MAX_TIMEOUT_MS: u64 = 600_000;

/// Immutable per-module declaration, loaded from [`MODULE_MANIFEST`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleManifest {
    /// Unique key across all loaded modules.
    pub name: String,

    /// Semver version string.
    pub version: String,

    /// Name of the registered module factory to instantiate. Defaults to
    /// `name` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry: Option<String>,

    /// The hooks this module handles.
    pub hooks: Vec<HookEvent>,

    /// Per-hook priority overrides (default 50, lower runs earlier).
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub priorities: HashMap<HookEvent, i32>,

    /// Per-hook blocking overrides. Absent hooks use the event's own
    /// default: blocking for pre/post-AI hooks, non-blocking otherwise.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub blocking: HashMap<HookEvent, bool>,

    /// Per-hook timeout overrides, in milliseconds.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub timeouts: HashMap<HookEvent, u64>,

    /// Default configuration values handed to the module on load.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub defaults: Map<String, Value>,

    /// Resource limits for the module's execution unit.
    #[serde(default, skip_serializing_if = "ResourceLimits::is_empty")]
    pub limits: ResourceLimits,

    /// Names of other modules this module depends on.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
}

/// Resource limits declared by a module.
///
/// `max_memory_mb` is validated and carried but not enforced for
/// thread-backed units; `max_execution_ms` caps every per-hook timeout.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLimits {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_memory_mb: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_execution_ms: Option<u64>,
}

impl ResourceLimits {
    pub fn is_empty(&self) -> bool {
        self.max_memory_mb.is_none() && self.max_execution_ms.is_none()
    }
}

impl ModuleManifest {
    /// Load and validate the manifest from a module directory.
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(MODULE_MANIFEST);
        if !path.is_file() {
            return supervisor_error::ManifestMissingSnafu {
                dir: dir.to_path_buf(),
            }
            .fail();
        }
        let raw = std::fs::read_to_string(&path).context(supervisor_error::ManifestReadSnafu {
            dir: dir.to_path_buf(),
        })?;
        let manifest: Self =
            serde_json::from_str(&raw).context(supervisor_error::ManifestParseSnafu {
                dir: dir.to_path_buf(),
            })?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Validate field contents beyond what deserialization enforces.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return self.invalid("name must not be empty");
        }
        if !is_valid_semver(&self.version) {
            return self.invalid(format!("version '{}' is not valid semver", self.version));
        }
        if self.hooks.is_empty() {
            return self.invalid("hooks must declare at least one hook");
        }
        for (field, keys) in [
            ("priorities", self.priorities.keys().copied().collect::<Vec<_>>()),
            ("blocking", self.blocking.keys().copied().collect()),
            ("timeouts", self.timeouts.keys().copied().collect()),
        ] {
            for hook in keys {
                if !self.hooks.contains(&hook) {
                    return self.invalid(format!(
                        "{field} references hook '{hook}' not declared in hooks"
                    ));
                }
            }
        }
        if let Some(ms) = self.limits.max_execution_ms {
            if ms == 0 {
                return self.invalid("limits.max_execution_ms must be positive");
            }
        }
        Ok(())
    }

    fn invalid<T>(&self, reason: impl Into<String>) -> Result<T> {
        supervisor_error::ManifestInvalidSnafu {
            name: self.name.clone(),
            reason: reason.into(),
        }
        .fail()
    }

    /// The factory entry point to instantiate; defaults to the module name.
    pub fn entry(&self) -> &str {
        self.entry.as_deref().unwrap_or(&self.name)
    }

    /// Returns `true` if this module declares the given hook.
    pub fn handles(&self, hook: HookEvent) -> bool {
        self.hooks.contains(&hook)
    }

    /// Dispatch priority for a hook (default 50, lower runs earlier).
    pub fn priority_for(&self, hook: HookEvent) -> i32 {
        self.priorities.get(&hook).copied().unwrap_or(DEFAULT_PRIORITY)
    }

    /// Whether the hook runs in the blocking chain for this module.
    pub fn blocking_for(&self, hook: HookEvent) -> bool {
        self.blocking
            .get(&hook)
            .copied()
            .unwrap_or_else(|| hook.default_blocking())
    }

    /// Per-call timeout for a hook, clamped to [`MAX_TIMEOUT_MS`] and capped
    /// by `limits.max_execution_ms` when declared.
    pub fn timeout_for(&self, hook: HookEvent) -> Duration {
        let mut ms = self
            .timeouts
            .get(&hook)
            .copied()
            .unwrap_or(DEFAULT_TIMEOUT_MS)
            .min(MAX_TIMEOUT_MS);
        if let Some(cap) = self.limits.max_execution_ms {
            ms = ms.min(cap);
        }
        Duration::from_millis(ms)
    }

    /// Default configuration as a JSON object value.
    pub fn default_config(&self) -> Value {
        Value::Object(self.defaults.clone())
    }
}

/// Minimal semver shape check: three dot-separated numeric components.
fn is_valid_semver(version: &str) -> bool {
    let parts: Vec<&str> = version.split('.').collect();
    parts.len() == 3 && parts.iter().all(|p| !p.is_empty() && p.parse::<u64>().is_ok())
}

#[cfg(test)]
#[path = "manifest.test.rs"]
mod tests;
