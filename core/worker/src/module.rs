//! The module interface and factory registry.
//!
//! A module is user code implementing [`Module`]; the supervisor instantiates
//! it inside an isolated execution unit via a factory registered under the
//! manifest's `entry` name. Module code never touches host state directly:
//! everything it needs goes through the [`ModuleApi`] handed to each call.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::info;

use lattice_protocol::Extraction;
use lattice_protocol::ExtractionQuery;
use lattice_protocol::HookContext;
use lattice_protocol::HookResult;
use lattice_protocol::LogLevel;
use lattice_protocol::QueryReply;

use crate::error::Result;

/// An installable module: the explicit interface every module implements,
/// invoked only through this trait.
pub trait Module: Send {
    /// Called once inside the unit before any hook call, with the module's
    /// configuration. Returning an error fails the load.
    fn on_load(&mut self, _config: &Value) -> Result<()> {
        Ok(())
    }

    /// Handle one hook invocation. The context is a private copy; edits must
    /// be returned as modifications, never applied in place.
    fn handle(&mut self, ctx: &HookContext, api: &mut dyn ModuleApi) -> Result<HookResult>;

    /// Called when the host pushes a configuration replacement.
    fn on_config_update(&mut self, _config: &Value) {}

    /// Called once before the unit shuts down gracefully.
    fn on_unload(&mut self) {}
}

/// Capabilities the host grants module code during a hook call.
pub trait ModuleApi {
    /// Emit an extraction for external persistence. Also included in the
    /// call's result.
    fn emit(&mut self, extraction: Extraction);

    /// Emit a log line attributed to this module.
    fn log(&mut self, level: LogLevel, message: &str);

    /// Run a read-only data query through the sandboxed proxy. Blocks the
    /// unit (not the host) until the response arrives or times out.
    fn query(&mut self, query: ExtractionQuery) -> Result<QueryReply>;
}

/// Creates a fresh module instance inside the execution unit.
pub type ModuleFactory = Arc<dyn Fn() -> Box<dyn Module> + Send + Sync>;

/// Registry mapping manifest `entry` names to module factories.
///
/// An explicit instance owned by the supervisor — not a process-wide
/// global — so tests and embedders can build isolated registries.
#[derive(Default)]
pub struct ModuleRegistry {
    factories: HashMap<String, ModuleFactory>,
}

impl ModuleRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a factory under an entry name, replacing any previous one.
    pub fn register<F>(&mut self, entry: impl Into<String>, factory: F)
    where
        F: Fn() -> Box<dyn Module> + Send + Sync + 'static,
    {
        let entry = entry.into();
        info!(entry = %entry, "Registered module factory");
        self.factories.insert(entry, Arc::new(factory));
    }

    /// Returns the factory registered under `entry`, if any.
    pub fn factory(&self, entry: &str) -> Option<ModuleFactory> {
        self.factories.get(entry).cloned()
    }

    /// Returns `true` if a factory is registered under `entry`.
    pub fn contains(&self, entry: &str) -> bool {
        self.factories.contains_key(entry)
    }

    /// All registered entry names.
    pub fn entries(&self) -> Vec<String> {
        self.factories.keys().cloned().collect()
    }

    /// Number of registered factories.
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    /// Returns `true` if no factories are registered.
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl std::fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleRegistry")
            .field("entries", &self.entries())
            .finish()
    }
}

#[cfg(test)]
#[path = "module.test.rs"]
mod tests;
