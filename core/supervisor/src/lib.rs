//! Module supervisor and hook execution engine.
//!
//! Loads independently-authored modules from directories, runs each in an
//! isolated execution unit, and dispatches typed lifecycle hooks to the
//! modules that declare them — ordered by priority, bounded by per-call
//! timeouts, and contained so that one crashing module never takes down the
//! host.
//!
//! Components:
//! - [`manifest`]: per-module `module.json` loading and validation
//! - [`supervisor`]: the module table, lifecycle operations, and events
//! - dispatch (`Supervisor::execute_hook`): priority-ordered, blocking or
//!   fire-and-forget hook execution with context threading
//! - [`proxy`]: the sandboxed data-access proxy with user-scope checks
//! - [`health`]: the exponential-backoff restart policy
//! - [`reload`]: debounced hot reload driven by filesystem events

pub mod dispatch;
pub mod error;
pub mod health;
pub mod manifest;
pub mod proxy;
pub mod reload;
pub mod supervisor;

pub use error::Result;
pub use error::SupervisorError;
pub use health::RestartPolicy;
pub use manifest::MODULE_MANIFEST;
pub use manifest::ModuleManifest;
pub use proxy::DataProxy;
pub use proxy::ExtractionSink;
pub use proxy::ExtractionStore;
pub use proxy::ProxyBinding;
pub use proxy::StoreError;
pub use reload::HotReload;
pub use supervisor::ModuleEvent;
pub use supervisor::Supervisor;
pub use supervisor::SupervisorBuilder;
