//! Isolated execution units for lattice modules.
//!
//! Each loaded module runs on its own dedicated OS thread with no shared
//! mutable state; all traffic between the host and the unit is the typed
//! [`lattice_protocol::WorkerMessage`] set, moved by value over channels.
//!
//! - [`module`]: the [`Module`] trait user code implements, the
//!   [`ModuleApi`] it talks back through, and the factory registry
//! - [`host`]: spawning a unit and the host-side handle to it
//! - [`bridge`]: request/response correlation with per-call timeouts
//! - [`error`]: worker error types

pub mod bridge;
pub mod error;
pub mod host;
pub mod module;

pub use bridge::MessageBridge;
pub use error::WorkerError;
pub use host::WorkerHandle;
pub use host::WorkerSender;
pub use host::spawn_worker;
pub use module::Module;
pub use module::ModuleApi;
pub use module::ModuleFactory;
pub use module::ModuleRegistry;
