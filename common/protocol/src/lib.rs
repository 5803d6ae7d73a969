//! Protocol types for the lattice module engine.
//!
//! This crate provides the foundational types shared by the host and the
//! isolated execution units:
//! - [`event`]: the closed set of lifecycle hooks modules can declare
//! - [`context`]: the serialized payload passed into a hook invocation
//! - [`result`]: the continue/block outcome produced by a module call
//! - [`extraction`]: structured facts emitted by modules for persistence
//! - [`message`]: the host↔unit wire message set
//! - [`query`]: read-only data-access query shapes routed through the proxy
//! - [`status`]: module lifecycle states and operator-facing snapshots
//!
//! Every type here is serde-serializable: nothing crosses the execution-unit
//! boundary by reference, only by value.

pub mod context;
pub mod event;
pub mod extraction;
pub mod message;
pub mod query;
pub mod result;
pub mod status;

pub use context::HookContext;
pub use context::MessageBody;
pub use context::RequestId;
pub use event::HookEvent;
pub use event::UnknownHookError;
pub use extraction::Extraction;
pub use message::HookCallOutcome;
pub use message::LogLevel;
pub use message::QueryOutcome;
pub use message::WorkerMessage;
pub use query::ExtractionQuery;
pub use query::QueryReply;
pub use result::HookResult;
pub use result::Modifications;
pub use status::ModuleState;
pub use status::ModuleStatus;
