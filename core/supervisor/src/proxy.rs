//! Sandboxed data-access proxy.
//!
//! Modules read extraction data only through `db_query` messages that the
//! supervisor routes here. Each query executes under the [`ProxyBinding`]
//! captured when the hook call was dispatched, never under scopes the module
//! claims for itself: a user-scoped query targeting a different user than
//! the one the module was invoked for is denied before it reaches the store.

use std::sync::Arc;

use snafu::Snafu;
use tracing::warn;

use lattice_protocol::Extraction;
use lattice_protocol::ExtractionQuery;
use lattice_protocol::QueryOutcome;
use lattice_protocol::QueryReply;

/// Failure reported by the external extraction store.
#[derive(Debug, Snafu)]
#[snafu(display("extraction store error: {message}"))]
pub struct StoreError {
    pub message: String,
}

impl StoreError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Read side of the external persistence collaborator.
pub trait ExtractionStore: Send + Sync {
    fn query(&self, query: &ExtractionQuery) -> Result<QueryReply, StoreError>;
}

/// Write side of the external persistence collaborator: receives the stream
/// of extractions emitted by modules. The engine itself persists nothing.
pub trait ExtractionSink: Send + Sync {
    fn record(&self, extraction: Extraction);
}

/// A store that answers nothing; default until a real one is injected.
pub struct NullStore;

impl ExtractionStore for NullStore {
    fn query(&self, _query: &ExtractionQuery) -> Result<QueryReply, StoreError> {
        Err(StoreError::new("no extraction store configured"))
    }
}

/// A sink that drops everything; default until a real one is injected.
pub struct NullSink;

impl ExtractionSink for NullSink {
    fn record(&self, _extraction: Extraction) {}
}

/// The authorization context one hook call runs under: the module's name
/// and the session/user it was invoked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyBinding {
    pub module: String,
    pub session_id: Option<String>,
    pub user_id: Option<String>,
}

/// Mediates module data-access queries against the injected store.
pub struct DataProxy {
    store: Arc<dyn ExtractionStore>,
}

impl DataProxy {
    pub fn new(store: Arc<dyn ExtractionStore>) -> Self {
        Self { store }
    }

    /// Execute one query under a binding. Authorization failures and store
    /// failures both come back as a [`QueryOutcome`], never a crash.
    pub fn execute(&self, binding: &ProxyBinding, query: &ExtractionQuery) -> QueryOutcome {
        if let Some(target) = query.scoped_user_id() {
            let authorized = binding.user_id.as_deref() == Some(target);
            if !authorized {
                warn!(
                    module = %binding.module,
                    bound_user = ?binding.user_id,
                    target_user = %target,
                    "denying cross-user data query"
                );
                return QueryOutcome::Denied {
                    reason: format!(
                        "module '{}' may only read data for user {:?}, not '{target}'",
                        binding.module, binding.user_id
                    ),
                };
            }
        }
        match self.store.query(query) {
            Ok(reply) => QueryOutcome::Ok { reply },
            Err(e) => QueryOutcome::Failed {
                message: e.to_string(),
            },
        }
    }
}

#[cfg(test)]
#[path = "proxy.test.rs"]
mod tests;
