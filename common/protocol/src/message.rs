//! Host↔unit wire messages.
//!
//! Every call crossing the isolation boundary is one of these messages. The
//! set is closed: receivers log and ignore anything they cannot interpret
//! rather than crash.
//!
//! Directions:
//! - host→unit: `execute_hook`, `db_response`, `config_update`, `unload`
//! - unit→host: `ready`, `hook_result`, `extraction`, `log`, `db_query`,
//!   `unloaded`, `error`

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::context::HookContext;
use crate::context::RequestId;
use crate::extraction::Extraction;
use crate::query::ExtractionQuery;
use crate::query::QueryReply;
use crate::result::HookResult;

/// A message exchanged between the host and one execution unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerMessage {
    /// host→unit: run the module's handler for this context.
    ExecuteHook {
        /// Correlates the eventual `hook_result`.
        request_id: RequestId,
        /// The invocation payload, copied by value.
        ctx: HookContext,
    },

    /// unit→host: the unit finished initializing and can accept hook calls.
    Ready,

    /// unit→host: reply to `execute_hook`.
    HookResult {
        /// Echoes the `execute_hook` request id.
        request_id: RequestId,
        /// The call outcome.
        outcome: HookCallOutcome,
    },

    /// unit→host, one-way: an extraction for the persistence collaborator.
    Extraction {
        /// The emitted extraction.
        extraction: Extraction,
    },

    /// unit→host, one-way: a log line attributed to the module.
    Log {
        /// Severity.
        level: LogLevel,
        /// The message text.
        message: String,
    },

    /// unit→host: a data-access query to route through the proxy.
    DbQuery {
        /// Correlates the eventual `db_response`.
        request_id: RequestId,
        /// The hook-call request this query was issued under. The host binds
        /// authorization context by this id; an unknown id is denied.
        call_id: RequestId,
        /// The query itself.
        query: ExtractionQuery,
    },

    /// host→unit: reply to `db_query`.
    DbResponse {
        /// Echoes the `db_query` request id.
        request_id: RequestId,
        /// Reply, denial, or store failure.
        outcome: QueryOutcome,
    },

    /// host→unit, one-way: replace the module's runtime configuration.
    ConfigUpdate {
        /// The new configuration value.
        config: Value,
    },

    /// host→unit: begin graceful shutdown.
    Unload,

    /// unit→host: graceful shutdown acknowledgment.
    Unloaded,

    /// unit→host, one-way: the unit hit an uncaught failure and is exiting.
    Error {
        /// Description of the failure.
        message: String,
    },
}

/// Outcome of one `execute_hook` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum HookCallOutcome {
    /// The handler ran to completion.
    Ok {
        /// The result it produced.
        result: HookResult,
    },
    /// The handler returned an error or panicked; the unit survives and the
    /// call is reported as failed.
    Failed {
        /// Description of the failure.
        message: String,
    },
}

/// Outcome of one proxied data-access query.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum QueryOutcome {
    /// The store answered.
    Ok {
        /// The reply rows or count.
        reply: QueryReply,
    },
    /// The proxy rejected the query before it reached the store.
    Denied {
        /// Why the query was rejected.
        reason: String,
    },
    /// The store failed.
    Failed {
        /// Description of the failure.
        message: String,
    },
}

/// Severity of a module log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

#[cfg(test)]
#[path = "message.test.rs"]
mod tests;
