//! Request/response correlation across the execution-unit boundary.
//!
//! A hook call is fire-and-await: the host sends `execute_hook` with a fresh
//! per-call request id, the unit eventually answers with a `hook_result`
//! echoing that id, and the [`MessageBridge`] pairs the two. Every await is
//! bounded by the caller's timeout; a reply that arrives after its waiter
//! gave up is logged and dropped.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::sync::oneshot;
use tracing::debug;

use lattice_protocol::HookCallOutcome;
use lattice_protocol::HookContext;
use lattice_protocol::RequestId;
use lattice_protocol::WorkerMessage;

use crate::error::Result;
use crate::error::WorkerError;
use crate::host::WorkerSender;

/// Pairs in-flight `execute_hook` requests with their `hook_result` replies.
///
/// One bridge serves every unit: per-call request ids are unique, so entries
/// from concurrent calls to different modules never collide.
#[derive(Default)]
pub struct MessageBridge {
    pending: Mutex<HashMap<RequestId, oneshot::Sender<HookCallOutcome>>>,
}

impl MessageBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Send `ctx` to the unit behind `sender` and await its outcome.
    ///
    /// On timeout the pending entry is removed, so the late reply (if any)
    /// resolves as an orphan instead of leaking an entry. The module keeps
    /// running; only this call is abandoned.
    pub async fn call(
        &self,
        sender: &WorkerSender,
        request_id: RequestId,
        ctx: HookContext,
        timeout: Duration,
    ) -> Result<HookCallOutcome> {
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(request_id.clone(), tx);

        if let Err(e) = sender.send(WorkerMessage::ExecuteHook {
            request_id: request_id.clone(),
            ctx,
        }) {
            self.pending.lock().await.remove(&request_id);
            return Err(e);
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(outcome)) => Ok(outcome),
            Ok(Err(_)) => Err(WorkerError::UnitExited {
                module: sender.module().to_string(),
            }),
            Err(_) => {
                self.pending.lock().await.remove(&request_id);
                Err(WorkerError::CallTimeout {
                    module: sender.module().to_string(),
                    timeout,
                })
            }
        }
    }

    /// Deliver a `hook_result` to its waiter. Orphaned replies (waiter timed
    /// out or was aborted) are logged and dropped.
    pub async fn resolve(&self, request_id: &RequestId, outcome: HookCallOutcome) {
        let waiter = self.pending.lock().await.remove(request_id);
        match waiter {
            Some(tx) => {
                // The waiter may have been dropped between removal and send;
                // nothing to do in that case either.
                let _ = tx.send(outcome);
            }
            None => {
                debug!(request_id = %request_id, "dropping orphaned hook_result");
            }
        }
    }

    /// Abandon one in-flight call, failing its waiter with `UnitExited`.
    /// Used when a unit's message stream ends with calls still pending.
    pub async fn abort(&self, request_id: &RequestId) {
        self.pending.lock().await.remove(request_id);
    }

    /// Number of calls currently awaiting a reply.
    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }
}

impl std::fmt::Debug for MessageBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageBridge").finish_non_exhaustive()
    }
}

#[cfg(test)]
#[path = "bridge.test.rs"]
mod tests;
