//! The host side of an execution unit.
//!
//! [`spawn_worker`] starts one module on a dedicated OS thread and returns a
//! [`WorkerHandle`] plus the unit→host message stream. The unit owns its
//! module instance outright; the only way in or out is the typed
//! [`WorkerMessage`] channel pair, so a crash inside module code never
//! corrupts host state.
//!
//! Forced termination is channel closure: dropping the handle closes the
//! control channel, the unit's receive loop ends, and any late messages from
//! a wedged thread land in a closed channel and are discarded. The thread is
//! never joined from the host — a stuck unit must not block the supervisor.

use std::panic::AssertUnwindSafe;
use std::panic::catch_unwind;
use std::sync::Arc;
use std::sync::mpsc as std_mpsc;
use std::time::Duration;
use std::time::Instant;

use serde_json::Value;
use tokio::sync::mpsc;
use tracing::debug;
use tracing::warn;

use lattice_protocol::Extraction;
use lattice_protocol::ExtractionQuery;
use lattice_protocol::HookCallOutcome;
use lattice_protocol::HookContext;
use lattice_protocol::HookResult;
use lattice_protocol::LogLevel;
use lattice_protocol::QueryOutcome;
use lattice_protocol::QueryReply;
use lattice_protocol::RequestId;
use lattice_protocol::WorkerMessage;

use crate::error::Result;
use crate::error::WorkerError;
use crate::error::worker_error;
use crate::module::ModuleApi;
use crate::module::ModuleFactory;

/// How long a unit-side data query waits for its `db_response`.
const DB_QUERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Cloneable sending half of a unit's host-side endpoints.
#[derive(Clone)]
pub struct WorkerSender {
    module: Arc<str>,
    control: mpsc::UnboundedSender<WorkerMessage>,
    db: std_mpsc::Sender<WorkerMessage>,
}

impl WorkerSender {
    /// The module this sender belongs to.
    pub fn module(&self) -> &str {
        &self.module
    }

    /// Send a control message (`execute_hook`, `config_update`, `unload`).
    pub fn send(&self, msg: WorkerMessage) -> Result<()> {
        self.control
            .send(msg)
            .map_err(|_| WorkerError::UnitGone {
                module: self.module.to_string(),
            })
    }

    /// Send a `db_response` on the unit's dedicated reply channel.
    pub fn send_db_response(&self, request_id: RequestId, outcome: QueryOutcome) -> Result<()> {
        self.db
            .send(WorkerMessage::DbResponse {
                request_id,
                outcome,
            })
            .map_err(|_| WorkerError::UnitGone {
                module: self.module.to_string(),
            })
    }

    /// Returns `true` once the unit's receive loop has ended.
    pub fn is_closed(&self) -> bool {
        self.control.is_closed()
    }
}

/// Owned handle to one execution unit.
pub struct WorkerHandle {
    sender: WorkerSender,
    // Kept only so the thread has an owner; intentionally never joined.
    _join: std::thread::JoinHandle<()>,
}

impl WorkerHandle {
    /// The module this unit runs.
    pub fn module(&self) -> &str {
        self.sender.module()
    }

    /// Borrow the sending half.
    pub fn sender(&self) -> &WorkerSender {
        &self.sender
    }

    /// Clone the sending half for use by dispatch.
    pub fn clone_sender(&self) -> WorkerSender {
        self.sender.clone()
    }

    /// Returns `true` while the unit's receive loop is still running.
    pub fn is_alive(&self) -> bool {
        !self.sender.is_closed()
    }
}

impl std::fmt::Debug for WorkerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerHandle")
            .field("module", &self.module())
            .field("alive", &self.is_alive())
            .finish()
    }
}

/// Spawn an execution unit for `module_name`.
///
/// The factory runs on the unit thread, so a panicking constructor or
/// `on_load` is contained and reported as an `error` message instead of a
/// `ready` signal. Returns the handle and the unit→host message stream.
pub fn spawn_worker(
    module_name: &str,
    factory: ModuleFactory,
    config: Value,
) -> Result<(WorkerHandle, mpsc::UnboundedReceiver<WorkerMessage>)> {
    let (control_tx, control_rx) = mpsc::unbounded_channel();
    let (db_tx, db_rx) = std_mpsc::channel();
    let (out_tx, out_rx) = mpsc::unbounded_channel();

    let name: Arc<str> = Arc::from(module_name);
    let unit_name = Arc::clone(&name);
    let join = std::thread::Builder::new()
        .name(format!("module-{module_name}"))
        .spawn(move || unit_main(unit_name, factory, config, control_rx, db_rx, out_tx))
        .map_err(|e| {
            worker_error::SpawnFailedSnafu {
                module: module_name.to_string(),
                message: e.to_string(),
            }
            .build()
        })?;

    let handle = WorkerHandle {
        sender: WorkerSender {
            module: name,
            control: control_tx,
            db: db_tx,
        },
        _join: join,
    };
    Ok((handle, out_rx))
}

// ---------------------------------------------------------------------------
// Unit side
// ---------------------------------------------------------------------------

fn unit_main(
    name: Arc<str>,
    factory: ModuleFactory,
    config: Value,
    mut control_rx: mpsc::UnboundedReceiver<WorkerMessage>,
    db_rx: std_mpsc::Receiver<WorkerMessage>,
    out: mpsc::UnboundedSender<WorkerMessage>,
) {
    // Construction and on_load run before the ready signal; a failure here
    // means the module never reaches Ready.
    let mut module = match catch_unwind(AssertUnwindSafe(|| factory())) {
        Ok(module) => module,
        Err(payload) => {
            let _ = out.send(WorkerMessage::Error {
                message: format!("module factory panicked: {}", panic_message(payload)),
            });
            return;
        }
    };

    let load = catch_unwind(AssertUnwindSafe(|| module.on_load(&config)));
    match load {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            let _ = out.send(WorkerMessage::Error {
                message: format!("on_load failed: {e}"),
            });
            return;
        }
        Err(payload) => {
            let _ = out.send(WorkerMessage::Error {
                message: format!("on_load panicked: {}", panic_message(payload)),
            });
            return;
        }
    }

    if out.send(WorkerMessage::Ready).is_err() {
        return;
    }

    while let Some(msg) = control_rx.blocking_recv() {
        match msg {
            WorkerMessage::ExecuteHook { request_id, ctx } => {
                let mut api = UnitApi::new(&name, &out, &db_rx, request_id.clone(), &ctx);
                let call = catch_unwind(AssertUnwindSafe(|| module.handle(&ctx, &mut api)));
                let emitted = api.emitted;

                // One-way persistence stream, independent of the result.
                for extraction in &emitted {
                    let _ = out.send(WorkerMessage::Extraction {
                        extraction: extraction.clone(),
                    });
                }

                let outcome = match call {
                    Ok(Ok(result)) => HookCallOutcome::Ok {
                        result: fold_emitted(result, emitted, &name),
                    },
                    // A handler error or panic fails this call only; the
                    // unit stays up and keeps serving later calls.
                    Ok(Err(e)) => HookCallOutcome::Failed {
                        message: e.to_string(),
                    },
                    Err(payload) => HookCallOutcome::Failed {
                        message: format!("handler panicked: {}", panic_message(payload)),
                    },
                };
                if out
                    .send(WorkerMessage::HookResult {
                        request_id,
                        outcome,
                    })
                    .is_err()
                {
                    return;
                }
            }
            WorkerMessage::ConfigUpdate { config } => {
                if catch_unwind(AssertUnwindSafe(|| module.on_config_update(&config))).is_err() {
                    let _ = out.send(WorkerMessage::Error {
                        message: "on_config_update panicked".to_string(),
                    });
                    return;
                }
            }
            WorkerMessage::Unload => {
                let _ = catch_unwind(AssertUnwindSafe(|| module.on_unload()));
                let _ = out.send(WorkerMessage::Unloaded);
                return;
            }
            other => {
                // Closed message set: anything else is logged and ignored.
                let _ = out.send(WorkerMessage::Log {
                    level: LogLevel::Warn,
                    message: format!("ignoring unexpected host message: {other:?}"),
                });
            }
        }
    }
    // Control channel closed without an unload: forced termination.
    debug!(module = %name, "execution unit control channel closed");
}

/// Stamp the module name onto result-carried extractions and prepend the
/// ones emitted through the API during the call.
fn fold_emitted(result: HookResult, emitted: Vec<Extraction>, module: &str) -> HookResult {
    let stamp = |mut list: Vec<Extraction>| -> Vec<Extraction> {
        for e in &mut list {
            e.module = Some(module.to_string());
        }
        list
    };
    match result {
        HookResult::Continue {
            modifications,
            extractions,
        } => {
            let mut all = emitted;
            all.extend(stamp(extractions));
            HookResult::Continue {
                modifications,
                extractions: all,
            }
        }
        HookResult::Block {
            reason,
            response,
            extractions,
        } => {
            let mut all = emitted;
            all.extend(stamp(extractions));
            HookResult::Block {
                reason,
                response,
                extractions: all,
            }
        }
    }
}

/// Unit-side implementation of [`ModuleApi`] for one hook call.
struct UnitApi<'a> {
    module: &'a str,
    out: &'a mpsc::UnboundedSender<WorkerMessage>,
    db_rx: &'a std_mpsc::Receiver<WorkerMessage>,
    call_id: RequestId,
    ctx: &'a HookContext,
    emitted: Vec<Extraction>,
}

impl<'a> UnitApi<'a> {
    fn new(
        module: &'a str,
        out: &'a mpsc::UnboundedSender<WorkerMessage>,
        db_rx: &'a std_mpsc::Receiver<WorkerMessage>,
        call_id: RequestId,
        ctx: &'a HookContext,
    ) -> Self {
        Self {
            module,
            out,
            db_rx,
            call_id,
            ctx,
            emitted: Vec::new(),
        }
    }
}

impl ModuleApi for UnitApi<'_> {
    fn emit(&mut self, mut extraction: Extraction) {
        extraction.module = Some(self.module.to_string());
        // Unscoped extractions inherit the invocation's scopes.
        if extraction.session_id.is_none() {
            extraction.session_id = self.ctx.session_id.clone();
        }
        if extraction.run_id.is_none() {
            extraction.run_id = self.ctx.run_id.clone();
        }
        if extraction.user_id.is_none() {
            extraction.user_id = self.ctx.user_id.clone();
        }
        self.emitted.push(extraction);
    }

    fn log(&mut self, level: LogLevel, message: &str) {
        let _ = self.out.send(WorkerMessage::Log {
            level,
            message: message.to_string(),
        });
    }

    fn query(&mut self, query: ExtractionQuery) -> Result<QueryReply> {
        let request_id = RequestId::new();
        self.out
            .send(WorkerMessage::DbQuery {
                request_id: request_id.clone(),
                call_id: self.call_id.clone(),
                query,
            })
            .map_err(|_| WorkerError::UnitGone {
                module: self.module.to_string(),
            })?;

        let deadline = Instant::now() + DB_QUERY_TIMEOUT;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(WorkerError::QueryTimeout {
                    timeout: DB_QUERY_TIMEOUT,
                });
            }
            match self.db_rx.recv_timeout(remaining) {
                Ok(WorkerMessage::DbResponse {
                    request_id: rid,
                    outcome,
                }) if rid == request_id => {
                    return match outcome {
                        QueryOutcome::Ok { reply } => Ok(reply),
                        QueryOutcome::Denied { reason } => {
                            Err(WorkerError::QueryDenied { reason })
                        }
                        QueryOutcome::Failed { message } => {
                            Err(WorkerError::QueryFailed { message })
                        }
                    };
                }
                Ok(stale) => {
                    // A reply to an earlier, already timed-out query.
                    warn!(module = %self.module, "discarding stale db message: {stale:?}");
                }
                Err(std_mpsc::RecvTimeoutError::Timeout) => {
                    return Err(WorkerError::QueryTimeout {
                        timeout: DB_QUERY_TIMEOUT,
                    });
                }
                Err(std_mpsc::RecvTimeoutError::Disconnected) => {
                    return Err(WorkerError::UnitGone {
                        module: self.module.to_string(),
                    });
                }
            }
        }
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "opaque panic payload".to_string()
    }
}

#[cfg(test)]
#[path = "host.test.rs"]
mod tests;
