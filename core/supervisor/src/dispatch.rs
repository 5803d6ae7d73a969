//! Hook dispatch engine.
//!
//! One hook invocation fans out to every ready module declaring the hook,
//! in ascending priority order (load order breaks ties). Blocking modules
//! run strictly sequentially with context threading: each sees the context
//! as modified by all prior blocking modules, and a `block` result stops
//! the chain. Non-blocking modules are fire-and-forget: they receive the
//! context as modified so far, run on spawned tasks, and never affect the
//! returned aggregate.
//!
//! Failure policy is fail-open per call: a module that errors or times out
//! is skipped, reported as a health event, and the chain continues. A
//! module that must fail closed returns `block` instead of erroring.

use std::sync::Arc;

use tracing::debug;
use tracing::warn;

use lattice_protocol::Extraction;
use lattice_protocol::HookCallOutcome;
use lattice_protocol::HookContext;
use lattice_protocol::HookResult;
use lattice_protocol::Modifications;
use lattice_protocol::RequestId;

use crate::proxy::ProxyBinding;
use crate::supervisor::DispatchTarget;
use crate::supervisor::ModuleEvent;
use crate::supervisor::Supervisor;

impl Supervisor {
    /// Execute one hook invocation and fold the chain into a single result.
    ///
    /// Returns as soon as the blocking chain completes; non-blocking module
    /// work may still be running.
    pub async fn execute_hook(self: &Arc<Self>, ctx: HookContext) -> HookResult {
        let targets = self.hook_targets(ctx.hook).await;
        if targets.is_empty() {
            return HookResult::ok();
        }
        debug!(
            hook = %ctx.hook,
            request_id = %ctx.request_id,
            modules = targets.len(),
            "dispatching hook"
        );

        let mut ctx = ctx;
        let mut modifications = Modifications::default();
        let mut extractions: Vec<Extraction> = Vec::new();

        for target in targets {
            if !target.blocking {
                self.spawn_non_blocking(target, ctx.clone());
                continue;
            }

            match self.call_module(&target, ctx.clone()).await {
                Ok(HookResult::Continue {
                    modifications: m,
                    extractions: e,
                }) => {
                    // Thread the edits so the next module observes them.
                    ctx.apply(&m);
                    modifications.merge(m);
                    extractions.extend(e);
                }
                Ok(HookResult::Block {
                    reason,
                    response,
                    extractions: e,
                }) => {
                    extractions.extend(e);
                    debug!(hook = %ctx.hook, module = %target.module, %reason, "hook blocked");
                    return HookResult::Block {
                        reason,
                        response,
                        extractions,
                    };
                }
                Err(error) => {
                    // Fail-open: skip this module, keep the chain going.
                    warn!(
                        hook = %ctx.hook,
                        module = %target.module,
                        "hook call failed, continuing: {error}"
                    );
                    self.publish(ModuleEvent::CallFailed {
                        module: target.module,
                        hook: ctx.hook,
                        error,
                    });
                }
            }
        }

        HookResult::Continue {
            modifications,
            extractions,
        }
    }

    /// One bounded call to one module, with the proxy binding registered for
    /// the duration so `db_query` messages can be authorized.
    async fn call_module(
        &self,
        target: &DispatchTarget,
        ctx: HookContext,
    ) -> Result<HookResult, String> {
        let call_id = RequestId::new();
        let binding = ProxyBinding {
            module: target.module.clone(),
            session_id: ctx.session_id.clone(),
            user_id: ctx.user_id.clone(),
        };
        self.begin_call(call_id.clone(), binding).await;
        let outcome = self
            .bridge
            .call(&target.sender, call_id.clone(), ctx, target.timeout)
            .await;
        self.end_call(&call_id).await;

        match outcome {
            Ok(HookCallOutcome::Ok { result }) => Ok(result),
            Ok(HookCallOutcome::Failed { message }) => Err(message),
            Err(e) => Err(e.to_string()),
        }
    }

    /// Fire-and-forget execution of a non-blocking module. The result is
    /// only logged; emitted extractions still reach the sink through the
    /// unit's one-way `extraction` messages.
    fn spawn_non_blocking(self: &Arc<Self>, target: DispatchTarget, ctx: HookContext) {
        let sup = Arc::clone(self);
        tokio::spawn(async move {
            let hook = ctx.hook;
            match sup.call_module(&target, ctx).await {
                Ok(result) => {
                    debug!(
                        hook = %hook,
                        module = %target.module,
                        blocked = result.is_block(),
                        "non-blocking hook call completed"
                    );
                }
                Err(error) => {
                    warn!(
                        hook = %hook,
                        module = %target.module,
                        "non-blocking hook call failed: {error}"
                    );
                    sup.publish(ModuleEvent::CallFailed {
                        module: target.module,
                        hook,
                        error,
                    });
                }
            }
        });
    }
}

#[cfg(test)]
#[path = "dispatch.test.rs"]
mod tests;
