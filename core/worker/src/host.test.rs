use pretty_assertions::assert_eq;
use serde_json::Value;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::mpsc;

use lattice_protocol::Extraction;
use lattice_protocol::ExtractionQuery;
use lattice_protocol::HookCallOutcome;
use lattice_protocol::HookContext;
use lattice_protocol::HookEvent;
use lattice_protocol::HookResult;
use lattice_protocol::LogLevel;
use lattice_protocol::MessageBody;
use lattice_protocol::Modifications;
use lattice_protocol::QueryOutcome;
use lattice_protocol::QueryReply;
use lattice_protocol::RequestId;
use lattice_protocol::WorkerMessage;

use crate::error::Result;
use crate::error::WorkerError;
use crate::host::WorkerHandle;
use crate::host::spawn_worker;
use crate::module::Module;
use crate::module::ModuleApi;
use crate::module::ModuleFactory;

enum Behavior {
    Succeed,
    EmitThenSucceed,
    FailOnLoad,
    PanicOnLoad,
    PanicFirstCall,
    CountQuery,
}

struct TestModule {
    behavior: Behavior,
    calls: usize,
}

impl TestModule {
    fn factory(behavior: fn() -> Behavior) -> ModuleFactory {
        Arc::new(move || {
            Box::new(TestModule {
                behavior: behavior(),
                calls: 0,
            })
        })
    }
}

impl Module for TestModule {
    fn on_load(&mut self, config: &Value) -> Result<()> {
        match self.behavior {
            Behavior::FailOnLoad => Err(WorkerError::Handler {
                message: format!("bad config: {config}"),
            }),
            Behavior::PanicOnLoad => panic!("load blew up"),
            _ => Ok(()),
        }
    }

    fn handle(&mut self, _ctx: &HookContext, api: &mut dyn ModuleApi) -> Result<HookResult> {
        self.calls += 1;
        match self.behavior {
            Behavior::Succeed => Ok(HookResult::ok()),
            Behavior::EmitThenSucceed => {
                api.emit(Extraction::new("note", json!({ "n": 1 })));
                api.log(LogLevel::Info, "handled");
                Ok(HookResult::ok())
            }
            Behavior::PanicFirstCall => {
                if self.calls == 1 {
                    panic!("first call panics");
                }
                Ok(HookResult::ok())
            }
            Behavior::CountQuery => {
                let reply = api.query(ExtractionQuery::Count {
                    kind: Some("note".to_string()),
                    session_id: None,
                    user_id: None,
                    since: None,
                })?;
                let QueryReply::Count { count } = reply else {
                    return Err(WorkerError::Handler {
                        message: "expected a count reply".to_string(),
                    });
                };
                Ok(HookResult::modified(Modifications {
                    response: Some(MessageBody::new(count.to_string())),
                    ..Default::default()
                }))
            }
            _ => Ok(HookResult::ok()),
        }
    }
}

fn spawn(behavior: fn() -> Behavior) -> (WorkerHandle, mpsc::UnboundedReceiver<WorkerMessage>) {
    spawn_worker("test-mod", TestModule::factory(behavior), json!({})).unwrap()
}

fn ctx() -> HookContext {
    HookContext::new(HookEvent::ChatMessage)
        .with_session_id("sess-1")
        .with_user_id("user-1")
}

async fn expect_ready(rx: &mut mpsc::UnboundedReceiver<WorkerMessage>) {
    match rx.recv().await.unwrap() {
        WorkerMessage::Ready => {}
        other => panic!("expected ready, got {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn ready_execute_unload_lifecycle() {
    let (handle, mut rx) = spawn(|| Behavior::Succeed);
    expect_ready(&mut rx).await;

    let request_id = RequestId::new();
    handle
        .sender()
        .send(WorkerMessage::ExecuteHook {
            request_id: request_id.clone(),
            ctx: ctx(),
        })
        .unwrap();

    match rx.recv().await.unwrap() {
        WorkerMessage::HookResult {
            request_id: rid,
            outcome: HookCallOutcome::Ok { result },
        } => {
            assert_eq!(rid, request_id);
            assert!(!result.is_block());
        }
        other => panic!("expected hook_result, got {other:?}"),
    }

    handle.sender().send(WorkerMessage::Unload).unwrap();
    match rx.recv().await.unwrap() {
        WorkerMessage::Unloaded => {}
        other => panic!("expected unloaded, got {other:?}"),
    }
    // The loop has returned; the stream ends.
    assert!(rx.recv().await.is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn emitted_extractions_are_stamped_and_forwarded() {
    let (handle, mut rx) = spawn(|| Behavior::EmitThenSucceed);
    expect_ready(&mut rx).await;

    handle
        .sender()
        .send(WorkerMessage::ExecuteHook {
            request_id: RequestId::new(),
            ctx: ctx(),
        })
        .unwrap();

    // One-way extraction message first, stamped with module and scopes.
    match rx.recv().await.unwrap() {
        WorkerMessage::Extraction { extraction } => {
            assert_eq!(extraction.kind, "note");
            assert_eq!(extraction.module.as_deref(), Some("test-mod"));
            assert_eq!(extraction.session_id.as_deref(), Some("sess-1"));
            assert_eq!(extraction.user_id.as_deref(), Some("user-1"));
        }
        other => panic!("expected extraction, got {other:?}"),
    }

    // The log line issued by the handler.
    match rx.recv().await.unwrap() {
        WorkerMessage::Log { level, message } => {
            assert_eq!(level, LogLevel::Info);
            assert_eq!(message, "handled");
        }
        other => panic!("expected log, got {other:?}"),
    }

    // The result also carries the emitted extraction.
    match rx.recv().await.unwrap() {
        WorkerMessage::HookResult {
            outcome: HookCallOutcome::Ok { result },
            ..
        } => match result {
            HookResult::Continue { extractions, .. } => {
                assert_eq!(extractions.len(), 1);
                assert_eq!(extractions[0].kind, "note");
            }
            HookResult::Block { .. } => panic!("expected continue"),
        },
        other => panic!("expected hook_result, got {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn failing_on_load_reports_error_without_ready() {
    let (_handle, mut rx) = spawn(|| Behavior::FailOnLoad);
    match rx.recv().await.unwrap() {
        WorkerMessage::Error { message } => {
            assert!(message.contains("on_load failed"), "{message}");
        }
        other => panic!("expected error, got {other:?}"),
    }
    assert!(rx.recv().await.is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn panicking_on_load_is_contained() {
    let (_handle, mut rx) = spawn(|| Behavior::PanicOnLoad);
    match rx.recv().await.unwrap() {
        WorkerMessage::Error { message } => {
            assert!(message.contains("load blew up"), "{message}");
        }
        other => panic!("expected error, got {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn handler_panic_fails_the_call_but_unit_survives() {
    let (handle, mut rx) = spawn(|| Behavior::PanicFirstCall);
    expect_ready(&mut rx).await;

    handle
        .sender()
        .send(WorkerMessage::ExecuteHook {
            request_id: RequestId::from("call-1"),
            ctx: ctx(),
        })
        .unwrap();
    match rx.recv().await.unwrap() {
        WorkerMessage::HookResult {
            outcome: HookCallOutcome::Failed { message },
            ..
        } => assert!(message.contains("first call panics"), "{message}"),
        other => panic!("expected failed hook_result, got {other:?}"),
    }

    // The unit is still serving.
    handle
        .sender()
        .send(WorkerMessage::ExecuteHook {
            request_id: RequestId::from("call-2"),
            ctx: ctx(),
        })
        .unwrap();
    match rx.recv().await.unwrap() {
        WorkerMessage::HookResult {
            outcome: HookCallOutcome::Ok { .. },
            ..
        } => {}
        other => panic!("expected ok hook_result, got {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn db_query_round_trips_through_the_host() {
    let (handle, mut rx) = spawn(|| Behavior::CountQuery);
    expect_ready(&mut rx).await;

    let call_id = RequestId::from("call-q");
    handle
        .sender()
        .send(WorkerMessage::ExecuteHook {
            request_id: call_id.clone(),
            ctx: ctx(),
        })
        .unwrap();

    // Host side of the proxy: answer the query.
    match rx.recv().await.unwrap() {
        WorkerMessage::DbQuery {
            request_id,
            call_id: cid,
            query,
        } => {
            assert_eq!(cid, call_id);
            match query {
                ExtractionQuery::Count { kind, .. } => {
                    assert_eq!(kind.as_deref(), Some("note"));
                }
                other => panic!("expected count query, got {other:?}"),
            }
            handle
                .sender()
                .send_db_response(request_id, QueryOutcome::Ok {
                    reply: QueryReply::Count { count: 7 },
                })
                .unwrap();
        }
        other => panic!("expected db_query, got {other:?}"),
    }

    match rx.recv().await.unwrap() {
        WorkerMessage::HookResult {
            outcome: HookCallOutcome::Ok { result },
            ..
        } => match result {
            HookResult::Continue { modifications, .. } => {
                assert_eq!(modifications.response.unwrap().content, "7");
            }
            HookResult::Block { .. } => panic!("expected continue"),
        },
        other => panic!("expected hook_result, got {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn denied_query_surfaces_as_handler_error() {
    let (handle, mut rx) = spawn(|| Behavior::CountQuery);
    expect_ready(&mut rx).await;

    handle
        .sender()
        .send(WorkerMessage::ExecuteHook {
            request_id: RequestId::new(),
            ctx: ctx(),
        })
        .unwrap();

    match rx.recv().await.unwrap() {
        WorkerMessage::DbQuery { request_id, .. } => {
            handle
                .sender()
                .send_db_response(request_id, QueryOutcome::Denied {
                    reason: "cross-user access".to_string(),
                })
                .unwrap();
        }
        other => panic!("expected db_query, got {other:?}"),
    }

    match rx.recv().await.unwrap() {
        WorkerMessage::HookResult {
            outcome: HookCallOutcome::Failed { message },
            ..
        } => assert!(message.contains("cross-user access"), "{message}"),
        other => panic!("expected failed hook_result, got {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn dropping_the_handle_ends_the_unit_loop() {
    let (handle, mut rx) = spawn(|| Behavior::Succeed);
    expect_ready(&mut rx).await;
    drop(handle);
    // Control channel closed without an unload: the stream just ends.
    assert!(rx.recv().await.is_none());
}
