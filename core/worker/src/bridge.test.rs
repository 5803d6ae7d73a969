use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::json;
use tokio::sync::mpsc;

use lattice_protocol::HookCallOutcome;
use lattice_protocol::HookContext;
use lattice_protocol::HookEvent;
use lattice_protocol::HookResult;
use lattice_protocol::RequestId;
use lattice_protocol::WorkerMessage;

use crate::bridge::MessageBridge;
use crate::error::Result;
use crate::error::WorkerError;
use crate::host::WorkerHandle;
use crate::host::spawn_worker;
use crate::module::Module;
use crate::module::ModuleApi;

struct PausingModule {
    pause: Duration,
}

impl Module for PausingModule {
    fn handle(&mut self, _ctx: &HookContext, _api: &mut dyn ModuleApi) -> Result<HookResult> {
        if !self.pause.is_zero() {
            std::thread::sleep(self.pause);
        }
        Ok(HookResult::ok())
    }
}

fn spawn_pausing(pause: Duration) -> (WorkerHandle, mpsc::UnboundedReceiver<WorkerMessage>) {
    spawn_worker(
        "pausing",
        Arc::new(move || Box::new(PausingModule { pause })),
        json!({}),
    )
    .unwrap()
}

/// Drives the unit→host stream the way the supervisor's pump task does,
/// feeding hook results back into the bridge.
fn pump(bridge: Arc<MessageBridge>, mut rx: mpsc::UnboundedReceiver<WorkerMessage>) {
    tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if let WorkerMessage::HookResult {
                request_id,
                outcome,
            } = msg
            {
                bridge.resolve(&request_id, outcome).await;
            }
        }
    });
}

#[tokio::test(flavor = "multi_thread")]
async fn call_resolves_with_the_unit_outcome() {
    let bridge = Arc::new(MessageBridge::new());
    let (handle, rx) = spawn_pausing(Duration::ZERO);
    pump(Arc::clone(&bridge), rx);

    let outcome = bridge
        .call(
            handle.sender(),
            RequestId::new(),
            HookContext::new(HookEvent::SessionStart),
            Duration::from_secs(5),
        )
        .await
        .unwrap();
    match outcome {
        HookCallOutcome::Ok { result } => assert!(!result.is_block()),
        HookCallOutcome::Failed { message } => panic!("unexpected failure: {message}"),
    }
    assert_eq!(bridge.pending_count().await, 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn slow_call_times_out_and_clears_its_entry() {
    let bridge = Arc::new(MessageBridge::new());
    let (handle, rx) = spawn_pausing(Duration::from_millis(300));
    pump(Arc::clone(&bridge), rx);

    let err = bridge
        .call(
            handle.sender(),
            RequestId::new(),
            HookContext::new(HookEvent::ChatMessage),
            Duration::from_millis(25),
        )
        .await
        .unwrap_err();
    match err {
        WorkerError::CallTimeout { module, .. } => assert_eq!(module, "pausing"),
        other => panic!("expected timeout, got {other}"),
    }
    assert_eq!(bridge.pending_count().await, 0);

    // The late reply arrives as an orphan and is dropped without effect.
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(bridge.pending_count().await, 0);
}

#[tokio::test]
async fn resolving_an_unknown_id_is_a_no_op() {
    let bridge = MessageBridge::new();
    bridge
        .resolve(&RequestId::from("nobody-waiting"), HookCallOutcome::Failed {
            message: "late".to_string(),
        })
        .await;
    assert_eq!(bridge.pending_count().await, 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn aborting_a_pending_call_fails_it_as_unit_exited() {
    let bridge = Arc::new(MessageBridge::new());
    // Keep the unit→host stream alive but undrained: nothing will ever
    // resolve the call, so only the abort can finish it.
    let (handle, mut rx) = spawn_pausing(Duration::from_secs(5));
    match rx.recv().await.unwrap() {
        WorkerMessage::Ready => {}
        other => panic!("expected ready, got {other:?}"),
    }

    let request_id = RequestId::from("aborted-call");
    let call = {
        let bridge = Arc::clone(&bridge);
        let sender = handle.clone_sender();
        let request_id = request_id.clone();
        tokio::spawn(async move {
            bridge
                .call(
                    &sender,
                    request_id,
                    HookContext::new(HookEvent::ChatMessage),
                    Duration::from_secs(5),
                )
                .await
        })
    };

    // Give the call a moment to register before pulling the rug.
    tokio::time::sleep(Duration::from_millis(50)).await;
    bridge.abort(&request_id).await;

    match call.await.unwrap() {
        Err(WorkerError::UnitExited { module }) => assert_eq!(module, "pausing"),
        other => panic!("expected unit-exited, got {other:?}"),
    }
}
