//! Per-message task runtime.
//!
//! Every inbound message spawns one task. A handler is a pure transition
//! function `(state, input, task context) -> (next state, step)`; the driver
//! owns all I/O. `Ack` hands a reply to the HTTP layer and re-invokes the
//! handler afterwards, detached from the caller; `Send` performs an outbound
//! call and re-invokes the handler with the reply; `Finish` ends the task.
//! Panics inside a transition are caught at this boundary and surface as an
//! internal error, so no task can unwind past the router.

use std::{panic::AssertUnwindSafe, sync::Arc};

use futures::future::BoxFuture;
use futures::FutureExt;
use log::{debug, error};
use rta_common::{api::SendRawTxRequest, api::CommRequest, context::Context, rpc::RpcError};
use serde_json::Value;

use crate::transport::Transport;

/// What a task is invoked with.
pub enum TaskInput {
    /// The raw body of the inbound message, on first invocation.
    Delivery(Vec<u8>),
    /// Re-invocation after an `Ack` was handed to the caller.
    Resumed,
    /// The reply of the outbound call requested by `Send`.
    TransportReply(Value),
}

/// An outbound call requested by a handler.
#[derive(Debug, Clone)]
pub enum OutboundCall {
    Multicast(CommRequest),
    Broadcast(CommRequest),
    SendRawTx(SendRawTxRequest),
}

/// What the driver must do after a transition.
#[derive(Debug)]
pub enum Step {
    /// Reply to the caller now, then re-invoke the handler detached.
    Ack(Value),
    /// Perform the outbound call, then re-invoke with its reply.
    Send(OutboundCall),
    /// Reply to the caller (or, when detached, log) and end the task.
    Finish(Value),
}

/// A protocol state machine. Transitions must not block; all I/O goes
/// through the returned [`Step`].
pub trait TaskHandler: Send + Sync + 'static {
    type State: Copy + Default + Send + 'static;

    fn step(
        &self,
        state: Self::State,
        input: TaskInput,
        task: &mut Context,
    ) -> Result<(Self::State, Step), RpcError>;
}

/// Result of driving a task up to its first reply. When the handler acked
/// early, the rest of the task is returned as a future for the caller to
/// spawn.
pub struct TaskOutcome {
    pub reply: Value,
    pub background: Option<BoxFuture<'static, ()>>,
}

impl std::fmt::Debug for TaskOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskOutcome")
            .field("reply", &self.reply)
            .field("background", &self.background.is_some())
            .finish()
    }
}

fn invoke<H: TaskHandler>(
    handler: &H,
    state: H::State,
    input: TaskInput,
    task: &mut Context,
) -> Result<(H::State, Step), RpcError> {
    std::panic::catch_unwind(AssertUnwindSafe(|| handler.step(state, input, task)))
        .unwrap_or_else(|_| {
            error!("handler panicked, translating to internal error");
            Err(RpcError::Internal("unexpected handler failure".into()))
        })
}

async fn perform(transport: &dyn Transport, call: &OutboundCall) -> Result<Value, RpcError> {
    let result = match call {
        OutboundCall::Multicast(request) => transport.multicast(request).await,
        OutboundCall::Broadcast(request) => transport.broadcast(request).await,
        OutboundCall::SendRawTx(request) => transport.send_raw_transaction(request).await,
    };
    result.map_err(|e| RpcError::Internal(format!("transport call failed: {:#}", e)))
}

/// Drive a task until it produces a reply for the caller. Outbound calls
/// issued before the first reply run inline; everything after an `Ack` is
/// returned as a detached continuation.
pub async fn dispatch<H: TaskHandler>(
    handler: Arc<H>,
    transport: Arc<dyn Transport>,
    body: Vec<u8>,
) -> Result<TaskOutcome, RpcError> {
    let mut task = Context::new();
    let mut state = H::State::default();
    let mut input = TaskInput::Delivery(body);
    loop {
        let (next, step) = invoke(handler.as_ref(), state, input, &mut task)?;
        state = next;
        match step {
            Step::Finish(reply) => {
                return Ok(TaskOutcome {
                    reply,
                    background: None,
                })
            }
            Step::Ack(reply) => {
                let continuation = run_detached(handler, transport, state, task).boxed();
                return Ok(TaskOutcome {
                    reply,
                    background: Some(continuation),
                });
            }
            Step::Send(call) => {
                let reply = perform(transport.as_ref(), &call).await?;
                input = TaskInput::TransportReply(reply);
            }
        }
    }
}

/// Continuation of a task after its caller was acked. Errors terminate the
/// task and are logged; there is nobody left to answer.
async fn run_detached<H: TaskHandler>(
    handler: Arc<H>,
    transport: Arc<dyn Transport>,
    mut state: H::State,
    mut task: Context,
) {
    let mut input = TaskInput::Resumed;
    loop {
        match invoke(handler.as_ref(), state, input, &mut task) {
            Err(e) => {
                error!("detached task failed: {:#} (code {})", e, e.get_code());
                return;
            }
            Ok((next, step)) => {
                state = next;
                match step {
                    Step::Finish(_) => {
                        debug!("detached task finished");
                        return;
                    }
                    Step::Ack(_) => {
                        // nobody to ack anymore, continue the machine
                        input = TaskInput::Resumed;
                    }
                    Step::Send(call) => match perform(transport.as_ref(), &call).await {
                        Ok(reply) => input = TaskInput::TransportReply(reply),
                        Err(e) => {
                            error!("detached task transport failure: {:#}", e);
                            return;
                        }
                    },
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;
    use serde_json::json;

    #[derive(Default, Clone, Copy)]
    enum EchoState {
        #[default]
        First,
        Second,
    }

    struct EchoHandler;

    impl TaskHandler for EchoHandler {
        type State = EchoState;

        fn step(
            &self,
            state: Self::State,
            input: TaskInput,
            _task: &mut Context,
        ) -> Result<(Self::State, Step), RpcError> {
            match (state, input) {
                (EchoState::First, TaskInput::Delivery(body)) => Ok((
                    EchoState::Second,
                    Step::Send(OutboundCall::SendRawTx(SendRawTxRequest {
                        tx_as_hex: String::from_utf8(body).unwrap_or_default(),
                        do_not_relay: false,
                    })),
                )),
                (EchoState::Second, TaskInput::TransportReply(reply)) => {
                    Ok((EchoState::Second, Step::Finish(reply)))
                }
                _ => Err(RpcError::Internal("unexpected input".into())),
            }
        }
    }

    struct PanickingHandler;

    impl TaskHandler for PanickingHandler {
        type State = EchoState;

        fn step(
            &self,
            _state: Self::State,
            _input: TaskInput,
            _task: &mut Context,
        ) -> Result<(Self::State, Step), RpcError> {
            panic!("boom");
        }
    }

    #[tokio::test]
    async fn test_send_then_finish() {
        let transport = Arc::new(MockTransport::default());
        transport.push_ledger_reply(json!({"status": "OK"}));
        let outcome = dispatch(Arc::new(EchoHandler), transport.clone(), b"aa".to_vec())
            .await
            .unwrap();
        assert!(outcome.background.is_none());
        assert_eq!(outcome.reply["status"], "OK");
        assert_eq!(transport.ledger_calls().len(), 1);
    }

    #[tokio::test]
    async fn test_panic_becomes_internal_error() {
        let transport = Arc::new(MockTransport::default());
        let err = dispatch(Arc::new(PanickingHandler), transport, Vec::new())
            .await
            .unwrap_err();
        assert_eq!(err.get_code(), -32603);
    }
}
