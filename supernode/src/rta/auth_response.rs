//! Response phase: peer votes arrive as multicasts, get folded into the
//! per-transaction tally, and the payment is driven to a terminal status
//! once a quorum is reached.

use std::sync::Arc;

use log::{debug, error, warn};
use rta_common::{
    api::{decode_payload, rta_ok_result, AuthorizeRtaResponse, SendRawTxRequest,
        SendRawTxResponse},
    context::Context,
    payment::{RtaStatus, VoteResult},
    rpc::{result_response, RpcError},
    serializer::Serializer,
    transaction::RtaSignature,
};
use serde_json::Value;

use crate::{
    config::QuorumRules,
    context::PaymentContext,
    rta::{build_status_broadcast, parse_multicast_envelope, verify_broadcast_ack,
        TaskPaymentId, TaskTxId},
    supernode::{verify_vote, Supernode},
    tally::TallyError,
    task::{OutboundCall, Step, TaskHandler, TaskInput},
};

#[derive(Debug, Clone, Copy, Default)]
pub enum AuthResponseState {
    /// A peer vote was delivered.
    #[default]
    RtaAuthReply,
    /// The ledger acked (or refused) our sendrawtransaction push.
    TransactionPushReply,
    /// The status broadcast was acked.
    StatusBroadcastReply,
}

pub struct AuthResponseHandler {
    context: Arc<PaymentContext>,
    node: Arc<Supernode>,
    quorum: QuorumRules,
}

impl AuthResponseHandler {
    pub fn new(context: Arc<PaymentContext>, node: Arc<Supernode>, quorum: QuorumRules) -> Self {
        AuthResponseHandler {
            context,
            node,
            quorum,
        }
    }

    /// Admit one peer vote and evaluate the quorum thresholds. Every check
    /// that fails leaves the tally untouched.
    fn handle_vote(&self, body: Vec<u8>, task: &mut Context) -> Result<Step, RpcError> {
        let (request, params) = parse_multicast_envelope(&body)?;
        // TODO: check that our address is listed in receiver_addresses
        let vote: AuthorizeRtaResponse = decode_payload(&params.data)
            .map_err(|_| RpcError::InvalidParams("error deserializing rta auth response"))?;

        if vote.result != VoteResult::Approved && vote.result != VoteResult::Rejected {
            error!("invalid rta auth result: {}", vote.result);
            return Err(RpcError::InvalidParams("invalid rta auth result"));
        }

        let tx_id = vote.tx_id.clone();
        let payment_id = self
            .context
            .payment_id_for(&tx_id)
            .ok_or_else(|| RpcError::Internal(format!("unknown tx: {}", tx_id)))?;
        task.store(TaskPaymentId(payment_id));
        task.store(TaskTxId(tx_id.clone()));
        debug!(
            "incoming tx auth response payment: {}, tx_id: {}, from: {}, result: {}",
            payment_id, tx_id, vote.signature.id_key, vote.result
        );

        if !verify_vote(&vote) {
            error!("failed to validate signature for rta auth response");
            return Err(RpcError::SignatureFailed);
        }

        let counts = self
            .context
            .admit_vote(&tx_id, vote.result, vote.signature.clone())
            .map_err(|e| match e {
                TallyError::DuplicateSigner(key) => RpcError::AlreadyVoted(key.to_hex()),
                TallyError::UntalliableResult(_) => {
                    RpcError::InvalidParams("invalid rta auth result")
                }
            })?;
        debug!(
            "rta result accepted from {}, payment: {}",
            vote.signature.id_key, payment_id
        );
        if counts.created {
            self.context.update_status(payment_id, RtaStatus::InProgress);
        }

        let amount = self
            .context
            .amount_for(&tx_id)
            .ok_or_else(|| RpcError::Internal(format!("no amount found for tx id: {}", tx_id)))?;
        if !self.context.has_tx(&tx_id) {
            return Err(RpcError::Internal(format!(
                "rta auth response processed but no tx found for tx id: {}",
                tx_id
            )));
        }

        let votes_to_approve = self.quorum.votes_to_approve(amount);
        debug!(
            "approved votes: {}/{}, rejected votes: {}/{}, payment: {}",
            counts.approved,
            votes_to_approve,
            counts.rejected,
            self.quorum.votes_to_reject,
            payment_id
        );

        // a finished payment accepts late votes into the tally but they
        // drive nothing further
        if let Some(status) = self.context.status_for(&payment_id) {
            if status.is_finite() {
                debug!(
                    "payment: {} already finished with status {}, vote tallied only",
                    payment_id, status
                );
                return Ok(Step::Finish(result_response(
                    request.id.as_ref(),
                    rta_ok_result(),
                )));
            }
        }

        if counts.rejected >= self.quorum.votes_to_reject {
            debug!(
                "payment: {}, tx_id: {} rejected by auth sample, updating status",
                payment_id, tx_id
            );
            let status = self
                .context
                .update_status(payment_id, RtaStatus::FailRejectedByPos);
            let broadcast = build_status_broadcast(&payment_id, status, &self.node)?;
            Ok(Step::Send(OutboundCall::Broadcast(broadcast)))
        } else if counts.approved >= votes_to_approve {
            debug!(
                "payment: {}, tx_id: {} approved by auth sample, pushing tx to pool",
                payment_id, tx_id
            );
            let mut tx = self.context.tx_for(&tx_id).ok_or_else(|| {
                RpcError::Internal(format!("no tx found for tx id: {}", tx_id))
            })?;
            let signatures = self
                .context
                .approved_signatures(&tx_id)
                .ok_or_else(|| RpcError::Internal(format!("no tally for tx id: {}", tx_id)))?;
            // the committee's ledger-level signatures are the tx-only ones
            tx.set_rta_signatures(
                signatures
                    .into_iter()
                    .map(|signature| RtaSignature {
                        id_key: signature.id_key,
                        signature: signature.tx_signature,
                    })
                    .collect(),
            );
            Ok(Step::Send(OutboundCall::SendRawTx(SendRawTxRequest {
                tx_as_hex: tx.to_hex(),
                do_not_relay: false,
            })))
        } else {
            debug!(
                "not enough votes for approval/reject for payment: {}, keep waiting for other votes",
                payment_id
            );
            Ok(Step::Finish(result_response(
                request.id.as_ref(),
                rta_ok_result(),
            )))
        }
    }

    /// Resolve the ledger's sendrawtransaction reply into a terminal status
    /// and kick off the broadcast.
    fn handle_tx_push_reply(&self, reply: Value, task: &mut Context) -> Result<Step, RpcError> {
        let tx_id = task
            .get_optional::<TaskTxId>()
            .map(|marker| marker.0.clone())
            .ok_or_else(|| RpcError::Internal("tx_id not found in task context".into()))?;
        let payment_id = self.context.payment_id_for(&tx_id).ok_or_else(|| {
            RpcError::Internal(format!("payment id not found for tx id: {}", tx_id))
        })?;
        debug!(
            "processing sendrawtransaction reply for payment: {}",
            payment_id
        );

        let status = self
            .context
            .status_for(&payment_id)
            .ok_or_else(|| RpcError::InvalidParams("no status for payment"))?;
        let push_reply: SendRawTxResponse = serde_json::from_value(reply)
            .map_err(|_| RpcError::InvalidParams("failed to parse sendrawtransaction reply"))?;

        if status.is_finite() {
            warn!(
                "payment: {}, most likely already processed, status: {}",
                payment_id, status
            );
            return Ok(Step::Finish(result_response(None, rta_ok_result())));
        }

        let outcome = if !push_reply.is_ok() {
            if push_reply.double_spend {
                // the ledger can answer before the verdict broadcast lands;
                // leave the status to the broadcast
                error!(
                    "double spend for payment: {}, tx: {}",
                    payment_id, tx_id
                );
                return Ok(Step::Finish(result_response(None, rta_ok_result())));
            }
            error!(
                "failed to put tx to pool: {}, reason: {}",
                tx_id,
                push_reply.reason.as_deref().unwrap_or("unknown")
            );
            RtaStatus::FailTxRejected
        } else {
            RtaStatus::Success
        };

        let status = self.context.update_status(payment_id, outcome);
        debug!(
            "broadcasting status for payment id: {}, status: {}",
            payment_id, status
        );
        let broadcast = build_status_broadcast(&payment_id, status, &self.node)?;
        Ok(Step::Send(OutboundCall::Broadcast(broadcast)))
    }

    fn handle_broadcast_ack(&self, reply: Value, task: &mut Context) -> Result<Step, RpcError> {
        verify_broadcast_ack(&reply)?;
        if let Some(TaskPaymentId(payment_id)) = task.get_optional::<TaskPaymentId>() {
            debug!(
                "received status broadcasting result for payment: {}",
                payment_id
            );
        }
        Ok(Step::Finish(result_response(None, rta_ok_result())))
    }
}

impl TaskHandler for AuthResponseHandler {
    type State = AuthResponseState;

    fn step(
        &self,
        state: Self::State,
        input: TaskInput,
        task: &mut Context,
    ) -> Result<(Self::State, Step), RpcError> {
        match (state, input) {
            (AuthResponseState::RtaAuthReply, TaskInput::Delivery(body)) => {
                let step = self.handle_vote(body, task)?;
                let next = match &step {
                    Step::Send(OutboundCall::SendRawTx(_)) => {
                        AuthResponseState::TransactionPushReply
                    }
                    Step::Send(_) => AuthResponseState::StatusBroadcastReply,
                    _ => AuthResponseState::RtaAuthReply,
                };
                Ok((next, step))
            }
            (AuthResponseState::TransactionPushReply, TaskInput::TransportReply(reply)) => Ok((
                AuthResponseState::StatusBroadcastReply,
                self.handle_tx_push_reply(reply, task)?,
            )),
            (AuthResponseState::StatusBroadcastReply, TaskInput::TransportReply(reply)) => Ok((
                AuthResponseState::StatusBroadcastReply,
                self.handle_broadcast_ack(reply, task)?,
            )),
            _ => Err(RpcError::Internal(
                "authorize_rta_tx_response: unexpected input for state".into(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::supernode::Supernode;
    use rta_common::{
        crypto::KeyPair,
        payment::PaymentId,
    };
    use serde_json::json;
    use std::time::Duration;

    fn handler_with_context() -> (AuthResponseHandler, Arc<PaymentContext>) {
        let context = Arc::new(PaymentContext::new(Duration::from_secs(60)));
        let node = Arc::new(Supernode::new(KeyPair::generate()));
        let handler =
            AuthResponseHandler::new(context.clone(), node, QuorumRules::default());
        (handler, context)
    }

    #[test]
    fn test_stale_ledger_reply_keeps_status() {
        let (handler, context) = handler_with_context();
        let tx_id = rta_common::crypto::hash(b"tx");
        let payment_id = PaymentId::new([9; 16]);
        context.store_payment_id(tx_id.clone(), payment_id);
        context.update_status(payment_id, RtaStatus::FailRejectedByPos);

        let mut task = Context::new();
        task.store(TaskTxId(tx_id));
        let (next, step) = handler
            .step(
                AuthResponseState::TransactionPushReply,
                TaskInput::TransportReply(json!({"status": "OK", "double_spend": false})),
                &mut task,
            )
            .unwrap();
        assert!(matches!(next, AuthResponseState::StatusBroadcastReply));
        // replied OK to the ledger, no broadcast, status untouched
        assert!(matches!(step, Step::Finish(_)));
        assert_eq!(
            context.status_for(&payment_id),
            Some(RtaStatus::FailRejectedByPos)
        );
    }

    #[test]
    fn test_double_spend_reply_leaves_status_in_progress() {
        let (handler, context) = handler_with_context();
        let tx_id = rta_common::crypto::hash(b"tx");
        let payment_id = PaymentId::new([8; 16]);
        context.store_payment_id(tx_id.clone(), payment_id);
        context.update_status(payment_id, RtaStatus::InProgress);

        let mut task = Context::new();
        task.store(TaskTxId(tx_id));
        let (_, step) = handler
            .step(
                AuthResponseState::TransactionPushReply,
                TaskInput::TransportReply(
                    json!({"status": "Failed", "double_spend": true, "reason": "double spend"}),
                ),
                &mut task,
            )
            .unwrap();
        assert!(matches!(step, Step::Finish(_)));
        assert_eq!(context.status_for(&payment_id), Some(RtaStatus::InProgress));
    }

    #[test]
    fn test_rejected_ledger_reply_fails_payment() {
        let (handler, context) = handler_with_context();
        let tx_id = rta_common::crypto::hash(b"tx");
        let payment_id = PaymentId::new([7; 16]);
        context.store_payment_id(tx_id.clone(), payment_id);
        context.update_status(payment_id, RtaStatus::InProgress);

        let mut task = Context::new();
        task.store(TaskTxId(tx_id));
        let (_, step) = handler
            .step(
                AuthResponseState::TransactionPushReply,
                TaskInput::TransportReply(
                    json!({"status": "Failed", "double_spend": false, "reason": "low fee"}),
                ),
                &mut task,
            )
            .unwrap();
        assert!(matches!(step, Step::Send(OutboundCall::Broadcast(_))));
        assert_eq!(
            context.status_for(&payment_id),
            Some(RtaStatus::FailTxRejected)
        );
    }

    #[test]
    fn test_missing_task_tx_id_is_internal_error() {
        let (handler, _) = handler_with_context();
        let mut task = Context::new();
        let err = handler
            .step(
                AuthResponseState::TransactionPushReply,
                TaskInput::TransportReply(json!({"status": "OK"})),
                &mut task,
            )
            .unwrap_err();
        assert_eq!(err.get_code(), -32603);
    }

    #[test]
    fn test_broadcast_ack_checked() {
        let (handler, _) = handler_with_context();
        let mut task = Context::new();
        let (_, step) = handler
            .step(
                AuthResponseState::StatusBroadcastReply,
                TaskInput::TransportReply(json!({"result": {"status": 0}})),
                &mut task,
            )
            .unwrap();
        assert!(matches!(step, Step::Finish(_)));

        let err = handler
            .step(
                AuthResponseState::StatusBroadcastReply,
                TaskInput::TransportReply(json!({"error": {"code": -1, "message": "down"}})),
                &mut task,
            )
            .unwrap_err();
        assert_eq!(err.get_code(), -32603);
    }
}
