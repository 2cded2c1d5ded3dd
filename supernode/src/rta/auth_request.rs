//! Request phase: an authorization request multicast by the payer's proxy
//! arrives, this node validates the transaction, casts its own vote and
//! multicasts it to the rest of the auth sample.
//!
//! The caller is acked before the vote is cast so the payer never blocks on
//! the vote cycle, and a retried delivery cannot double-dispatch the vote:
//! the second delivery trips the idempotence guard.

use std::sync::Arc;

use log::debug;
use rta_common::{
    api::{decode_payload, encode_payload, rta_ok_result, AuthorizeRtaRequest, AuthorizeRtaResponse, CommRequest},
    context::Context,
    payment::{PaymentId, VoteResult},
    rpc::{result_response, RpcError},
    transaction::{Transaction, TxType},
    serializer::Serializer,
};

use crate::{
    config::AUTHORIZE_RTA_TX_RESPONSE_PATH,
    context::PaymentContext,
    rta::{parse_multicast_envelope, RequestId, StoredRequest, TaskPaymentId},
    supernode::Supernode,
    task::{OutboundCall, Step, TaskHandler, TaskInput},
};

#[derive(Debug, Clone, Copy, Default)]
pub enum AuthRequestState {
    /// Incoming request from the payer's proxy.
    #[default]
    ClientRequest,
    /// Re-invoked after the early ack.
    ClientRequestAgain,
    /// The cryptonode acked our vote multicast.
    CryptonodeReply,
}

pub struct AuthRequestHandler {
    context: Arc<PaymentContext>,
    node: Arc<Supernode>,
}

impl AuthRequestHandler {
    pub fn new(context: Arc<PaymentContext>, node: Arc<Supernode>) -> Self {
        AuthRequestHandler { context, node }
    }

    fn store_request_and_ack(
        &self,
        body: Vec<u8>,
        task: &mut Context,
    ) -> Result<Step, RpcError> {
        let (request, params) = parse_multicast_envelope(&body)?;
        // parsed here for logging only; the real work happens after the ack
        let auth_req: AuthorizeRtaRequest = decode_payload(&params.data)
            .map_err(|_| RpcError::InvalidParams("error deserializing rta auth request"))?;
        debug!(
            "incoming tx auth request from: {}, payment: {}",
            params.sender_address, auth_req.payment_id
        );

        let reply = result_response(request.id.as_ref(), rta_ok_result());
        task.store(RequestId(request.id));
        task.store(StoredRequest(body));
        Ok(Step::Ack(reply))
    }

    /// Validate the transaction and cast this node's vote. The first failed
    /// check is decisive; a zero fee or a non-RTA type is not an error but a
    /// `Rejected` vote.
    fn cast_vote(&self, task: &mut Context) -> Result<Step, RpcError> {
        let StoredRequest(body) = task
            .take::<StoredRequest>()
            .ok_or_else(|| RpcError::Internal("no stored request for resumed task".into()))?;
        let (_, params) = parse_multicast_envelope(&body)?;
        let auth_req: AuthorizeRtaRequest = decode_payload(&params.data)
            .map_err(|_| RpcError::InvalidParams("error deserializing rta auth request"))?;

        let payment_id: PaymentId = auth_req
            .payment_id
            .parse()
            .map_err(|_| RpcError::InvalidPaymentId)?;
        if auth_req.amount == 0 {
            return Err(RpcError::InvalidAmount);
        }

        let tx = Transaction::from_hex(&auth_req.tx_hex)
            .map_err(|e| RpcError::InvalidTransaction(format!("{}: {}", auth_req.tx_hex, e)))?;
        let tx_id = tx.id();
        debug!(
            "incoming auth req for payment: {}, tx_id: {}",
            payment_id, tx_id
        );

        if self.context.has_tx(&tx_id) {
            return Err(RpcError::AlreadyProcessed(tx_id.to_hex()));
        }

        debug!(
            "storing amount for payment: {}, tx_id: {}, amount: {}",
            payment_id, tx_id, auth_req.amount
        );
        self.context.store_amount(tx_id.clone(), auth_req.amount);

        let fee = tx.fee_for(&self.node.id_key());
        let result = if fee > 0 && tx.tx_type() == TxType::Rta {
            VoteResult::Approved
        } else {
            VoteResult::Rejected
        };

        let vote = AuthorizeRtaResponse {
            tx_id: tx_id.clone(),
            result,
            signature: self.node.sign_vote(&tx_id, result),
        };

        self.context.store_tx(tx_id.clone(), tx);
        self.context.store_payment_id(tx_id, payment_id);
        task.store(TaskPaymentId(payment_id));

        let multicast = CommRequest {
            sender_address: self.node.id_key_hex(),
            receiver_addresses: params.receiver_addresses,
            callback_uri: AUTHORIZE_RTA_TX_RESPONSE_PATH.to_string(),
            data: encode_payload(&vote)
                .map_err(|e| RpcError::Internal(format!("failed to encode vote: {}", e)))?,
        };
        debug!("payment: {}, validate result: {}", payment_id, result);

        Ok(Step::Send(OutboundCall::Multicast(multicast)))
    }

    fn check_multicast_ack(
        &self,
        reply: serde_json::Value,
        task: &mut Context,
    ) -> Result<Step, RpcError> {
        if !rta_common::api::ack_is_ok(&reply) {
            return Err(RpcError::Internal("Error multicasting request".into()));
        }
        if let Some(TaskPaymentId(payment_id)) = task.get_optional::<TaskPaymentId>() {
            debug!(
                "tx auth response multicast ack received for payment: {}",
                payment_id
            );
        }
        let id = task.take::<RequestId>().and_then(|RequestId(id)| id);
        Ok(Step::Finish(result_response(id.as_ref(), rta_ok_result())))
    }
}

impl TaskHandler for AuthRequestHandler {
    type State = AuthRequestState;

    fn step(
        &self,
        state: Self::State,
        input: TaskInput,
        task: &mut Context,
    ) -> Result<(Self::State, Step), RpcError> {
        match (state, input) {
            (AuthRequestState::ClientRequest, TaskInput::Delivery(body)) => Ok((
                AuthRequestState::ClientRequestAgain,
                self.store_request_and_ack(body, task)?,
            )),
            (AuthRequestState::ClientRequestAgain, TaskInput::Resumed) => Ok((
                AuthRequestState::CryptonodeReply,
                self.cast_vote(task)?,
            )),
            (AuthRequestState::CryptonodeReply, TaskInput::TransportReply(reply)) => Ok((
                AuthRequestState::CryptonodeReply,
                self.check_multicast_ack(reply, task)?,
            )),
            _ => Err(RpcError::Internal(
                "authorize_rta_tx_request: unexpected input for state".into(),
            )),
        }
    }
}
