//! The RTA protocol state machines: request phase (this node's own vote),
//! response phase (tallying the sample's votes and driving the payment to a
//! terminal status) and the status broadcaster.

mod auth_request;
mod auth_response;
mod broadcast;

pub use auth_request::{AuthRequestHandler, AuthRequestState};
pub use auth_response::{AuthResponseHandler, AuthResponseState};
pub use broadcast::{build_status_broadcast, verify_broadcast_ack};

use rta_common::{
    api::CommRequest,
    crypto::Hash,
    payment::PaymentId,
    rpc::{Id, RpcError, RpcRequest},
};

// task-context markers; one value per type, hence the newtypes

/// Raw inbound body, persisted across the early ack.
pub(crate) struct StoredRequest(pub Vec<u8>);

/// Id of the inbound JSON-RPC request.
pub(crate) struct RequestId(pub Option<Id>);

/// Payment this task serves, for logging.
pub(crate) struct TaskPaymentId(pub PaymentId);

/// Transaction this task serves, consumed by the ledger-reply state.
pub(crate) struct TaskTxId(pub Hash);

/// Parse an inbound body as a `multicast` JSON-RPC envelope.
pub(crate) fn parse_multicast_envelope(
    body: &[u8],
) -> Result<(RpcRequest, CommRequest), RpcError> {
    let request = RpcRequest::parse(body)?;
    if request.method != "multicast" {
        return Err(RpcError::MethodNotFound(request.method.clone()));
    }
    let params: CommRequest = request.params()?;
    Ok((request, params))
}
