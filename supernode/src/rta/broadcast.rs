//! Terminal status broadcasting.
//!
//! Once a payment reaches a finite status the verdict is announced to the
//! whole sample and to interested external observers. Broadcasts may be
//! delivered any number of times; listeners deduplicate by payment id.

use log::debug;
use rta_common::{
    api::{encode_payload, CommRequest, UpdatePaymentStatusBroadcast},
    payment::{PaymentId, RtaStatus},
    rpc::RpcError,
};
use serde_json::Value;

use crate::{config::UPDATE_PAYMENT_STATUS_PATH, supernode::Supernode};

/// Build the signed status announcement for a payment. An empty receiver
/// list addresses every interested party.
pub fn build_status_broadcast(
    payment_id: &PaymentId,
    status: RtaStatus,
    node: &Supernode,
) -> Result<CommRequest, RpcError> {
    let announcement = UpdatePaymentStatusBroadcast {
        payment_id: *payment_id,
        status,
        signature: node.sign_status(payment_id, status),
    };
    debug!(
        "building status broadcast for payment: {}, status: {}",
        payment_id, status
    );
    Ok(CommRequest {
        sender_address: node.id_key_hex(),
        receiver_addresses: Vec::new(),
        callback_uri: UPDATE_PAYMENT_STATUS_PATH.to_string(),
        data: encode_payload(&announcement)
            .map_err(|e| RpcError::Internal(format!("failed to encode status broadcast: {}", e)))?,
    })
}

/// Check the communication layer's acknowledgement of a status broadcast.
pub fn verify_broadcast_ack(reply: &Value) -> Result<(), RpcError> {
    if !rta_common::api::ack_is_ok(reply) {
        return Err(RpcError::Internal("Error broadcasting status".into()));
    }
    Ok(())
}
