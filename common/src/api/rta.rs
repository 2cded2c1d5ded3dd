use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::{
    crypto::{Hash, PublicKey, Signature},
    payment::{PaymentId, RtaStatus, VoteResult},
};

/// Authorization request multicast by the payer's proxy to the auth sample.
/// `payment_id` stays a raw string so a malformed id can be reported with its
/// own error code instead of a generic parse failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizeRtaRequest {
    pub payment_id: String,
    pub amount: u64,
    pub tx_hex: String,
}

/// Signature triple attached to a vote. `result_signature` covers the ASCII
/// string `"<tx_id_hex>:<result_int>"`, `tx_signature` covers the raw 32-byte
/// tx id; both must verify under `id_key` for the vote to count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupernodeSignature {
    pub id_key: PublicKey,
    pub result_signature: Signature,
    pub tx_signature: Signature,
}

/// A supernode's vote on one transaction, multicast to the rest of the
/// auth sample.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizeRtaResponse {
    pub tx_id: Hash,
    pub result: VoteResult,
    pub signature: SupernodeSignature,
}

impl AuthorizeRtaResponse {
    /// The message `result_signature` must cover.
    pub fn result_message(tx_id: &Hash, result: VoteResult) -> String {
        format!("{}:{}", tx_id, result)
    }
}

/// Terminal status announcement broadcast to the sample and to interested
/// external observers, signed by the broadcasting node over
/// `"<payment_id_hex>:<status_int>"`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdatePaymentStatusBroadcast {
    pub payment_id: PaymentId,
    pub status: RtaStatus,
    pub signature: Signature,
}

impl UpdatePaymentStatusBroadcast {
    /// The message `signature` must cover.
    pub fn status_message(payment_id: &PaymentId, status: RtaStatus) -> String {
        format!("{}:{}", payment_id, status)
    }
}

/// Plain OK body acknowledging an RTA call.
pub fn rta_ok_result() -> Value {
    json!({ "result": crate::config::STATUS_OK })
}
