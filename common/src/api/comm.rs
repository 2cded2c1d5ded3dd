use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::STATUS_OK;

/// Params of a `multicast` or `broadcast` call to the communication layer.
/// `data` is the base64-JSON inner payload; `callback_uri` is the route the
/// receiving supernode dispatches the payload to. An empty receiver list on a
/// broadcast means "everyone".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommRequest {
    pub sender_address: String,
    #[serde(default)]
    pub receiver_addresses: Vec<String>,
    pub callback_uri: String,
    pub data: String,
}

/// Result body of a communication-layer acknowledgement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommAck {
    pub status: u8,
}

/// Check a raw communication-layer reply: JSON-RPC envelope with
/// `error.code == 0` (or absent) and `result.status == OK`.
pub fn ack_is_ok(reply: &Value) -> bool {
    let error_code = reply["error"]["code"].as_i64().unwrap_or(0);
    if error_code != 0 {
        return false;
    }
    match serde_json::from_value::<CommAck>(reply["result"].clone()) {
        Ok(ack) => ack.status == STATUS_OK,
        Err(_) => false,
    }
}
