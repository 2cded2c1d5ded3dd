use serde::{Deserialize, Serialize};

/// `POST /sendrawtransaction` body pushed to the ledger once a transaction is
/// approved by its auth sample.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendRawTxRequest {
    pub tx_as_hex: String,
    pub do_not_relay: bool,
}

/// Ledger reply to `sendrawtransaction`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendRawTxResponse {
    pub status: String,
    #[serde(default)]
    pub double_spend: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl SendRawTxResponse {
    pub fn is_ok(&self) -> bool {
        self.status == "OK"
    }
}
