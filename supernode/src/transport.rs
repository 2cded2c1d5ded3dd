//! Outbound calls to the local cryptonode: `multicast`/`broadcast` JSON-RPC
//! submissions to the communication layer and raw transaction pushes to the
//! ledger. Retries are the cryptonode's responsibility, not ours; every call
//! is bounded by the configured network timeout.

use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use rta_common::{
    api::{CommRequest, SendRawTxRequest},
    rpc::JSON_RPC_VERSION,
};
use serde_json::{json, Value};
use thiserror::Error;

use crate::config::{CRYPTONODE_RTA_PATH, SEND_RAW_TX_PATH};

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn multicast(&self, request: &CommRequest) -> Result<Value, TransportError>;

    async fn broadcast(&self, request: &CommRequest) -> Result<Value, TransportError>;

    async fn send_raw_transaction(
        &self,
        request: &SendRawTxRequest,
    ) -> Result<Value, TransportError>;
}

/// Production transport talking to the local cryptonode over HTTP.
pub struct CryptonodeClient {
    client: reqwest::Client,
    base_url: String,
}

impl CryptonodeClient {
    pub fn new(base_url: String, timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(CryptonodeClient {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn post_json_rpc(
        &self,
        method: &str,
        params: &CommRequest,
    ) -> Result<Value, TransportError> {
        let url = format!("{}{}", self.base_url, CRYPTONODE_RTA_PATH);
        debug!("posting {} to {}", method, url);
        let body = json!({
            "jsonrpc": JSON_RPC_VERSION,
            "id": 0,
            "method": method,
            "params": params,
        });
        let response = self.client.post(url).json(&body).send().await?;
        Ok(response.json().await?)
    }
}

#[async_trait]
impl Transport for CryptonodeClient {
    async fn multicast(&self, request: &CommRequest) -> Result<Value, TransportError> {
        self.post_json_rpc("multicast", request).await
    }

    async fn broadcast(&self, request: &CommRequest) -> Result<Value, TransportError> {
        self.post_json_rpc("broadcast", request).await
    }

    async fn send_raw_transaction(
        &self,
        request: &SendRawTxRequest,
    ) -> Result<Value, TransportError> {
        let url = format!("{}{}", self.base_url, SEND_RAW_TX_PATH);
        debug!("pushing raw tx to {}", url);
        let response = self.client.post(url).json(request).send().await?;
        Ok(response.json().await?)
    }
}

/// Recording transport for tests: stores every outbound call and answers
/// from scripted replies (an OK ack by default).
#[derive(Default)]
pub struct MockTransport {
    multicasts: std::sync::Mutex<Vec<CommRequest>>,
    broadcasts: std::sync::Mutex<Vec<CommRequest>>,
    ledger: std::sync::Mutex<Vec<SendRawTxRequest>>,
    ledger_replies: std::sync::Mutex<Vec<Value>>,
    comm_replies: std::sync::Mutex<Vec<Value>>,
}

impl MockTransport {
    fn ok_ack() -> Value {
        json!({
            "jsonrpc": JSON_RPC_VERSION,
            "id": 0,
            "result": { "status": 0 },
        })
    }

    pub fn push_comm_reply(&self, reply: Value) {
        self.comm_replies.lock().unwrap().push(reply);
    }

    pub fn push_ledger_reply(&self, reply: Value) {
        self.ledger_replies.lock().unwrap().push(reply);
    }

    pub fn multicast_calls(&self) -> Vec<CommRequest> {
        self.multicasts.lock().unwrap().clone()
    }

    pub fn broadcast_calls(&self) -> Vec<CommRequest> {
        self.broadcasts.lock().unwrap().clone()
    }

    pub fn ledger_calls(&self) -> Vec<SendRawTxRequest> {
        self.ledger.lock().unwrap().clone()
    }

    fn next_comm_reply(&self) -> Value {
        let mut replies = self.comm_replies.lock().unwrap();
        if replies.is_empty() {
            Self::ok_ack()
        } else {
            replies.remove(0)
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn multicast(&self, request: &CommRequest) -> Result<Value, TransportError> {
        self.multicasts.lock().unwrap().push(request.clone());
        Ok(self.next_comm_reply())
    }

    async fn broadcast(&self, request: &CommRequest) -> Result<Value, TransportError> {
        self.broadcasts.lock().unwrap().push(request.clone());
        Ok(self.next_comm_reply())
    }

    async fn send_raw_transaction(
        &self,
        request: &SendRawTxRequest,
    ) -> Result<Value, TransportError> {
        self.ledger.lock().unwrap().push(request.clone());
        let mut replies = self.ledger_replies.lock().unwrap();
        if replies.is_empty() {
            Ok(json!({"status": "OK", "double_spend": false}))
        } else {
            Ok(replies.remove(0))
        }
    }
}
