use std::fmt::{Display, Formatter};

#[cfg(feature = "rpc-server")]
use actix_web::{HttpResponse, ResponseError};

use serde_json::{json, Error as SerdeError, Value};
use thiserror::Error;

use crate::rpc::{Id, JSON_RPC_VERSION};

/// Every failure a handler can surface to a caller. `get_code` maps each
/// variant to its JSON-RPC error code; the RTA-specific codes live in the
/// -32050..-32099 range.
#[derive(Error, Debug)]
pub enum RpcError {
    #[error("Invalid JSON body")]
    ParseBody,
    #[error("Invalid request: {0}")]
    InvalidRequest(&'static str),
    #[error("Method '{0}' in request was not found")]
    MethodNotFound(String),
    #[error("Invalid params: {0}")]
    InvalidParams(&'static str),
    #[error("Invalid params: {0}")]
    InvalidJsonParams(#[from] SerdeError),
    #[error("tx already processed: {0}")]
    AlreadyProcessed(String),
    #[error("Amount is invalid")]
    InvalidAmount,
    #[error("Payment ID is invalid")]
    InvalidPaymentId,
    #[error("supernode {0} already voted")]
    AlreadyVoted(String),
    #[error("Signature check failed")]
    SignatureFailed,
    #[error("Can't parse transaction: {0}")]
    InvalidTransaction(String),
    #[error("Internal error: {0}")]
    Internal(String),
    // custom codes must stay outside the ranges reserved above
    #[error("{1}")]
    Custom(i16, String),
}

impl RpcError {
    pub fn get_code(&self) -> i16 {
        match self {
            // JSON RPC errors
            Self::ParseBody => -32700,
            Self::InvalidRequest(_) => -32600,
            Self::MethodNotFound(_) => -32601,
            Self::InvalidParams(_) | Self::InvalidJsonParams(_) | Self::AlreadyProcessed(_) => {
                -32602
            }
            Self::Internal(_) => -32603,
            // RTA errors
            Self::InvalidAmount => -32050,
            Self::InvalidPaymentId => -32051,
            Self::AlreadyVoted(_) => -32052,
            Self::SignatureFailed => -32080,
            Self::InvalidTransaction(_) => -32090,
            Self::Custom(code, _) => *code,
        }
    }
}

/// An `RpcError` paired with the id of the request it answers; renders as the
/// JSON-RPC error envelope.
#[derive(Debug)]
pub struct RpcResponseError {
    id: Option<Id>,
    error: RpcError,
}

impl RpcResponseError {
    pub fn new<T: Into<RpcError>>(id: Option<Id>, error: T) -> Self {
        Self {
            id,
            error: error.into(),
        }
    }

    pub fn get_id(&self) -> Value {
        match &self.id {
            Some(id) => serde_json::to_value(id).unwrap_or(Value::Null),
            None => Value::Null,
        }
    }

    pub fn to_json(&self) -> Value {
        json!({
            "jsonrpc": JSON_RPC_VERSION,
            "id": self.get_id(),
            "error": {
                "code": self.error.get_code(),
                "message": format!("{:#}", self.error),
            }
        })
    }
}

impl Display for RpcResponseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "RpcError[id: {}, error: {:#}]",
            self.get_id(),
            self.error
        )
    }
}

#[cfg(feature = "rpc-server")]
impl ResponseError for RpcResponseError {
    fn error_response(&self) -> HttpResponse {
        HttpResponse::Ok().json(self.to_json())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(RpcError::InvalidAmount.get_code(), -32050);
        assert_eq!(RpcError::InvalidPaymentId.get_code(), -32051);
        assert_eq!(RpcError::AlreadyVoted("k".into()).get_code(), -32052);
        assert_eq!(RpcError::SignatureFailed.get_code(), -32080);
        assert_eq!(RpcError::InvalidTransaction("x".into()).get_code(), -32090);
        assert_eq!(RpcError::Internal("x".into()).get_code(), -32603);
        assert_eq!(RpcError::InvalidParams("x").get_code(), -32602);
        assert_eq!(RpcError::AlreadyProcessed("x".into()).get_code(), -32602);
        assert_eq!(RpcError::Custom(-32060, "sale".into()).get_code(), -32060);
    }

    #[test]
    fn test_error_envelope_shape() {
        let err = RpcResponseError::new(Some(Id::Number(4)), RpcError::SignatureFailed);
        let value = err.to_json();
        assert_eq!(value["jsonrpc"], JSON_RPC_VERSION);
        assert_eq!(value["id"], 4);
        assert_eq!(value["error"]["code"], -32080);
        assert_eq!(value["error"]["message"], "Signature check failed");
    }

    #[test]
    fn test_missing_id_is_null() {
        let err = RpcResponseError::new(None, RpcError::ParseBody);
        assert_eq!(err.to_json()["id"], Value::Null);
    }
}
