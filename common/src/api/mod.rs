//! Wire types exchanged between supernodes, the communication layer and the
//! ledger, plus the base64-JSON nesting used for envelope `data` fields.

mod comm;
mod ledger;
mod rta;

pub use comm::*;
pub use ledger::*;
pub use rta::*;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PayloadError {
    #[error("Invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("Invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),
}

/// Serialize an inner payload to JSON and wrap it in base64, the form every
/// envelope carries in its `data` field.
pub fn encode_payload<T: Serialize>(payload: &T) -> Result<String, PayloadError> {
    let json = serde_json::to_vec(payload)?;
    Ok(BASE64.encode(json))
}

/// Reverse of [`encode_payload`].
pub fn decode_payload<T: DeserializeOwned>(data: &str) -> Result<T, PayloadError> {
    let json = BASE64.decode(data)?;
    Ok(serde_json::from_slice(&json)?)
}
