use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::RpcError;

pub const JSON_RPC_VERSION: &str = "2.0";

/// JSON-RPC request id: a number or a string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Id {
    Number(u64),
    String(String),
}

/// Inbound JSON-RPC 2.0 request envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct RpcRequest {
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Option<Id>,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

impl RpcRequest {
    /// Parse and validate the envelope of an inbound body.
    pub fn parse(body: &[u8]) -> Result<Self, RpcError> {
        let request: RpcRequest =
            serde_json::from_slice(body).map_err(|_| RpcError::ParseBody)?;
        if request.jsonrpc != JSON_RPC_VERSION {
            return Err(RpcError::InvalidRequest("expected json_rpc set to '2.0'"));
        }
        Ok(request)
    }

    /// Deserialize the params into the expected shape.
    pub fn params<T: serde::de::DeserializeOwned>(&self) -> Result<T, RpcError> {
        serde_json::from_value(self.params.clone()).map_err(RpcError::InvalidJsonParams)
    }
}

/// Build the JSON-RPC result envelope for a request id.
pub fn result_response(id: Option<&Id>, result: Value) -> Value {
    json!({
        "jsonrpc": JSON_RPC_VERSION,
        "id": id.map(|id| serde_json::to_value(id).unwrap_or(Value::Null)).unwrap_or(Value::Null),
        "result": result,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_request() {
        let body = br#"{"jsonrpc":"2.0","id":1,"method":"multicast","params":{"data":"aGk="}}"#;
        let request = RpcRequest::parse(body).unwrap();
        assert_eq!(request.method, "multicast");
        assert_eq!(request.id, Some(Id::Number(1)));
        assert_eq!(request.params["data"], "aGk=");
    }

    #[test]
    fn test_parse_rejects_bad_version() {
        let body = br#"{"jsonrpc":"1.0","id":1,"method":"multicast"}"#;
        assert!(matches!(
            RpcRequest::parse(body),
            Err(RpcError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(
            RpcRequest::parse(b"not json"),
            Err(RpcError::ParseBody)
        ));
    }

    #[test]
    fn test_result_response_shape() {
        let value = result_response(Some(&Id::String("abc".into())), json!({"result": 0}));
        assert_eq!(value["jsonrpc"], "2.0");
        assert_eq!(value["id"], "abc");
        assert_eq!(value["result"]["result"], 0);
    }

    #[test]
    fn test_result_response_null_id() {
        assert_eq!(result_response(None, json!(0))["id"], Value::Null);
    }
}
