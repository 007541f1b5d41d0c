//! JSON-RPC 2.0 message types.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use tether_core::{TetherError, TetherResult};

/// The only protocol version this crate speaks.
pub const JSONRPC_VERSION: &str = "2.0";

/// Standard JSON-RPC 2.0 error codes.
pub mod error_codes {
    /// Invalid JSON was received.
    pub const PARSE_ERROR: i64 = -32700;
    /// The JSON sent is not a valid request object.
    pub const INVALID_REQUEST: i64 = -32600;
    /// The method does not exist or is not available.
    pub const METHOD_NOT_FOUND: i64 = -32601;
    /// Invalid method parameters.
    pub const INVALID_PARAMS: i64 = -32602;
    /// Internal JSON-RPC error.
    pub const INTERNAL_ERROR: i64 = -32603;
}

static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// Allocate a request id from the process-wide counter.
///
/// Ids strictly increase for the lifetime of the process, so no two
/// outstanding requests on any transport share an id.
pub fn next_request_id() -> u64 {
    NEXT_REQUEST_ID.fetch_add(1, Ordering::SeqCst)
}

/// JSON-RPC 2.0 request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    /// Always `"2.0"`.
    pub jsonrpc: String,
    /// Correlation id.
    pub id: u64,
    /// Method name.
    pub method: String,
    /// Method parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    /// Build a request with an explicit id.
    pub fn new(id: u64, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            method: method.into(),
            params,
        }
    }

    /// Build a request with a freshly allocated id.
    pub fn with_next_id(method: impl Into<String>, params: Option<Value>) -> Self {
        Self::new(next_request_id(), method, params)
    }
}

/// JSON-RPC 2.0 notification (a request without an id).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    /// Always `"2.0"`.
    pub jsonrpc: String,
    /// Method name.
    pub method: String,
    /// Notification parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcNotification {
    /// Build a notification.
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params,
        }
    }
}

/// JSON-RPC 2.0 error object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    /// Error code.
    pub code: i64,
    /// Short description.
    pub message: String,
    /// Additional server-defined data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    /// Build an error object without data.
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }
}

impl From<JsonRpcError> for TetherError {
    fn from(err: JsonRpcError) -> Self {
        TetherError::Rpc {
            code: err.code,
            message: err.message,
        }
    }
}

/// Outcome carried by a response: exactly one of `result` or `error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponsePayload {
    /// Successful result.
    Result(Value),
    /// Error object.
    Error(JsonRpcError),
}

/// JSON-RPC 2.0 response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JsonRpcResponse {
    /// Always `"2.0"`.
    pub jsonrpc: String,
    /// Id of the request this answers. `None` only for errors about
    /// requests whose id could not be read.
    pub id: Option<u64>,
    /// Result or error.
    #[serde(flatten)]
    pub payload: ResponsePayload,
}

impl JsonRpcResponse {
    /// Build a successful response.
    pub fn success(id: u64, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: Some(id),
            payload: ResponsePayload::Result(result),
        }
    }

    /// Build an error response.
    pub fn error(id: Option<u64>, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            payload: ResponsePayload::Error(error),
        }
    }

    /// Whether this response carries an error object.
    pub fn is_error(&self) -> bool {
        matches!(self.payload, ResponsePayload::Error(_))
    }

    /// Convert into the result value, or the server's error as [`TetherError::Rpc`].
    pub fn into_result(self) -> TetherResult<Value> {
        match self.payload {
            ResponsePayload::Result(value) => Ok(value),
            ResponsePayload::Error(err) => Err(err.into()),
        }
    }
}

/// Any JSON-RPC 2.0 message, discriminated by which fields are present.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum JsonRpcMessage {
    /// `method` + `id`.
    Request(JsonRpcRequest),
    /// `method` without `id`.
    Notification(JsonRpcNotification),
    /// `id` + `result` or `error`, without `method`.
    Response(JsonRpcResponse),
}

impl JsonRpcMessage {
    /// Classify a decoded JSON value.
    ///
    /// Fails with an `INVALID_REQUEST` protocol error when the value is not
    /// an object, has the wrong `jsonrpc` version, or matches none of the
    /// three shapes.
    pub fn from_value(value: Value) -> TetherResult<Self> {
        let Value::Object(mut obj) = value else {
            return Err(invalid("message is not a JSON object"));
        };

        match obj.get("jsonrpc").and_then(Value::as_str) {
            Some(JSONRPC_VERSION) => {}
            Some(other) => return Err(invalid(format!("unsupported jsonrpc version '{other}'"))),
            None => return Err(invalid("missing 'jsonrpc' field")),
        }

        let has_method = obj.contains_key("method");
        let has_id = obj.get("id").is_some_and(|id| !id.is_null());
        let params = obj.remove("params").filter(|p| !p.is_null());

        if has_method {
            let method = match obj.remove("method") {
                Some(Value::String(m)) => m,
                _ => return Err(invalid("'method' must be a string")),
            };
            if has_id {
                let id = read_id(obj.get("id"))?
                    .ok_or_else(|| invalid("request id must be present"))?;
                return Ok(Self::Request(JsonRpcRequest::new(id, method, params)));
            }
            return Ok(Self::Notification(JsonRpcNotification::new(method, params)));
        }

        let id = read_id(obj.get("id"))?;
        let payload = match (obj.remove("result"), obj.remove("error")) {
            (Some(_), Some(_)) => {
                return Err(invalid("response carries both 'result' and 'error'"));
            }
            (Some(result), None) => ResponsePayload::Result(result),
            (None, Some(error)) => ResponsePayload::Error(
                serde_json::from_value(error)
                    .map_err(|e| invalid(format!("malformed error object: {e}")))?,
            ),
            (None, None) => return Err(invalid("message has neither 'method' nor 'result'/'error'")),
        };
        if id.is_none() && !matches!(payload, ResponsePayload::Error(_)) {
            return Err(invalid("successful response without id"));
        }

        Ok(Self::Response(JsonRpcResponse {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            payload,
        }))
    }

    /// The method name, for requests and notifications.
    pub fn method(&self) -> Option<&str> {
        match self {
            Self::Request(r) => Some(&r.method),
            Self::Notification(n) => Some(&n.method),
            Self::Response(_) => None,
        }
    }

    /// The correlation id, for requests and responses.
    pub fn id(&self) -> Option<u64> {
        match self {
            Self::Request(r) => Some(r.id),
            Self::Notification(_) => None,
            Self::Response(r) => r.id,
        }
    }
}

impl<'de> Deserialize<'de> for JsonRpcMessage {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_value(value).map_err(serde::de::Error::custom)
    }
}

impl From<JsonRpcRequest> for JsonRpcMessage {
    fn from(r: JsonRpcRequest) -> Self {
        Self::Request(r)
    }
}

impl From<JsonRpcNotification> for JsonRpcMessage {
    fn from(n: JsonRpcNotification) -> Self {
        Self::Notification(n)
    }
}

impl From<JsonRpcResponse> for JsonRpcMessage {
    fn from(r: JsonRpcResponse) -> Self {
        Self::Response(r)
    }
}

fn read_id(id: Option<&Value>) -> TetherResult<Option<u64>> {
    match id {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_u64()
            .map(Some)
            .ok_or_else(|| invalid(format!("id must be a non-negative integer, got {v}"))),
    }
}

fn invalid(message: impl Into<String>) -> TetherError {
    TetherError::Protocol {
        code: error_codes::INVALID_REQUEST,
        message: message.into(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_serialization() {
        let req = JsonRpcRequest::new(1, "test/method", Some(json!({"key": "value"})));
        let parsed: Value = serde_json::to_value(&req).unwrap();
        assert_eq!(parsed["jsonrpc"], "2.0");
        assert_eq!(parsed["id"], 1);
        assert_eq!(parsed["method"], "test/method");
        assert_eq!(parsed["params"]["key"], "value");
    }

    #[test]
    fn test_request_no_params() {
        let req = JsonRpcRequest::new(2, "tools/list", None);
        let parsed = serde_json::to_value(&req).unwrap();
        assert!(parsed.get("params").is_none());
    }

    #[test]
    fn test_response_serializes_exactly_one_of_result_or_error() {
        let ok = serde_json::to_value(JsonRpcResponse::success(3, json!({"a": 1}))).unwrap();
        assert_eq!(ok["result"]["a"], 1);
        assert!(ok.get("error").is_none());

        let err = serde_json::to_value(JsonRpcResponse::error(
            Some(4),
            JsonRpcError::new(error_codes::METHOD_NOT_FOUND, "nope"),
        ))
        .unwrap();
        assert_eq!(err["error"]["code"], -32601);
        assert!(err.get("result").is_none());
    }

    #[test]
    fn test_null_result_is_kept_on_the_wire() {
        let v = serde_json::to_value(JsonRpcResponse::success(5, Value::Null)).unwrap();
        assert!(v.as_object().unwrap().contains_key("result"));
    }

    #[test]
    fn test_discriminates_notification() {
        let msg: JsonRpcMessage =
            serde_json::from_str(r#"{"jsonrpc":"2.0","method":"notifications/progress"}"#).unwrap();
        assert!(matches!(msg, JsonRpcMessage::Notification(_)));
        assert_eq!(msg.method(), Some("notifications/progress"));
        assert_eq!(msg.id(), None);
    }

    #[test]
    fn test_discriminates_request() {
        let msg: JsonRpcMessage =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":9,"method":"roots/list","params":{}}"#)
                .unwrap();
        assert!(matches!(msg, JsonRpcMessage::Request(ref r) if r.id == 9));
    }

    #[test]
    fn test_discriminates_response() {
        let msg: JsonRpcMessage =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":1,"result":{"tools":[]}}"#).unwrap();
        let JsonRpcMessage::Response(resp) = msg else {
            panic!("expected response");
        };
        assert_eq!(resp.id, Some(1));
        assert!(!resp.is_error());
    }

    #[test]
    fn test_error_response_into_result() {
        let json =
            r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32600,"message":"Invalid request"}}"#;
        let JsonRpcMessage::Response(resp) = serde_json::from_str(json).unwrap() else {
            panic!("expected response");
        };
        match resp.into_result() {
            Err(TetherError::Rpc { code, message }) => {
                assert_eq!(code, error_codes::INVALID_REQUEST);
                assert_eq!(message, "Invalid request");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_rejects_wrong_version() {
        let err = JsonRpcMessage::from_value(json!({"jsonrpc":"1.0","method":"x"})).unwrap_err();
        assert!(matches!(err, TetherError::Protocol { code: error_codes::INVALID_REQUEST, .. }));
    }

    #[test]
    fn test_rejects_shapeless_message() {
        assert!(JsonRpcMessage::from_value(json!({"jsonrpc":"2.0","id":1})).is_err());
        assert!(JsonRpcMessage::from_value(json!([1, 2])).is_err());
        assert!(JsonRpcMessage::from_value(
            json!({"jsonrpc":"2.0","id":1,"result":1,"error":{"code":1,"message":"x"}})
        )
        .is_err());
    }

    #[test]
    fn test_ids_strictly_increase() {
        let ids: Vec<u64> = (0..100).map(|_| next_request_id()).collect();
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_ids_unique_across_threads() {
        let handles: Vec<_> = (0..4)
            .map(|_| std::thread::spawn(|| (0..250).map(|_| next_request_id()).collect::<Vec<_>>()))
            .collect();
        let mut all: Vec<u64> = handles.into_iter().flat_map(|h| h.join().unwrap()).collect();
        let len = all.len();
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), len);
    }
}
