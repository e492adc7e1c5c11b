//! JSON-RPC message shapes exchanged with the language server

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// JSON-RPC error code for methods the client does not implement
pub const METHOD_NOT_FOUND: i64 = -32601;

/// Request identifier, either numeric or string
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(i64),
    String(String),
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestId::Number(n) => write!(f, "{}", n),
            RequestId::String(s) => write!(f, "{:?}", s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnyRequest {
    pub id: RequestId,
    pub method: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub params: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnyNotification {
    pub method: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub params: Value,
}

impl AnyNotification {
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self {
            method: method.into(),
            params,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnyResponse {
    pub id: RequestId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ResponseError>,
}

/// Error object carried by a failed response
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[error("{message} (code {code})")]
pub struct ResponseError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ResponseError {
    pub fn method_not_found(method: &str) -> Self {
        Self {
            code: METHOD_NOT_FOUND,
            message: format!("method not found: {}", method),
            data: None,
        }
    }
}

/// A decoded inbound message
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Response(AnyResponse),
    Notification(AnyNotification),
    Request(AnyRequest),
}

impl Inbound {
    /// Classifies a raw JSON-RPC object by the presence of `id` and `method`.
    pub fn classify(msg: Value) -> Result<Self, serde_json::Error> {
        let has_id = msg.get("id").is_some_and(|id| !id.is_null());
        let has_method = msg.get("method").is_some();

        match (has_id, has_method) {
            (true, true) => serde_json::from_value(msg).map(Inbound::Request),
            (false, true) => serde_json::from_value(msg).map(Inbound::Notification),
            _ => serde_json::from_value(msg).map(Inbound::Response),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn classify_detects_response() {
        let msg = json!({"jsonrpc": "2.0", "id": 3, "result": {"ok": true}});

        let inbound = Inbound::classify(msg).unwrap();

        assert_eq!(
            inbound,
            Inbound::Response(AnyResponse {
                id: RequestId::Number(3),
                result: Some(json!({"ok": true})),
                error: None,
            })
        );
    }

    #[test]
    fn classify_detects_notification_without_params() {
        let msg = json!({"jsonrpc": "2.0", "method": "$/futureFeature"});

        let inbound = Inbound::classify(msg).unwrap();

        assert_eq!(
            inbound,
            Inbound::Notification(AnyNotification::new("$/futureFeature", Value::Null))
        );
    }

    #[test]
    fn classify_detects_server_request_with_string_id() {
        let msg = json!({
            "jsonrpc": "2.0",
            "id": "abc",
            "method": "workspace/configuration",
            "params": {"items": []}
        });

        let Inbound::Request(req) = Inbound::classify(msg).unwrap() else {
            panic!("expected a request");
        };

        assert_eq!(req.id, RequestId::String("abc".to_string()));
        assert_eq!(req.method, "workspace/configuration");
    }

    #[test]
    fn classify_reads_error_responses() {
        let msg = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "error": {"code": -32601, "message": "nope"}
        });

        let Inbound::Response(resp) = Inbound::classify(msg).unwrap() else {
            panic!("expected a response");
        };

        let error = resp.error.unwrap();
        assert_eq!(error.code, METHOD_NOT_FOUND);
        assert_eq!(error.to_string(), "nope (code -32601)");
    }
}
