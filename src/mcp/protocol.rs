//! JSON-RPC 2.0 envelopes exchanged with a tool server.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::McpezError;

pub const JSONRPC_VERSION: &str = "2.0";
pub const PROTOCOL_VERSION: &str = "2024-11-05";

pub mod method {
    pub const INITIALIZE: &str = "initialize";
    pub const INITIALIZED: &str = "notifications/initialized";
    pub const TOOLS_LIST: &str = "tools/list";
    pub const TOOLS_CALL: &str = "tools/call";
}

/// Outgoing request, or a notification when `id` is absent.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct JsonRpcRequest {
    pub jsonrpc: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub method: String,
    pub params: Value,
}

impl JsonRpcRequest {
    pub fn request(id: u64, method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id: Some(id),
            method: method.into(),
            params,
        }
    }

    pub fn notification(method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id: None,
            method: method.into(),
            params,
        }
    }
}

/// Error member of a response.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default)]
    pub data: Option<Value>,
}

impl From<JsonRpcError> for McpezError {
    fn from(error: JsonRpcError) -> Self {
        McpezError::Protocol(format!("JSON-RPC error {}: {}", error.code, error.message))
    }
}

/// Incoming response delivered on the push connection.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct JsonRpcResponse {
    #[serde(default)]
    pub jsonrpc: Option<String>,
    #[serde(default)]
    pub id: Value,
    #[serde(default, deserialize_with = "present")]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    /// Numeric request id, accepting ids echoed back as strings.
    pub fn request_id(&self) -> Option<u64> {
        match &self.id {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// The result payload, or the error member as a protocol error. An
    /// envelope with neither, or with a foreign `jsonrpc` version, is
    /// malformed.
    pub fn into_result(self) -> Result<Value, McpezError> {
        if let Some(version) = self.jsonrpc.as_deref().filter(|v| *v != JSONRPC_VERSION) {
            return Err(McpezError::Protocol(format!("unsupported jsonrpc version {version}")));
        }
        match (self.error, self.result) {
            (Some(error), _) => Err(error.into()),
            (None, Some(result)) => Ok(result),
            (None, None) => Err(McpezError::Protocol("response has neither result nor error".into())),
        }
    }
}

/// A member that is present is `Some`, even when it is `null`.
fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

/// `initialize` params announcing this client.
pub fn initialize_params(client_name: &str, client_version: &str) -> Value {
    serde_json::json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": {},
        "clientInfo": { "name": client_name, "version": client_version },
    })
}
