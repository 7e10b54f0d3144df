//! JSON-RPC 2.0 message types.

use crate::error::{ErrorCode, ProtocolError};
use crate::JSONRPC_VERSION;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};

/// Request identifier used for correlation.
pub type RequestId = u64;

/// An outbound call. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundCall {
    jsonrpc: String,
    id: RequestId,
    method: String,
    #[serde(default)]
    params: Vec<Value>,
}

impl OutboundCall {
    pub fn new(id: RequestId, method: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            method: method.into(),
            params,
        }
    }

    pub fn id(&self) -> RequestId {
        self.id
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn params(&self) -> &[Value] {
        &self.params
    }

    pub fn version(&self) -> &str {
        &self.jsonrpc
    }
}

/// Error object carried by a failed response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcErrorObject {
    /// Numeric JSON-RPC error code.
    pub code: i64,

    /// Human-readable message.
    pub message: String,

    /// Optional structured details.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcErrorObject {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn error_code(&self) -> ErrorCode {
        ErrorCode::from_code(self.code)
    }
}

/// A decoded inbound response, always tagged with the id it answers.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    Result { id: RequestId, result: Value },
    Error { id: RequestId, error: RpcErrorObject },
}

impl InboundMessage {
    pub fn ok(id: RequestId, result: Value) -> Self {
        InboundMessage::Result { id, result }
    }

    pub fn error(id: RequestId, error: RpcErrorObject) -> Self {
        InboundMessage::Error { id, error }
    }

    pub fn id(&self) -> RequestId {
        match self {
            InboundMessage::Result { id, .. } | InboundMessage::Error { id, .. } => *id,
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, InboundMessage::Result { .. })
    }

    pub fn is_error(&self) -> bool {
        !self.is_ok()
    }

    /// Consumes the message, yielding the result payload or the error object.
    pub fn into_result(self) -> Result<Value, RpcErrorObject> {
        match self {
            InboundMessage::Result { result, .. } => Ok(result),
            InboundMessage::Error { error, .. } => Err(error),
        }
    }

    /// Renders the message in wire form.
    pub fn to_value(&self) -> Value {
        match self {
            InboundMessage::Result { id, result } => json!({
                "jsonrpc": JSONRPC_VERSION,
                "id": id,
                "result": result,
            }),
            InboundMessage::Error { id, error } => json!({
                "jsonrpc": JSONRPC_VERSION,
                "id": id,
                "error": error,
            }),
        }
    }

    /// Structurally validates a raw response envelope.
    pub(crate) fn from_envelope(envelope: ResponseEnvelope) -> Result<Self, ProtocolError> {
        match envelope.jsonrpc.as_deref() {
            Some(JSONRPC_VERSION) => {}
            Some(other) => return Err(ProtocolError::UnsupportedVersion(other.to_string())),
            None => return Err(ProtocolError::MissingField("jsonrpc")),
        }

        let id = match envelope.id {
            None | Some(Value::Null) => return Err(ProtocolError::MissingField("id")),
            Some(value) => value
                .as_u64()
                .ok_or_else(|| ProtocolError::InvalidId(value.to_string()))?,
        };

        match (envelope.result, envelope.error) {
            (Some(result), None) => Ok(InboundMessage::Result { id, result }),
            (None, Some(error)) => Ok(InboundMessage::Error { id, error }),
            (Some(_), Some(_)) => Err(ProtocolError::AmbiguousResponse),
            (None, None) => Err(ProtocolError::MissingField("result")),
        }
    }
}

/// Loosely typed response envelope; validated by [`InboundMessage::from_envelope`].
#[derive(Debug, Deserialize)]
pub(crate) struct ResponseEnvelope {
    #[serde(default)]
    pub jsonrpc: Option<String>,

    #[serde(default)]
    pub id: Option<Value>,

    /// `Some(Value::Null)` when the field is present but null.
    #[serde(default, deserialize_with = "present")]
    pub result: Option<Value>,

    #[serde(default)]
    pub error: Option<RpcErrorObject>,
}

fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}
