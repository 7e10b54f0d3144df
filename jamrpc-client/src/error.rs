//! Client error types.

use jamrpc_protocol::{ErrorCode, RpcErrorObject};
use serde_json::Value;
use thiserror::Error;

/// Client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("not connected")]
    NotConnected,

    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    #[error("request timeout: {0}")]
    RequestTimeout(String),

    #[error("remote error: {code} - {message}")]
    RemoteError {
        code: i64,
        message: String,
        data: Option<Value>,
    },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("protocol error: {0}")]
    Protocol(#[from] jamrpc_protocol::ProtocolError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid endpoint URL: {0}")]
    InvalidUrl(String),

    #[error("TLS configuration error: {0}")]
    TlsConfig(String),
}

impl ClientError {
    /// Returns whether this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::ConnectionFailed(_) => true,
            ClientError::ConnectionClosed(_) => true,
            ClientError::RequestTimeout(_) => true,
            ClientError::Transport(_) => true,
            ClientError::Io(_) => true,
            ClientError::RemoteError { code, .. } => ErrorCode::from_code(*code).is_retryable(),
            _ => false,
        }
    }

    /// Returns the JSON-RPC error code class for remote errors.
    pub fn remote_code(&self) -> Option<ErrorCode> {
        match self {
            ClientError::RemoteError { code, .. } => Some(ErrorCode::from_code(*code)),
            _ => None,
        }
    }
}

impl From<RpcErrorObject> for ClientError {
    fn from(err: RpcErrorObject) -> Self {
        ClientError::RemoteError {
            code: err.code,
            message: err.message,
            data: err.data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_error_from_object() {
        let err: ClientError = RpcErrorObject::new(-32601, "Method not found").into();
        assert!(matches!(
            err,
            ClientError::RemoteError { code: -32601, ref message, data: None } if message == "Method not found"
        ));
        assert_eq!(err.remote_code(), Some(ErrorCode::MethodNotFound));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_retryable() {
        assert!(ClientError::ConnectionClosed("eof".into()).is_retryable());
        assert!(ClientError::RequestTimeout("ping".into()).is_retryable());
        assert!(ClientError::ConnectionFailed("refused".into()).is_retryable());
        assert!(!ClientError::NotConnected.is_retryable());
        assert!(ClientError::from(RpcErrorObject::new(-32603, "oops")).is_retryable());
    }

    #[test]
    fn test_display_names_method() {
        let err = ClientError::RequestTimeout("ping".into());
        assert_eq!(err.to_string(), "request timeout: ping");
    }
}
