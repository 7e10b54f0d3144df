//! Protocol error types and JSON-RPC error codes.

use std::fmt;
use thiserror::Error;

/// Errors raised while encoding or structurally decoding messages.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported protocol version: {0:?}")]
    UnsupportedVersion(String),

    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("invalid request id: {0}")]
    InvalidId(String),

    #[error("response carries both result and error")]
    AmbiguousResponse,

    #[error("invalid hex: {0}")]
    InvalidHex(String),

    #[error("invalid UTF-8 in decoded bytes")]
    InvalidUtf8,

    #[error("preimage must not be empty")]
    EmptyPreimage,

    #[error("malformed verification output: {0}")]
    InvalidVerification(String),
}

/// Classification of JSON-RPC error codes.
///
/// The numeric code received from the node is always preserved; this type
/// only names the reserved ranges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ParseError,
    InvalidRequest,
    MethodNotFound,
    InvalidParams,
    InternalError,
    /// Implementation-defined server error (-32099..=-32000).
    ServerError(i64),
    /// Anything outside the reserved range.
    Application(i64),
}

impl ErrorCode {
    pub fn from_code(code: i64) -> Self {
        match code {
            -32700 => ErrorCode::ParseError,
            -32600 => ErrorCode::InvalidRequest,
            -32601 => ErrorCode::MethodNotFound,
            -32602 => ErrorCode::InvalidParams,
            -32603 => ErrorCode::InternalError,
            -32099..=-32000 => ErrorCode::ServerError(code),
            other => ErrorCode::Application(other),
        }
    }

    pub fn code(&self) -> i64 {
        match self {
            ErrorCode::ParseError => -32700,
            ErrorCode::InvalidRequest => -32600,
            ErrorCode::MethodNotFound => -32601,
            ErrorCode::InvalidParams => -32602,
            ErrorCode::InternalError => -32603,
            ErrorCode::ServerError(code) | ErrorCode::Application(code) => *code,
        }
    }

    /// Returns whether retrying the same call might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorCode::InternalError | ErrorCode::ServerError(_))
    }
}

impl From<i64> for ErrorCode {
    fn from(code: i64) -> Self {
        ErrorCode::from_code(code)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCode::ParseError => write!(f, "PARSE_ERROR"),
            ErrorCode::InvalidRequest => write!(f, "INVALID_REQUEST"),
            ErrorCode::MethodNotFound => write!(f, "METHOD_NOT_FOUND"),
            ErrorCode::InvalidParams => write!(f, "INVALID_PARAMS"),
            ErrorCode::InternalError => write!(f, "INTERNAL_ERROR"),
            ErrorCode::ServerError(code) => write!(f, "SERVER_ERROR({})", code),
            ErrorCode::Application(code) => write!(f, "APPLICATION_ERROR({})", code),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_classification() {
        assert_eq!(ErrorCode::from_code(-32700), ErrorCode::ParseError);
        assert_eq!(ErrorCode::from_code(-32601), ErrorCode::MethodNotFound);
        assert_eq!(ErrorCode::from_code(-32050), ErrorCode::ServerError(-32050));
        assert_eq!(ErrorCode::from_code(-32000), ErrorCode::ServerError(-32000));
        assert_eq!(ErrorCode::from_code(-32100), ErrorCode::Application(-32100));
        assert_eq!(ErrorCode::from_code(7), ErrorCode::Application(7));
    }

    #[test]
    fn test_error_code_preserves_number() {
        for code in [-32700, -32600, -32601, -32602, -32603, -32001, 42] {
            assert_eq!(ErrorCode::from(code).code(), code);
        }
    }

    #[test]
    fn test_error_code_retryable() {
        assert!(ErrorCode::InternalError.is_retryable());
        assert!(ErrorCode::ServerError(-32001).is_retryable());

        assert!(!ErrorCode::ParseError.is_retryable());
        assert!(!ErrorCode::MethodNotFound.is_retryable());
        assert!(!ErrorCode::InvalidParams.is_retryable());
        assert!(!ErrorCode::Application(1).is_retryable());
    }

    #[test]
    fn test_error_code_display() {
        assert_eq!(ErrorCode::MethodNotFound.to_string(), "METHOD_NOT_FOUND");
        assert_eq!(
            ErrorCode::ServerError(-32010).to_string(),
            "SERVER_ERROR(-32010)"
        );
    }

    #[test]
    fn test_protocol_error_display() {
        let err = ProtocolError::UnsupportedVersion("1.0".into());
        assert!(err.to_string().contains("1.0"));

        let err = ProtocolError::MissingField("id");
        assert!(err.to_string().contains("id"));

        let err = ProtocolError::InvalidHex("zz".into());
        assert!(err.to_string().contains("zz"));
    }
}
