//! Encoder and decoder for JSON-RPC text frames.
//!
//! Frames are delimited by the transport (one WebSocket text message per
//! JSON document), so encoding is plain serialization and decoding is a
//! structural check on top of `serde_json`.

use crate::error::ProtocolError;
use crate::message::{InboundMessage, OutboundCall, ResponseEnvelope};

/// Encodes messages into text frames.
pub struct Encoder;

impl Encoder {
    /// Encodes an outbound call.
    pub fn encode_call(call: &OutboundCall) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(call)?)
    }

    /// Encodes an inbound message (used by peers and test servers).
    pub fn encode_message(message: &InboundMessage) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(&message.to_value())?)
    }
}

/// Decodes text frames into messages.
pub struct Decoder;

impl Decoder {
    /// Decodes an inbound response frame.
    ///
    /// Fails for anything that cannot be attributed to a request: invalid
    /// JSON, a wrong version tag, a missing or non-numeric id (including
    /// notifications), or an envelope with neither or both of
    /// `result`/`error`.
    pub fn decode_message(frame: &str) -> Result<InboundMessage, ProtocolError> {
        let envelope: ResponseEnvelope = serde_json::from_str(frame)?;
        InboundMessage::from_envelope(envelope)
    }

    /// Decodes an outbound call frame (the peer side of the protocol).
    pub fn decode_call(frame: &str) -> Result<OutboundCall, ProtocolError> {
        let call: OutboundCall = serde_json::from_str(frame)?;
        if call.version() != crate::JSONRPC_VERSION {
            return Err(ProtocolError::UnsupportedVersion(call.version().to_string()));
        }
        Ok(call)
    }
}
