//! Hex helpers for storage keys, payloads and service ids.
//!
//! JAM tooling passes byte strings as `0x`-prefixed lowercase hex. Service
//! ids are hex too, but `jamt` expects them without the prefix.

use crate::error::ProtocolError;

const HEX_PREFIX: &str = "0x";

fn strip_prefix(hex: &str) -> &str {
    hex.strip_prefix(HEX_PREFIX).unwrap_or(hex)
}

/// Encodes a UTF-8 string as `0x`-prefixed hex.
pub fn string_to_hex(s: &str) -> String {
    bytes_to_hex(s.as_bytes())
}

/// Encodes bytes as `0x`-prefixed hex.
pub fn bytes_to_hex(bytes: &[u8]) -> String {
    format!("{}{}", HEX_PREFIX, hex::encode(bytes))
}

/// Decodes hex (with or without the prefix) into bytes.
pub fn hex_to_bytes(hex: &str) -> Result<Vec<u8>, ProtocolError> {
    hex::decode(strip_prefix(hex)).map_err(|e| ProtocolError::InvalidHex(format!("{}: {}", hex, e)))
}

/// Decodes hex (with or without the prefix) into a UTF-8 string.
pub fn hex_to_string(hex: &str) -> Result<String, ProtocolError> {
    let bytes = hex_to_bytes(hex)?;
    String::from_utf8(bytes).map_err(|_| ProtocolError::InvalidUtf8)
}

/// Returns `value` unchanged if it is already `0x`-prefixed, otherwise its UTF-8 hex.
pub fn ensure_hex(value: &str) -> String {
    if value.starts_with(HEX_PREFIX) {
        value.to_string()
    } else {
        string_to_hex(value)
    }
}

/// Normalizes a service id to the unprefixed form `jamt` expects.
pub fn parse_service_id(id: &str) -> &str {
    strip_prefix(id)
}
