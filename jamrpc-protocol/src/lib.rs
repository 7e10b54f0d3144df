//! # jamrpc-protocol
//!
//! Wire protocol for talking to a PolkaJam node over JSON-RPC 2.0.
//!
//! This crate provides:
//! - Outbound call and inbound response message types
//! - Text-frame encoding and structural decoding
//! - JSON-RPC error code classification
//! - Hex helpers used by the tooling for storage keys and payloads
//! - Blake2s-256 hash-verification payloads

pub mod codec;
pub mod encoding;
pub mod error;
pub mod message;
pub mod verify;

pub use codec::{Decoder, Encoder};
pub use error::{ErrorCode, ProtocolError};
pub use message::{InboundMessage, OutboundCall, RequestId, RpcErrorObject};
pub use verify::{HashVerifyPayload, Verification};

/// JSON-RPC protocol version tag carried by every message.
pub const JSONRPC_VERSION: &str = "2.0";

/// Default node endpoint (polkajam-testnet node0).
pub const DEFAULT_RPC_URL: &str = "ws://localhost:19800";

/// Default per-call timeout in milliseconds.
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;
