//! # jamrpc-client
//!
//! Client library for PolkaJam nodes.
//!
//! This crate provides:
//! - One persistent WebSocket connection per client, opened lazily and shared
//!   by concurrent callers
//! - Request/response correlation with per-call timeouts
//! - A `jamt` subprocess backend behind the same `RpcBackend` contract
//! - An in-memory transport for tests
//! - Optional TLS support for `wss://` endpoints

pub mod client;
pub mod config;
pub mod connection;
pub mod correlator;
pub mod error;
pub mod jamt;
pub mod memory;
pub mod tls;
pub mod transport;
pub mod websocket;

pub use client::{connect_backend, RpcBackend, RpcClient};
pub use config::{Backend, ClientConfig, ConfigError};
pub use connection::{Connection, ConnectionConfig, ConnectionState, TlsClientConfig};
pub use correlator::{Correlator, ResponseHandle};
pub use error::ClientError;
pub use jamt::{parse_service_info, parse_submission, JamtClient, ServiceInfo, Submission};
pub use memory::{MemoryConnector, MemoryListener, MemoryPeer};
pub use transport::{Connector, FrameHandler, Transport};
pub use websocket::WsConnector;
