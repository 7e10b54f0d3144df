//! High-level client API.

use crate::config::{Backend, ClientConfig};
use crate::connection::{Connection, ConnectionConfig, ConnectionState};
use crate::correlator::{Correlator, ResponseHandle};
use crate::error::ClientError;
use crate::jamt::JamtClient;
use crate::transport::Connector;
use crate::websocket::WsConnector;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Caller-facing contract shared by every backend.
#[async_trait]
pub trait RpcBackend: Send + Sync {
    /// Calls `method` and waits at most `timeout` for the outcome.
    async fn call(
        &self,
        method: &str,
        params: Vec<Value>,
        timeout: Duration,
    ) -> Result<Value, ClientError>;

    /// Timeout applied by [`RpcBackend::call_default`].
    fn default_timeout(&self) -> Duration;

    async fn call_default(&self, method: &str, params: Vec<Value>) -> Result<Value, ClientError> {
        self.call(method, params, self.default_timeout()).await
    }

    async fn ensure_connected(&self) -> Result<(), ClientError>;

    async fn disconnect(&self);

    fn is_connected(&self) -> bool;

    /// Endpoint description for logs and banners.
    fn endpoint(&self) -> String;
}

/// JSON-RPC client over a persistent connection.
pub struct RpcClient {
    conn: Connection,
    correlator: Arc<Correlator>,
    request_timeout: Duration,
    endpoint: String,
}

impl RpcClient {
    /// Creates a WebSocket client. Validates the URL; does not connect.
    pub fn new(config: ConnectionConfig) -> Result<Self, ClientError> {
        let connector = WsConnector::new(&config)?;
        Ok(Self::with_connector(config, Arc::new(connector)))
    }

    /// Creates a client over an arbitrary connector.
    pub fn with_connector(config: ConnectionConfig, connector: Arc<dyn Connector>) -> Self {
        let correlator = Arc::new(Correlator::new());
        let endpoint = connector.endpoint();
        let conn = Connection::new(&config, connector, correlator.clone());
        Self {
            conn,
            correlator,
            request_timeout: config.request_timeout,
            endpoint,
        }
    }

    /// Issues a call without waiting for its outcome.
    pub async fn issue(&self, method: &str, params: Vec<Value>, timeout: Duration) -> ResponseHandle {
        self.correlator
            .issue(&self.conn, method, params, timeout)
            .await
    }

    pub fn state(&self) -> ConnectionState {
        self.conn.state()
    }

    /// Number of calls waiting for a response.
    pub fn pending_count(&self) -> usize {
        self.correlator.pending_count()
    }
}

#[async_trait]
impl RpcBackend for RpcClient {
    async fn call(
        &self,
        method: &str,
        params: Vec<Value>,
        timeout: Duration,
    ) -> Result<Value, ClientError> {
        self.correlator
            .call(&self.conn, method, params, timeout)
            .await
    }

    fn default_timeout(&self) -> Duration {
        self.request_timeout
    }

    async fn ensure_connected(&self) -> Result<(), ClientError> {
        self.conn.ensure_connected().await
    }

    async fn disconnect(&self) {
        self.conn.disconnect().await
    }

    fn is_connected(&self) -> bool {
        self.conn.is_connected()
    }

    fn endpoint(&self) -> String {
        self.endpoint.clone()
    }
}

/// Builds the backend selected by `config`.
pub fn connect_backend(config: &ClientConfig) -> Result<Box<dyn RpcBackend>, ClientError> {
    match config.backend {
        Backend::Rpc => {
            let client = RpcClient::new(config.to_connection_config())?;
            tracing::debug!("Using JSON-RPC backend at {}", client.endpoint());
            Ok(Box::new(client))
        }
        Backend::Jamt => {
            let client =
                JamtClient::new(config.jamt_path.clone()).with_timeout(config.request_timeout());
            tracing::debug!("Using jamt backend at {}", client.path().display());
            Ok(Box::new(client))
        }
    }
}
