//! Connection management.
//!
//! A `Connection` owns at most one live transport and moves through
//! `Disconnected → Connecting → Connected → Disconnected`. Concurrent
//! callers of [`Connection::ensure_connected`] share a single connect
//! attempt. Inbound frames and closure are reported to a [`FrameHandler`].

use crate::error::ClientError;
use crate::transport::{Connector, FrameHandler, FrameSink, FrameStream, Transport};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Mutex as AsyncMutex};
use tokio::task::JoinHandle;

/// Default connect timeout (10 s).
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default per-call timeout (30 s).
pub const DEFAULT_REQUEST_TIMEOUT: Duration =
    Duration::from_millis(jamrpc_protocol::DEFAULT_REQUEST_TIMEOUT_MS);

/// Reason reported to pending requests on an explicit disconnect.
pub const DISCONNECT_REASON: &str = "client disconnected";

/// TLS configuration for `wss://` endpoints.
#[derive(Debug, Clone, Default)]
pub struct TlsClientConfig {
    /// Path to PEM-encoded CA certificate(s) for server verification.
    /// If None, the webpki roots are used.
    pub ca_cert_path: Option<PathBuf>,
    /// Path to PEM-encoded client certificate (for mTLS).
    pub client_cert_path: Option<PathBuf>,
    /// Path to PEM-encoded client private key (for mTLS).
    pub client_key_path: Option<PathBuf>,
    /// Skip server certificate verification (INSECURE - development only).
    pub insecure: bool,
}

impl TlsClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ca_cert(mut self, path: impl Into<PathBuf>) -> Self {
        self.ca_cert_path = Some(path.into());
        self
    }

    pub fn with_client_cert(
        mut self,
        cert_path: impl Into<PathBuf>,
        key_path: impl Into<PathBuf>,
    ) -> Self {
        self.client_cert_path = Some(cert_path.into());
        self.client_key_path = Some(key_path.into());
        self
    }

    pub fn with_insecure(mut self) -> Self {
        self.insecure = true;
        self
    }
}

/// Connection configuration.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Endpoint URL (`ws://` or `wss://`).
    pub url: String,
    /// Connection timeout.
    pub connect_timeout: Duration,
    /// Default per-call timeout.
    pub request_timeout: Duration,
    /// TLS configuration (optional, `wss://` only).
    pub tls: Option<TlsClientConfig>,
}

impl ConnectionConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            tls: None,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_tls(mut self, tls_config: TlsClientConfig) -> Self {
        self.tls = Some(tls_config);
        self
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self::new(jamrpc_protocol::DEFAULT_RPC_URL)
    }
}

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
        }
    }
}

type ConnectWaiter = oneshot::Sender<Result<(), String>>;

/// The live transport of the current epoch.
struct ActiveTransport {
    epoch: u64,
    sink: Arc<AsyncMutex<FrameSink>>,
    reader: JoinHandle<()>,
}

struct StateInner {
    state: ConnectionState,
    /// Bumped for every connect attempt; stale attempts and read tasks
    /// compare against it and back off.
    epoch: u64,
    waiters: Vec<ConnectWaiter>,
    active: Option<ActiveTransport>,
}

struct Shared {
    connector: Arc<dyn Connector>,
    handler: Arc<dyn FrameHandler>,
    connect_timeout: Duration,
    inner: Mutex<StateInner>,
}

/// A persistent connection to a single endpoint.
pub struct Connection {
    shared: Arc<Shared>,
}

impl Connection {
    /// Creates a new connection (not yet connected).
    pub fn new(
        config: &ConnectionConfig,
        connector: Arc<dyn Connector>,
        handler: Arc<dyn FrameHandler>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                connector,
                handler,
                connect_timeout: config.connect_timeout,
                inner: Mutex::new(StateInner {
                    state: ConnectionState::Disconnected,
                    epoch: 0,
                    waiters: Vec::new(),
                    active: None,
                }),
            }),
        }
    }

    /// Returns the current state.
    pub fn state(&self) -> ConnectionState {
        self.shared.inner.lock().state
    }

    /// Returns whether the connection is established.
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Ensures a live transport, opening one if necessary.
    ///
    /// Callers arriving while an attempt is in flight wait for that attempt
    /// instead of starting another. The attempt runs in its own task, so a
    /// caller giving up does not strand the connection in `Connecting`.
    pub async fn ensure_connected(&self) -> Result<(), ClientError> {
        let rx = {
            let mut inner = self.shared.inner.lock();
            match inner.state {
                ConnectionState::Connected => return Ok(()),
                ConnectionState::Connecting => {
                    let (tx, rx) = oneshot::channel();
                    inner.waiters.push(tx);
                    rx
                }
                ConnectionState::Disconnected => {
                    inner.state = ConnectionState::Connecting;
                    inner.epoch += 1;
                    let epoch = inner.epoch;
                    let (tx, rx) = oneshot::channel();
                    inner.waiters.push(tx);
                    tokio::spawn(Shared::open(self.shared.clone(), epoch));
                    rx
                }
            }
        };

        match rx.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(reason)) => Err(ClientError::ConnectionFailed(reason)),
            Err(_) => Err(ClientError::ConnectionFailed(
                "connect attempt abandoned".to_string(),
            )),
        }
    }

    /// Writes one frame to the transport. Fails with `NotConnected` unless
    /// the connection is established; nothing is queued.
    pub async fn send(&self, frame: String) -> Result<(), ClientError> {
        let sink = {
            let inner = self.shared.inner.lock();
            match (&inner.state, &inner.active) {
                (ConnectionState::Connected, Some(active)) => active.sink.clone(),
                _ => return Err(ClientError::NotConnected),
            }
        };

        let mut guard = sink.lock().await;
        guard.send(frame).await
    }

    /// Closes the connection. Idempotent.
    ///
    /// The closure notification runs before this returns.
    pub async fn disconnect(&self) {
        let active = {
            let mut inner = self.shared.inner.lock();
            match inner.state {
                ConnectionState::Disconnected => return,
                ConnectionState::Connecting => {
                    tracing::debug!("Abandoning connect attempt epoch={}", inner.epoch);
                    inner.epoch += 1;
                    inner.state = ConnectionState::Disconnected;
                    for waiter in inner.waiters.drain(..) {
                        let _ = waiter.send(Err(DISCONNECT_REASON.to_string()));
                    }
                    self.shared.handler.on_closed(DISCONNECT_REASON);
                    None
                }
                ConnectionState::Connected => {
                    let active = inner.active.take();
                    // No inbound frame is routed once the reader is gone.
                    if let Some(ref active) = active {
                        active.reader.abort();
                    }
                    inner.state = ConnectionState::Disconnected;
                    self.shared.handler.on_closed(DISCONNECT_REASON);
                    active
                }
            }
        };

        if let Some(active) = active {
            tracing::debug!("Closing transport epoch={}", active.epoch);
            let mut sink = active.sink.lock().await;
            if let Err(e) = sink.close().await {
                tracing::debug!("Error while closing transport: {}", e);
            }
        }
        tracing::debug!("Disconnected from {}", self.shared.connector.endpoint());
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        let mut inner = self.shared.inner.lock();
        if let Some(active) = inner.active.take() {
            active.reader.abort();
        }
        if inner.state != ConnectionState::Disconnected {
            inner.epoch += 1;
            inner.state = ConnectionState::Disconnected;
            inner.waiters.clear();
            self.shared.handler.on_closed("connection dropped");
        }
    }
}

impl Shared {
    /// Runs one connect attempt to completion.
    async fn open(self: Arc<Self>, epoch: u64) {
        tracing::debug!(
            "Connecting to {} (epoch={})...",
            self.connector.endpoint(),
            epoch
        );

        let result = match tokio::time::timeout(self.connect_timeout, self.connector.connect()).await
        {
            Ok(result) => result,
            Err(_) => Err(ClientError::ConnectionFailed(format!(
                "timed out after {:?}",
                self.connect_timeout
            ))),
        };

        if let Some(mut stale) = self.install(epoch, result) {
            tracing::debug!("Discarding transport from superseded attempt epoch={}", epoch);
            let _ = stale.sink.close().await;
        }
    }

    /// Applies the outcome of a connect attempt. Returns the transport back
    /// if the attempt was superseded and it must be closed.
    fn install(
        self: &Arc<Self>,
        epoch: u64,
        result: Result<Transport, ClientError>,
    ) -> Option<Transport> {
        let mut inner = self.inner.lock();
        if inner.epoch != epoch || inner.state != ConnectionState::Connecting {
            return result.ok();
        }

        match result {
            Ok(Transport { sink, stream }) => {
                let reader = tokio::spawn(Shared::read_loop(self.clone(), epoch, stream));
                inner.active = Some(ActiveTransport {
                    epoch,
                    sink: Arc::new(AsyncMutex::new(sink)),
                    reader,
                });
                inner.state = ConnectionState::Connected;
                tracing::debug!(
                    "Connected to {} (epoch={}), releasing {} waiter(s)",
                    self.connector.endpoint(),
                    epoch,
                    inner.waiters.len()
                );
                for waiter in inner.waiters.drain(..) {
                    let _ = waiter.send(Ok(()));
                }
            }
            Err(e) => {
                let reason = match e {
                    ClientError::ConnectionFailed(reason) => reason,
                    other => other.to_string(),
                };
                tracing::warn!(
                    "Connection to {} failed: {}",
                    self.connector.endpoint(),
                    reason
                );
                inner.state = ConnectionState::Disconnected;
                for waiter in inner.waiters.drain(..) {
                    let _ = waiter.send(Err(reason.clone()));
                }
            }
        }
        None
    }

    /// Delivers inbound frames until the transport ends.
    async fn read_loop(self: Arc<Self>, epoch: u64, mut stream: FrameStream) {
        tracing::debug!("read_loop started (epoch={})", epoch);
        let reason = loop {
            match stream.next().await {
                Some(Ok(frame)) => {
                    tracing::trace!("read_loop: received {} bytes", frame.len());
                    self.handler.on_frame(&frame);
                }
                Some(Err(e)) => {
                    tracing::warn!("read_loop: transport error: {}", e);
                    break e.to_string();
                }
                None => break "connection closed by peer".to_string(),
            }
        };
        self.handle_closed(epoch, &reason);
    }

    /// Transitions to `Disconnected` after the transport of `epoch` ended.
    fn handle_closed(&self, epoch: u64, reason: &str) {
        let mut inner = self.inner.lock();
        let current = matches!(&inner.active, Some(active) if active.epoch == epoch);
        if !current {
            return;
        }

        inner.active = None;
        inner.state = ConnectionState::Disconnected;
        tracing::debug!(
            "Connection to {} closed (epoch={}): {}",
            self.connector.endpoint(),
            epoch,
            reason
        );
        self.handler.on_closed(reason);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryConnector;

    #[derive(Default)]
    struct Recorder {
        frames: Mutex<Vec<String>>,
        closures: Mutex<Vec<String>>,
    }

    impl FrameHandler for Recorder {
        fn on_frame(&self, frame: &str) {
            self.frames.lock().push(frame.to_string());
        }

        fn on_closed(&self, reason: &str) {
            self.closures.lock().push(reason.to_string());
        }
    }

    fn setup() -> (
        Arc<Connection>,
        Arc<MemoryConnector>,
        crate::memory::MemoryListener,
        Arc<Recorder>,
    ) {
        let (connector, listener) = MemoryConnector::new();
        let connector = Arc::new(connector);
        let recorder = Arc::new(Recorder::default());
        let conn = Connection::new(
            &ConnectionConfig::new("memory://"),
            connector.clone(),
            recorder.clone(),
        );
        (Arc::new(conn), connector, listener, recorder)
    }

    #[test]
    fn test_config_defaults() {
        let config = ConnectionConfig::default();
        assert_eq!(config.url, "ws://localhost:19800");
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert!(config.tls.is_none());
    }

    #[test]
    fn test_config_builders() {
        let config = ConnectionConfig::new("wss://node.example:443")
            .with_connect_timeout(Duration::from_secs(1))
            .with_request_timeout(Duration::from_millis(250))
            .with_tls(TlsClientConfig::new().with_insecure());
        assert_eq!(config.connect_timeout, Duration::from_secs(1));
        assert_eq!(config.request_timeout, Duration::from_millis(250));
        assert!(config.tls.unwrap().insecure);
    }

    #[tokio::test]
    async fn test_starts_disconnected() {
        let (conn, connector, _listener, _) = setup();
        assert_eq!(conn.state(), ConnectionState::Disconnected);
        assert!(!conn.is_connected());
        assert_eq!(connector.open_count(), 0);
    }

    #[tokio::test]
    async fn test_send_requires_connection() {
        let (conn, _, _listener, _) = setup();
        let err = conn.send("{}".to_string()).await.unwrap_err();
        assert!(matches!(err, ClientError::NotConnected));
    }

    #[tokio::test]
    async fn test_connect_send_and_receive() {
        let (conn, _, mut listener, recorder) = setup();
        conn.ensure_connected().await.unwrap();
        assert!(conn.is_connected());

        let mut peer = listener.accept().await.unwrap();
        conn.send("hello".to_string()).await.unwrap();
        assert_eq!(peer.recv().await.as_deref(), Some("hello"));

        peer.send("world");
        for _ in 0..50 {
            if !recorder.frames.lock().is_empty() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(recorder.frames.lock().as_slice(), ["world".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_ensure_connected_opens_once() {
        let (conn, connector, mut listener, _) = setup();
        connector.set_connect_delay(Duration::from_millis(100));

        let mut tasks = Vec::new();
        for _ in 0..16 {
            let conn = conn.clone();
            tasks.push(tokio::spawn(async move { conn.ensure_connected().await }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(connector.open_count(), 1);
        assert!(listener.accept().await.is_some());

        // Already connected: no further opens.
        conn.ensure_connected().await.unwrap();
        assert_eq!(connector.open_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_connect_fans_out_same_error() {
        let (conn, connector, _listener, recorder) = setup();
        connector.set_connect_delay(Duration::from_millis(20));
        connector.set_failure(Some("refused"));

        let mut tasks = Vec::new();
        for _ in 0..4 {
            let conn = conn.clone();
            tasks.push(tokio::spawn(async move { conn.ensure_connected().await }));
        }
        for task in tasks {
            match task.await.unwrap() {
                Err(ClientError::ConnectionFailed(reason)) => assert_eq!(reason, "refused"),
                other => panic!("unexpected result: {:?}", other),
            }
        }

        assert_eq!(connector.open_count(), 1);
        assert_eq!(conn.state(), ConnectionState::Disconnected);
        // A failed open is not a closure.
        assert!(recorder.closures.lock().is_empty());

        // A later attempt opens a fresh transport.
        connector.set_failure(None);
        conn.ensure_connected().await.unwrap();
        assert_eq!(connector.open_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_timeout() {
        let (connector, _listener) = MemoryConnector::new();
        let connector = Arc::new(connector);
        connector.set_connect_delay(Duration::from_secs(60));
        let conn = Connection::new(
            &ConnectionConfig::new("memory://").with_connect_timeout(Duration::from_secs(1)),
            connector,
            Arc::new(Recorder::default()),
        );

        let err = conn.ensure_connected().await.unwrap_err();
        assert!(matches!(err, ClientError::ConnectionFailed(ref m) if m.contains("timed out")));
        assert_eq!(conn.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent_and_notifies() {
        let (conn, _, mut listener, recorder) = setup();

        conn.disconnect().await;
        assert!(recorder.closures.lock().is_empty());

        conn.ensure_connected().await.unwrap();
        let mut peer = listener.accept().await.unwrap();

        conn.disconnect().await;
        assert_eq!(conn.state(), ConnectionState::Disconnected);
        assert_eq!(recorder.closures.lock().as_slice(), [DISCONNECT_REASON.to_string()]);

        // The remote end observes the close.
        assert!(peer.recv().await.is_none());

        conn.disconnect().await;
        assert_eq!(recorder.closures.lock().len(), 1);
        assert!(matches!(
            conn.send("x".to_string()).await,
            Err(ClientError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_frames_after_disconnect_are_not_routed() {
        let (conn, _, mut listener, recorder) = setup();

        conn.ensure_connected().await.unwrap();
        let peer = listener.accept().await.unwrap();
        conn.disconnect().await;

        peer.send("late");
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
        assert!(recorder.frames.lock().is_empty());
        assert_eq!(recorder.closures.lock().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_while_connecting() {
        let (conn, connector, mut listener, recorder) = setup();
        connector.set_connect_delay(Duration::from_millis(100));

        let waiter = {
            let conn = conn.clone();
            tokio::spawn(async move { conn.ensure_connected().await })
        };
        for _ in 0..50 {
            if conn.state() == ConnectionState::Connecting {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(conn.state(), ConnectionState::Connecting);

        conn.disconnect().await;
        assert!(matches!(
            waiter.await.unwrap(),
            Err(ClientError::ConnectionFailed(ref m)) if m == DISCONNECT_REASON
        ));
        assert_eq!(recorder.closures.lock().len(), 1);

        // The superseded attempt completes but must not flip the state.
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(conn.state(), ConnectionState::Disconnected);
        let mut stale = listener.accept().await.unwrap();
        assert!(stale.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_remote_close_detected() {
        let (conn, _, mut listener, recorder) = setup();
        conn.ensure_connected().await.unwrap();
        let mut peer = listener.accept().await.unwrap();

        peer.close();
        for _ in 0..50 {
            if !conn.is_connected() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(conn.state(), ConnectionState::Disconnected);
        assert_eq!(
            recorder.closures.lock().as_slice(),
            ["connection closed by peer".to_string()]
        );
    }

    #[tokio::test]
    async fn test_transport_error_is_closure() {
        let (conn, _, mut listener, recorder) = setup();
        conn.ensure_connected().await.unwrap();
        let peer = listener.accept().await.unwrap();

        peer.fail("reset by peer");
        for _ in 0..50 {
            if !conn.is_connected() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert!(!conn.is_connected());
        let closures = recorder.closures.lock();
        assert_eq!(closures.len(), 1);
        assert!(closures[0].contains("reset by peer"));
    }

    #[tokio::test]
    async fn test_reconnect_after_close() {
        let (conn, connector, mut listener, _) = setup();
        conn.ensure_connected().await.unwrap();
        let _first = listener.accept().await.unwrap();

        conn.disconnect().await;
        conn.ensure_connected().await.unwrap();
        let mut second = listener.accept().await.unwrap();
        assert_eq!(connector.open_count(), 2);

        conn.send("again".to_string()).await.unwrap();
        assert_eq!(second.recv().await.as_deref(), Some("again"));
    }
}
