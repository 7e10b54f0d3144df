//! Request correlation.
//!
//! The correlator hands out request ids, keeps one pending entry per
//! in-flight call and resolves each entry exactly once: by its response,
//! by its deadline, or by connection closure. Whoever removes the entry
//! from the pending map under the lock is the one that resolves it.

use crate::connection::Connection;
use crate::error::ClientError;
use crate::transport::FrameHandler;
use jamrpc_protocol::{Decoder, Encoder, InboundMessage, OutboundCall, RequestId};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

type Completion = oneshot::Sender<Result<Value, ClientError>>;
type PendingMap = HashMap<RequestId, PendingRequest>;

/// Bookkeeping for one in-flight call.
struct PendingRequest {
    method: String,
    tx: Completion,
    timer: JoinHandle<()>,
}

/// Matches inbound responses to outstanding calls.
pub struct Correlator {
    next_id: AtomicU64,
    pending: Arc<Mutex<PendingMap>>,
}

impl Correlator {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            pending: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Issues a call and returns a handle that resolves with its outcome.
    ///
    /// Connect and send failures are delivered through the handle; the
    /// pending entry is removed before this returns in that case.
    pub async fn issue(
        &self,
        conn: &Connection,
        method: &str,
        params: Vec<Value>,
        timeout: Duration,
    ) -> ResponseHandle {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let call = OutboundCall::new(id, method, params);
        let rx = self.register(id, method, timeout);

        tracing::debug!("Sending request id={} method={}", id, method);
        let sent = match Encoder::encode_call(&call) {
            Ok(frame) => Self::transmit(conn, frame).await,
            Err(e) => Err(e.into()),
        };
        if let Err(e) = sent {
            tracing::debug!("Request id={} failed before reaching the node: {}", id, e);
            self.fail(id, e);
        }

        ResponseHandle {
            id,
            method: method.to_string(),
            rx,
        }
    }

    /// Issues a call and waits for its outcome.
    pub async fn call(
        &self,
        conn: &Connection,
        method: &str,
        params: Vec<Value>,
        timeout: Duration,
    ) -> Result<Value, ClientError> {
        self.issue(conn, method, params, timeout).await.await
    }

    async fn transmit(conn: &Connection, frame: String) -> Result<(), ClientError> {
        conn.ensure_connected().await?;
        conn.send(frame).await
    }

    /// Registers a pending entry and arms its timer.
    fn register(&self, id: RequestId, method: &str, timeout: Duration) -> oneshot::Receiver<Result<Value, ClientError>> {
        let (tx, rx) = oneshot::channel();
        // The timer is spawned under the lock so it cannot look for the
        // entry before it is inserted.
        let mut pending = self.pending.lock();
        let timer = tokio::spawn(expire(Arc::downgrade(&self.pending), id, timeout));
        pending.insert(
            id,
            PendingRequest {
                method: method.to_string(),
                tx,
                timer,
            },
        );
        rx
    }

    /// Resolves the entry for `id` with `err`, if it is still pending.
    fn fail(&self, id: RequestId, err: ClientError) -> bool {
        let entry = self.pending.lock().remove(&id);
        match entry {
            Some(entry) => {
                entry.timer.abort();
                let _ = entry.tx.send(Err(err));
                true
            }
            None => false,
        }
    }

    /// Routes one inbound frame to its pending entry.
    pub fn on_message(&self, frame: &str) {
        let message = match Decoder::decode_message(frame) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!("Dropping undecodable frame: {}", e);
                return;
            }
        };

        let id = message.id();
        let entry = self.pending.lock().remove(&id);
        let Some(entry) = entry else {
            tracing::debug!("No pending request for id={}, dropping response", id);
            return;
        };

        entry.timer.abort();
        tracing::debug!(
            "Request id={} method={} got {}",
            id,
            entry.method,
            if message.is_ok() { "result" } else { "error" }
        );
        let outcome = message.into_result().map_err(ClientError::from);
        let _ = entry.tx.send(outcome);
    }

    /// Fails every pending entry with `ConnectionClosed(reason)`.
    pub fn on_connection_closed(&self, reason: &str) {
        let drained: Vec<(RequestId, PendingRequest)> = self.pending.lock().drain().collect();
        if drained.is_empty() {
            return;
        }

        tracing::debug!(
            "Connection closed ({}), failing {} pending request(s)",
            reason,
            drained.len()
        );
        for (_, entry) in drained {
            entry.timer.abort();
            let _ = entry
                .tx
                .send(Err(ClientError::ConnectionClosed(reason.to_string())));
        }
    }

    /// Returns the number of pending requests.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Returns the ids of pending requests in ascending order.
    pub fn pending_ids(&self) -> Vec<RequestId> {
        let mut ids: Vec<RequestId> = self.pending.lock().keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}

impl Default for Correlator {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameHandler for Correlator {
    fn on_frame(&self, frame: &str) {
        self.on_message(frame);
    }

    fn on_closed(&self, reason: &str) {
        self.on_connection_closed(reason);
    }
}

/// Deadline timer for one entry.
async fn expire(pending: Weak<Mutex<PendingMap>>, id: RequestId, timeout: Duration) {
    tokio::time::sleep(timeout).await;

    let Some(pending) = pending.upgrade() else {
        return;
    };
    let entry = pending.lock().remove(&id);
    if let Some(PendingRequest { method, tx, .. }) = entry {
        tracing::debug!("Request id={} method={} timed out after {:?}", id, method, timeout);
        let _ = tx.send(Err(ClientError::RequestTimeout(method)));
    }
}

/// Completion handle for an issued call.
///
/// Dropping the handle stops waiting locally; the pending entry still
/// expires through its response, deadline, or connection closure.
#[derive(Debug)]
pub struct ResponseHandle {
    id: RequestId,
    method: String,
    rx: oneshot::Receiver<Result<Value, ClientError>>,
}

impl ResponseHandle {
    /// The id assigned to the call.
    pub fn id(&self) -> RequestId {
        self.id
    }

    pub fn method(&self) -> &str {
        &self.method
    }
}

impl Future for ResponseHandle {
    type Output = Result<Value, ClientError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
            Poll::Ready(Err(_)) => Poll::Ready(Err(ClientError::ConnectionClosed(
                "correlator dropped".to_string(),
            ))),
            Poll::Pending => Poll::Pending,
        }
    }
}
