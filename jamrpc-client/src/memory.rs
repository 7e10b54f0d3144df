//! In-memory transport.
//!
//! `MemoryConnector` hands out channel-backed transports and delivers the
//! remote end of each one to a `MemoryListener` as a `MemoryPeer`. Useful
//! for exercising code built on `RpcClient` without a node.

use crate::error::ClientError;
use crate::transport::{Connector, Transport};
use async_trait::async_trait;
use futures_util::{sink, stream};
use jamrpc_protocol::{Decoder, Encoder, InboundMessage, OutboundCall};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Connector producing in-memory transports.
pub struct MemoryConnector {
    opens: AtomicUsize,
    connect_delay: Mutex<Duration>,
    failure: Mutex<Option<String>>,
    peers: mpsc::UnboundedSender<MemoryPeer>,
}

/// Accepts the remote ends of transports opened by a `MemoryConnector`.
pub struct MemoryListener {
    peers: mpsc::UnboundedReceiver<MemoryPeer>,
}

impl MemoryConnector {
    pub fn new() -> (Self, MemoryListener) {
        let (peers, rx) = mpsc::unbounded_channel();
        let connector = Self {
            opens: AtomicUsize::new(0),
            connect_delay: Mutex::new(Duration::ZERO),
            failure: Mutex::new(None),
            peers,
        };
        (connector, MemoryListener { peers: rx })
    }

    /// Delays every subsequent open by `delay`.
    pub fn set_connect_delay(&self, delay: Duration) {
        *self.connect_delay.lock() = delay;
    }

    /// Makes subsequent opens fail with `reason` (or succeed again with `None`).
    pub fn set_failure(&self, reason: Option<&str>) {
        *self.failure.lock() = reason.map(str::to_string);
    }

    /// Number of transport opens attempted so far.
    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self) -> Result<Transport, ClientError> {
        self.opens.fetch_add(1, Ordering::SeqCst);

        let delay = *self.connect_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let failure = self.failure.lock().clone();
        if let Some(reason) = failure {
            return Err(ClientError::ConnectionFailed(reason));
        }

        let (out_tx, out_rx) = mpsc::unbounded_channel::<String>();
        let (in_tx, in_rx) = mpsc::unbounded_channel::<Result<String, ClientError>>();

        self.peers
            .send(MemoryPeer {
                outbound: out_rx,
                inbound: Some(in_tx),
            })
            .map_err(|_| ClientError::ConnectionFailed("memory listener dropped".into()))?;

        let sink = sink::unfold(out_tx, |tx, frame: String| async move {
            tx.send(frame)
                .map_err(|_| ClientError::Transport("memory peer dropped".into()))?;
            Ok::<_, ClientError>(tx)
        });
        let stream = stream::unfold(in_rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        });

        Ok(Transport::new(Box::pin(sink), Box::pin(stream)))
    }

    fn endpoint(&self) -> String {
        "memory://".to_string()
    }
}

impl MemoryListener {
    /// Waits for the next transport to be opened.
    pub async fn accept(&mut self) -> Option<MemoryPeer> {
        self.peers.recv().await
    }
}

/// Remote end of an in-memory transport.
pub struct MemoryPeer {
    outbound: mpsc::UnboundedReceiver<String>,
    inbound: Option<mpsc::UnboundedSender<Result<String, ClientError>>>,
}

impl MemoryPeer {
    /// Receives the next frame sent by the client. `None` once the client
    /// side of the transport is gone.
    pub async fn recv(&mut self) -> Option<String> {
        self.outbound.recv().await
    }

    /// Receives and decodes the next call sent by the client.
    pub async fn recv_call(&mut self) -> Option<OutboundCall> {
        loop {
            let frame = self.recv().await?;
            match Decoder::decode_call(&frame) {
                Ok(call) => return Some(call),
                Err(e) => tracing::warn!("memory peer: ignoring undecodable frame: {}", e),
            }
        }
    }

    /// Sends a raw text frame to the client.
    pub fn send(&self, frame: impl Into<String>) {
        if let Some(tx) = &self.inbound {
            let _ = tx.send(Ok(frame.into()));
        }
    }

    /// Sends a response to the client.
    pub fn reply(&self, message: &InboundMessage) {
        match Encoder::encode_message(message) {
            Ok(frame) => self.send(frame),
            Err(e) => tracing::warn!("memory peer: failed to encode reply: {}", e),
        }
    }

    /// Injects a transport error, which the client treats as closure.
    pub fn fail(&self, reason: &str) {
        if let Some(tx) = &self.inbound {
            let _ = tx.send(Err(ClientError::Transport(reason.to_string())));
        }
    }

    /// Stops accepting frames from the client; its next write fails.
    pub fn stop_receiving(&mut self) {
        self.outbound.close();
    }

    /// Closes the transport from the remote side.
    pub fn close(&mut self) {
        self.inbound = None;
    }

    /// Answers every call with `respond`; `None` leaves a call unanswered.
    pub fn spawn_responder<F>(mut self, respond: F) -> JoinHandle<()>
    where
        F: Fn(&OutboundCall) -> Option<InboundMessage> + Send + 'static,
    {
        tokio::spawn(async move {
            while let Some(call) = self.recv_call().await {
                if let Some(reply) = respond(&call) {
                    self.reply(&reply);
                }
            }
        })
    }
}
