//! Transport seam between the connection manager and concrete connections.

use crate::error::ClientError;
use async_trait::async_trait;
use futures_util::{Sink, Stream};
use std::pin::Pin;

/// Outbound half of a transport: accepts one text frame per item.
pub type FrameSink = Pin<Box<dyn Sink<String, Error = ClientError> + Send>>;

/// Inbound half of a transport. The stream ending means the peer closed.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<String, ClientError>> + Send>>;

/// An opened, message-oriented connection.
pub struct Transport {
    pub sink: FrameSink,
    pub stream: FrameStream,
}

impl Transport {
    pub fn new(sink: FrameSink, stream: FrameStream) -> Self {
        Self { sink, stream }
    }
}

/// Opens transports to a single endpoint.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Opens a new transport. Returns once it is ready to carry frames.
    async fn connect(&self) -> Result<Transport, ClientError>;

    /// Endpoint description for logs.
    fn endpoint(&self) -> String;
}

/// Receives inbound frames and closure notifications from a connection.
pub trait FrameHandler: Send + Sync + 'static {
    fn on_frame(&self, frame: &str);

    /// Called on every transition into `Disconnected` other than a failed
    /// connect attempt. Runs before a new transport may be opened.
    fn on_closed(&self, reason: &str);
}
