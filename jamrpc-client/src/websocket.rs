//! WebSocket transport.

use crate::connection::ConnectionConfig;
use crate::error::ClientError;
use crate::tls::build_client_config;
use crate::transport::{Connector, Transport};
use async_trait::async_trait;
use futures_util::{future, stream, SinkExt, StreamExt};
use std::sync::Arc;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

/// Opens WebSocket transports to a `ws://` or `wss://` endpoint.
pub struct WsConnector {
    url: Url,
    tls: Option<Arc<rustls::ClientConfig>>,
}

impl WsConnector {
    /// Validates the endpoint and prepares TLS for `wss://` URLs.
    pub fn new(config: &ConnectionConfig) -> Result<Self, ClientError> {
        let url = parse_endpoint(&config.url)?;

        let tls = match url.scheme() {
            "wss" => Some(build_client_config(
                &config.tls.clone().unwrap_or_default(),
            )?),
            _ => {
                if config.tls.is_some() {
                    tracing::warn!("TLS settings ignored for plain endpoint {}", url);
                }
                None
            }
        };

        Ok(Self { url, tls })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

/// Parses and checks an endpoint URL.
pub fn parse_endpoint(raw: &str) -> Result<Url, ClientError> {
    let url = Url::parse(raw).map_err(|e| ClientError::InvalidUrl(format!("{}: {}", raw, e)))?;
    match url.scheme() {
        "ws" | "wss" => {}
        other => {
            return Err(ClientError::InvalidUrl(format!(
                "{}: unsupported scheme '{}', expected ws or wss",
                raw, other
            )))
        }
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(ClientError::InvalidUrl(format!("{}: missing host", raw)));
    }
    Ok(url)
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self) -> Result<Transport, ClientError> {
        tracing::debug!("Opening WebSocket to {}", self.url);

        let connector = self
            .tls
            .clone()
            .map(tokio_tungstenite::Connector::Rustls);
        let (ws, _response) = tokio_tungstenite::connect_async_tls_with_config(
            self.url.as_str(),
            None,
            true,
            connector,
        )
        .await
        .map_err(|e| ClientError::ConnectionFailed(format!("{}: {}", self.url, e)))?;

        let (write, read) = ws.split();

        let sink = write
            .sink_map_err(|e| ClientError::Transport(e.to_string()))
            .with(|frame: String| future::ready(Ok::<_, ClientError>(Message::Text(frame.into()))));

        // Only text frames carry messages. Pings are answered by tungstenite
        // itself and a close frame ends the stream.
        let frames = stream::unfold(read, |mut read| async move {
            loop {
                match read.next().await? {
                    Ok(Message::Text(text)) => return Some((Ok(text.as_str().to_owned()), read)),
                    Ok(Message::Close(frame)) => {
                        tracing::debug!("Received close frame: {:?}", frame);
                        return None;
                    }
                    Ok(Message::Binary(_)) => {
                        tracing::debug!("Ignoring binary frame");
                    }
                    Ok(_) => {}
                    Err(e) => return Some((Err(ClientError::Transport(e.to_string())), read)),
                }
            }
        });

        Ok(Transport::new(Box::pin(sink), Box::pin(frames)))
    }

    fn endpoint(&self) -> String {
        self.url.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jamrpc_protocol::{Decoder, Encoder, InboundMessage};
    use serde_json::json;
    use tokio::net::TcpListener;

    #[test]
    fn test_parse_endpoint() {
        let url = parse_endpoint("ws://localhost:19800").unwrap();
        assert_eq!(url.host_str(), Some("localhost"));
        assert_eq!(url.port(), Some(19800));
        assert!(parse_endpoint("wss://node.example.com/rpc").is_ok());
    }

    #[test]
    fn test_parse_endpoint_rejects() {
        for raw in ["http://localhost:19800", "localhost:19800", "not a url", ""] {
            assert!(
                matches!(parse_endpoint(raw), Err(ClientError::InvalidUrl(_))),
                "accepted {:?}",
                raw
            );
        }
    }

    #[test]
    fn test_plain_endpoint_has_no_tls() {
        let connector = WsConnector::new(&ConnectionConfig::new("ws://127.0.0.1:19800")).unwrap();
        assert!(connector.tls.is_none());
        assert_eq!(connector.endpoint(), "ws://127.0.0.1:19800/");
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let connector = WsConnector::new(&ConnectionConfig::new(format!("ws://{}", addr))).unwrap();
        assert!(matches!(
            connector.connect().await,
            Err(ClientError::ConnectionFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_round_trip_over_websocket() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            ws.send(Message::Binary(vec![1u8, 2, 3].into())).await.unwrap();
            while let Some(Ok(msg)) = ws.next().await {
                if let Message::Text(text) = msg {
                    let call = Decoder::decode_call(text.as_str()).unwrap();
                    let reply = InboundMessage::ok(call.id(), json!({"echo": call.method()}));
                    let frame = Encoder::encode_message(&reply).unwrap();
                    ws.send(Message::Text(frame.into())).await.unwrap();
                    ws.close(None).await.unwrap();
                }
            }
        });

        let connector = WsConnector::new(&ConnectionConfig::new(format!("ws://{}", addr))).unwrap();
        let mut transport = connector.connect().await.unwrap();
        transport
            .sink
            .send(r#"{"jsonrpc":"2.0","id":7,"method":"ping","params":[]}"#.to_string())
            .await
            .unwrap();

        // The binary frame is skipped.
        let frame = transport.stream.next().await.unwrap().unwrap();
        let reply = Decoder::decode_message(&frame).unwrap();
        assert_eq!(reply.id(), 7);
        assert_eq!(reply.into_result().unwrap(), json!({"echo": "ping"}));

        // The close frame ends the stream.
        assert!(transport.stream.next().await.is_none());
        drop(transport);
        server.await.unwrap();
    }
}
