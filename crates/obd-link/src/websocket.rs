//! WiFi adapters behind a WebSocket bridge
//!
//! Commands go out as text messages. Bridges are free to split one adapter
//! response across several messages, so prompt framing is the default;
//! [`Framing::Message`] treats every message as a complete response.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use obd_protocol::{Device, Framing, Link, LinkKind, ObdError, Radio, Result, Target};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info};

/// WebSocket radio for WiFi adapters
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketRadio {
    pub framing: Framing,
}

impl WebSocketRadio {
    pub fn with_framing(framing: Framing) -> Self {
        Self { framing }
    }
}

fn map_ws_error(err: tungstenite::Error) -> ObdError {
    match err {
        tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
            ObdError::TransportClosed
        }
        tungstenite::Error::Io(e) => e.into(),
        other => ObdError::Transport(other.to_string()),
    }
}

#[async_trait]
impl Radio for WebSocketRadio {
    fn kind(&self) -> LinkKind {
        LinkKind::WifiWebSocket
    }

    async fn scan(&self) -> Result<Vec<Device>> {
        Ok(Vec::new())
    }

    async fn open(&self, target: &Target) -> Result<Box<dyn Link>> {
        let Target::Wifi { ip, port } = target else {
            return Err(ObdError::InvalidAddress(format!(
                "{} is not a WiFi address",
                target
            )));
        };

        let url = format!("ws://{}:{}", ip, port);
        info!("Opening WebSocket {}", url);
        let (stream, _) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(map_ws_error)?;

        Ok(Box::new(WebSocketLink {
            stream,
            framing: self.framing,
        }))
    }
}

struct WebSocketLink {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    framing: Framing,
}

#[async_trait]
impl Link for WebSocketLink {
    async fn write(&mut self, data: &[u8]) -> Result<()> {
        let text = String::from_utf8_lossy(data).into_owned();
        self.stream
            .send(Message::Text(text))
            .await
            .map_err(map_ws_error)
    }

    async fn read(&mut self) -> Result<Vec<u8>> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => return Ok(text.into_bytes()),
                Some(Ok(Message::Binary(bytes))) => return Ok(bytes),
                Some(Ok(Message::Close(frame))) => {
                    debug!("WebSocket closed by adapter: {:?}", frame);
                    return Err(ObdError::TransportClosed);
                }
                // ping/pong are answered by tungstenite
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(map_ws_error(e)),
                None => return Err(ObdError::TransportClosed),
            }
        }
    }

    fn framing(&self) -> Framing {
        self.framing
    }

    async fn close(&mut self) -> Result<()> {
        self.stream.close(None).await.map_err(map_ws_error)
    }
}
