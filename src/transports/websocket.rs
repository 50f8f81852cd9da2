//! WebSocket transport over tokio-tungstenite

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, trace};

use crate::transport::{CloseCode, Connector, Transport, TransportEvent};
use crate::{LinkError, Result};

/// Connector that opens real WebSocket connections.
#[derive(Debug, Clone, Default)]
pub struct WebSocketConnector;

#[async_trait::async_trait]
impl Connector for WebSocketConnector {
    type Transport = WebSocketTransport;

    async fn open(&self, endpoint: &str) -> Result<WebSocketTransport> {
        debug!("Opening WebSocket to {}", endpoint);

        let (stream, response) = connect_async(endpoint).await.map_err(|e| {
            LinkError::connect_failed_with_source(endpoint, e.to_string(), Box::new(e))
        })?;

        info!("WebSocket open to {} (HTTP {})", endpoint, response.status());
        Ok(WebSocketTransport { stream })
    }
}

/// An open WebSocket connection.
pub struct WebSocketTransport {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait::async_trait]
impl Transport for WebSocketTransport {
    async fn send_text(&mut self, text: String) -> Result<()> {
        trace!("Sending {} bytes", text.len());
        self.stream.send(Message::Text(text.into())).await?;
        Ok(())
    }

    async fn next_event(&mut self) -> TransportEvent {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => return TransportEvent::Text(text.as_str().to_string()),
                Some(Ok(Message::Binary(data))) => match String::from_utf8(data.to_vec()) {
                    Ok(text) => return TransportEvent::Text(text),
                    Err(_) => debug!("Ignoring non-UTF-8 binary message ({} bytes)", data.len()),
                },
                Some(Ok(Message::Close(frame))) => {
                    let (code, reason) = match frame {
                        Some(frame) => {
                            (CloseCode(u16::from(frame.code)), frame.reason.as_str().to_string())
                        }
                        None => (CloseCode::NO_STATUS, String::new()),
                    };
                    return TransportEvent::Closed { code, reason };
                }
                // Ping replies are queued by tungstenite itself.
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => continue,
                Some(Err(e)) => return classify_error(e),
                None => {
                    return TransportEvent::Closed {
                        code: CloseCode::ABNORMAL,
                        reason: "stream ended".to_string(),
                    };
                }
            }
        }
    }

    async fn close(&mut self, code: CloseCode, reason: &str) -> Result<()> {
        let frame = CloseFrame { code: code.0.into(), reason: reason.to_string().into() };
        match self.stream.close(Some(frame)).await {
            Ok(()) | Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Dropped connections behave like a browser's close 1006; anything else is a failure.
fn classify_error(error: tungstenite::Error) -> TransportEvent {
    match error {
        tungstenite::Error::ConnectionClosed
        | tungstenite::Error::AlreadyClosed
        | tungstenite::Error::Io(_)
        | tungstenite::Error::Protocol(
            tungstenite::error::ProtocolError::ResetWithoutClosingHandshake,
        ) => TransportEvent::Closed { code: CloseCode::ABNORMAL, reason: error.to_string() },
        other => TransportEvent::Failed(other.to_string()),
    }
}
