//! Worker-side request/reply channel.
//!
//! A `Connector` opens fresh `Connection`s; a connection carries one
//! request and its reply at a time. The agent wraps every exchange in its
//! own timeout.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::debug;

use crate::error::ChannelError;

/// One open request/reply connection.
#[async_trait]
pub trait Connection: Send {
    /// Send one request and wait for its reply.
    async fn exchange(&mut self, request: &str) -> Result<String, ChannelError>;

    /// Close the connection. Errors are ignored.
    async fn close(&mut self);
}

/// Opens connections to the dispatcher.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn Connection>, ChannelError>;
}

/// WebSocket connector: one text frame out, one text frame back.
#[derive(Debug, Clone)]
pub struct WsConnector {
    url: String,
}

impl WsConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self) -> Result<Box<dyn Connection>, ChannelError> {
        let (stream, _response) = connect_async(self.url.as_str()).await.map_err(|e| {
            ChannelError::ConnectFailed {
                url: self.url.clone(),
                reason: e.to_string(),
            }
        })?;
        debug!(url = %self.url, "WebSocket connected");
        Ok(Box::new(WsConnection { stream }))
    }
}

/// An open WebSocket to the dispatcher.
pub struct WsConnection {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Connection for WsConnection {
    async fn exchange(&mut self, request: &str) -> Result<String, ChannelError> {
        self.stream
            .send(Message::Text(request.to_string().into()))
            .await
            .map_err(|e| ChannelError::SendFailed {
                reason: e.to_string(),
            })?;

        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => return Ok(text.as_str().to_string()),
                Some(Ok(Message::Close(frame))) => {
                    return Err(ChannelError::Disconnected {
                        reason: frame
                            .map(|f| f.reason.as_str().to_string())
                            .unwrap_or_else(|| "closed by dispatcher".to_string()),
                    });
                }
                // Control frames are answered by tungstenite itself.
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    return Err(ChannelError::Disconnected {
                        reason: e.to_string(),
                    });
                }
                None => {
                    return Err(ChannelError::Disconnected {
                        reason: "stream ended".to_string(),
                    });
                }
            }
        }
    }

    async fn close(&mut self) {
        let _ = self.stream.close(None).await;
    }
}
