use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use url::Url;

#[derive(Debug, Error)]
pub enum RealtimeError {
    #[error("socket error: {0}")]
    Socket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("socket closed")]
    Closed,
    #[error("no tokio runtime available to drive the socket")]
    NoRuntime,
}

/// Opens socket connections. Swappable so the notifier can run over an
/// in-process transport.
#[async_trait]
pub trait SocketTransport: Send + Sync + 'static {
    async fn open(&self, url: &Url) -> Result<Box<dyn SocketStream>, RealtimeError>;
}

#[async_trait]
pub trait SocketStream: Send {
    async fn send_text(&mut self, text: String) -> Result<(), RealtimeError>;

    /// `None` once the server has closed the connection.
    async fn next_text(&mut self) -> Option<Result<String, RealtimeError>>;

    async fn close(&mut self) -> Result<(), RealtimeError>;
}

/// WebSocket transport over `tokio-tungstenite`.
#[derive(Debug, Default, Clone, Copy)]
pub struct WsTransport;

#[async_trait]
impl SocketTransport for WsTransport {
    async fn open(&self, url: &Url) -> Result<Box<dyn SocketStream>, RealtimeError> {
        let (inner, _response) = tokio_tungstenite::connect_async(url.as_str()).await?;
        Ok(Box::new(WsStream { inner }))
    }
}

struct WsStream {
    inner: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl SocketStream for WsStream {
    async fn send_text(&mut self, text: String) -> Result<(), RealtimeError> {
        self.inner.send(Message::Text(text.into())).await?;
        Ok(())
    }

    async fn next_text(&mut self) -> Option<Result<String, RealtimeError>> {
        loop {
            match self.inner.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text.as_str().to_owned())),
                Ok(Message::Close(frame)) => {
                    tracing::debug!(?frame, "server closed socket");
                    return None;
                }
                // tungstenite answers pings itself; binary frames carry nothing we use.
                Ok(_) => continue,
                Err(e) => return Some(Err(e.into())),
            }
        }
    }

    async fn close(&mut self) -> Result<(), RealtimeError> {
        self.inner.close(None).await?;
        Ok(())
    }
}
