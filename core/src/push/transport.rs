/// Push channel transport
///
/// The connection driver only talks to these traits, so tests can script a
/// channel in memory while production uses a websocket.
use crate::error::{NotifyError, Result};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::debug;

/// An open, bidirectional push channel
#[async_trait]
pub trait PushChannel: Send {
    /// Send one text frame
    async fn send_text(&mut self, text: String) -> Result<()>;

    /// Next inbound frame payload; `None` once the channel has closed.
    ///
    /// Must be cancel-safe: the driver polls it inside `tokio::select!`.
    async fn next_frame(&mut self) -> Option<Result<Vec<u8>>>;

    /// Close the channel; errors are not interesting at this point
    async fn close(&mut self);
}

/// Opens push channels
#[async_trait]
pub trait PushTransport: Send + Sync {
    async fn connect(&self, url: &str) -> Result<Box<dyn PushChannel>>;
}

/// Websocket transport over tokio-tungstenite
#[derive(Debug, Clone, Copy, Default)]
pub struct WsTransport;

#[async_trait]
impl PushTransport for WsTransport {
    async fn connect(&self, url: &str) -> Result<Box<dyn PushChannel>> {
        let (stream, response) = connect_async(url).await?;
        debug!("Websocket handshake with {} returned {}", url, response.status());
        Ok(Box::new(WsChannel { stream }))
    }
}

struct WsChannel {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl PushChannel for WsChannel {
    async fn send_text(&mut self, text: String) -> Result<()> {
        self.stream.send(Message::Text(text)).await?;
        Ok(())
    }

    async fn next_frame(&mut self) -> Option<Result<Vec<u8>>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text.into_bytes())),
                Ok(Message::Binary(data)) => return Some(Ok(data)),
                Ok(Message::Close(frame)) => {
                    debug!("Server closed push channel: {:?}", frame);
                    return None;
                }
                // Ping/pong are answered by tungstenite itself
                Ok(_) => continue,
                Err(e) => return Some(Err(NotifyError::WebSocket(e))),
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.close(None).await {
            debug!("Websocket close: {}", e);
        }
    }
}
