//! WebSocket implementation of the primary transport.

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::warn;
use url::Url;

use super::{NotificationStream, StreamFrame, StreamTransport, TransportError};
use crate::objects::Notification;

/// Connects to `GET /api/v1/users/{user_id}/notifications/ws`.
#[derive(Debug, Clone)]
pub struct WsStreamTransport {
    base_url: Url,
}

impl WsStreamTransport {
    /// `base_url` is the HTTP(S) root of the server; the scheme is mapped
    /// to `ws`/`wss` when connecting.
    pub fn new(base_url: Url) -> Self {
        Self { base_url }
    }

    fn stream_url(&self, user_id: &str) -> Result<Url, TransportError> {
        let mut url = self.base_url.join(&format!(
            "/api/v1/users/{}/notifications/ws",
            urlencoding::encode(user_id)
        ))?;
        let scheme = match url.scheme() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            other => return Err(TransportError::UnsupportedScheme(other.to_owned())),
        };
        url.set_scheme(scheme)
            .map_err(|()| TransportError::UnsupportedScheme(scheme.to_owned()))?;
        Ok(url)
    }
}

#[async_trait]
impl StreamTransport for WsStreamTransport {
    async fn connect(&self, user_id: &str) -> Result<Box<dyn NotificationStream>, TransportError> {
        let url = self.stream_url(user_id)?;
        let (socket, _response) = tokio_tungstenite::connect_async(url.as_str()).await?;
        Ok(Box::new(WsNotificationStream { socket }))
    }
}

struct WsNotificationStream {
    socket: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl NotificationStream for WsNotificationStream {
    async fn next_frame(&mut self) -> Result<StreamFrame, TransportError> {
        loop {
            match self.socket.next().await {
                None | Some(Ok(Message::Close(_))) => return Err(TransportError::Closed),
                Some(Err(e)) => return Err(e.into()),
                Some(Ok(Message::Text(text))) => {
                    match serde_json::from_str::<Notification>(&text) {
                        Ok(notification) => return Ok(StreamFrame::Notification(notification)),
                        // A single malformed frame is not worth a reconnect.
                        Err(e) => warn!(error = %e, "Skipping malformed stream frame"),
                    }
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => return Ok(StreamFrame::Heartbeat),
                Some(Ok(Message::Binary(_) | Message::Frame(_))) => {}
            }
        }
    }
}
