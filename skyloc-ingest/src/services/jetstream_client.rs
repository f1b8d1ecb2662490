//! Bluesky Jetstream websocket feed
//!
//! Jetstream delivers one JSON event per text frame. Control frames are
//! handled by the websocket layer and never surface as messages.

use crate::pipeline::accept::{FeedError, FeedSource};
use async_trait::async_trait;
use futures::StreamExt;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info};

pub struct JetstreamFeed {
    socket: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl JetstreamFeed {
    pub async fn connect(url: &str) -> Result<Self, FeedError> {
        info!("Connecting to upstream feed: {}", url);

        let (socket, response) = connect_async(url).await.map_err(|e| FeedError::Connect {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        info!("Upstream feed connected (HTTP {})", response.status());
        Ok(Self { socket })
    }
}

#[async_trait]
impl FeedSource for JetstreamFeed {
    async fn next_message(&mut self) -> Result<Option<String>, FeedError> {
        while let Some(frame) = self.socket.next().await {
            let frame = frame.map_err(|e| FeedError::Transport(e.to_string()))?;
            if let Some(message) = frame_text(frame) {
                return Ok(Some(message));
            }
        }

        Ok(None)
    }
}

/// Message payload carried by a frame, if any
///
/// A close frame ends the stream on the next read, so it carries nothing.
fn frame_text(frame: Message) -> Option<String> {
    match frame {
        Message::Text(text) => Some(text),
        Message::Binary(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
        Message::Close(close) => {
            debug!("Upstream feed sent close frame: {:?}", close);
            None
        }
        Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => None,
    }
}
