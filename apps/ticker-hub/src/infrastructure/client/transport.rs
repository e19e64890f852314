//! Channel Transport
//!
//! The channel manager talks to the hub through a [`ChannelLink`]: a sink of
//! outbound text frames and a stream of inbound ones. [`WebSocketConnector`]
//! opens real links; tests plug in in-memory connectors.

use std::pin::Pin;

use async_trait::async_trait;
use futures::{Sink, SinkExt, Stream, StreamExt, future};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

/// Client link error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    /// The connection could not be opened.
    #[error("connect failed: {message}")]
    Connect {
        /// Error details.
        message: String,
    },

    /// The open connection failed.
    #[error("transport error: {message}")]
    Transport {
        /// Error details.
        message: String,
    },

    /// The link is closed.
    #[error("channel closed")]
    Closed,
}

/// Outbound half of a link.
pub type FrameSink = Pin<Box<dyn Sink<String, Error = ChannelError> + Send>>;

/// Inbound half of a link.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<String, ChannelError>> + Send>>;

/// An open bidirectional text channel.
pub struct ChannelLink {
    /// Outbound frames.
    pub sink: FrameSink,
    /// Inbound frames. Ends when the peer closes.
    pub stream: FrameStream,
}

impl std::fmt::Debug for ChannelLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelLink").finish_non_exhaustive()
    }
}

impl ChannelLink {
    /// Wrap a sink and stream pair.
    pub fn new<Si, St>(sink: Si, stream: St) -> Self
    where
        Si: Sink<String, Error = ChannelError> + Send + 'static,
        St: Stream<Item = Result<String, ChannelError>> + Send + 'static,
    {
        Self {
            sink: Box::pin(sink),
            stream: Box::pin(stream),
        }
    }
}

/// Port for opening links to the hub.
#[async_trait]
pub trait ChannelConnector: Send + Sync {
    /// Open a new link.
    ///
    /// # Errors
    ///
    /// Returns error if the connection cannot be established.
    async fn connect(&self) -> Result<ChannelLink, ChannelError>;
}

/// Connector for the hub's WebSocket endpoint.
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    url: String,
}

impl WebSocketConnector {
    /// Create a connector for `url` (`ws://` or `wss://`).
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    /// Target URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl ChannelConnector for WebSocketConnector {
    async fn connect(&self) -> Result<ChannelLink, ChannelError> {
        tracing::debug!(url = %self.url, "Opening WebSocket");
        let (socket, _response) =
            connect_async(self.url.as_str())
                .await
                .map_err(|e| ChannelError::Connect {
                    message: e.to_string(),
                })?;

        let (write, read) = socket.split();

        let sink = write
            .sink_map_err(|e| ChannelError::Transport {
                message: e.to_string(),
            })
            .with(|text: String| future::ready(Ok::<_, ChannelError>(Message::Text(text.into()))));

        // Control frames are answered by tungstenite itself.
        let stream = read.filter_map(|item| {
            future::ready(match item {
                Ok(Message::Text(text)) => Some(Ok(text.as_str().to_owned())),
                Ok(_) => None,
                Err(e) => Some(Err(ChannelError::Transport {
                    message: e.to_string(),
                })),
            })
        });

        Ok(ChannelLink::new(sink, stream))
    }
}
