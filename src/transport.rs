//! Transport seam between the client and a concrete WebSocket stack.
//!
//! The client only ever sees a [`Socket`]: a boxed sink of outbound messages
//! and a boxed stream of inbound ones. Production uses tokio-tungstenite;
//! tests plug in scripted connectors.

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures::{Sink, SinkExt, Stream, StreamExt, TryStreamExt};
use tokio_tungstenite::connect_async;

pub use tokio_tungstenite::tungstenite::Message;

use crate::error::TransportError;

pub type FrameSink = Pin<Box<dyn Sink<Message, Error = TransportError> + Send>>;
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Message, TransportError>> + Send>>;

/// An open, exclusively owned socket.
pub struct Socket {
    pub sink: FrameSink,
    pub stream: FrameStream,
}

impl Socket {
    #[must_use]
    pub fn new(sink: FrameSink, stream: FrameStream) -> Self {
        Self { sink, stream }
    }
}

/// Opens sockets to a URL. One call is one handshake attempt.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self, url: &str) -> Result<Socket, TransportError>;
}

/// Production connector backed by `tokio_tungstenite::connect_async`.
///
/// `wss://` URLs go through rustls with the webpki root store.
#[derive(Debug, Clone)]
pub struct TungsteniteConnector {
    connect_timeout: Duration,
}

impl TungsteniteConnector {
    #[must_use]
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

#[async_trait]
impl Connector for TungsteniteConnector {
    async fn connect(&self, url: &str) -> Result<Socket, TransportError> {
        let (stream, _) = tokio::time::timeout(self.connect_timeout, connect_async(url))
            .await
            .map_err(|_| {
                TransportError::new(format!("handshake timed out after {}ms", self.connect_timeout.as_millis()))
            })?
            .map_err(|e| TransportError::from_chain(&e))?;

        let (sink, stream) = stream.split();
        let sink = sink.sink_map_err(|e| TransportError::from_chain(&e));
        let stream = stream.map_err(|e| TransportError::from_chain(&e));
        Ok(Socket::new(Box::pin(sink), Box::pin(stream)))
    }
}

#[cfg(test)]
#[path = "transport_test.rs"]
mod tests;
