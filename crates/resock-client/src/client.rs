use std::collections::VecDeque;

use bytes::Bytes;
use resock_frame::{FrameParser, JsonTranslator, Translator};
use resock_transport::{
    ConnectionEvent, Connector, Endpoint, ResilientConnection, SocketConnector, Timer, TokioTimer,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::event::ClientEvent;

/// Sends and receives framed messages over a [`ResilientConnection`].
///
/// Messages sent while disconnected are encoded immediately and queued; the
/// queue is drained in order as soon as a connection is established. Frames
/// still buffered on a transport that dies are put back at the front of the
/// queue and sent again, whole, on the next connection.
///
/// Like the connection underneath, the client only makes progress while
/// [`next_event`](Self::next_event) or [`flush`](Self::flush) is awaited.
/// Use [`spawn`](Self::spawn) to drive it from a background task.
pub struct MessageClient<
    X: Translator = JsonTranslator,
    C: Connector = SocketConnector,
    T: Timer = TokioTimer,
> {
    connection: ResilientConnection<C, T>,
    parser: FrameParser<X>,
    outbound: VecDeque<Bytes>,
    config: ClientConfig,
}

impl<M: Serialize + DeserializeOwned> MessageClient<JsonTranslator<M>> {
    /// Connect to `endpoint` with JSON messages over real sockets.
    pub fn connect(endpoint: Endpoint, config: ClientConfig) -> Self {
        Self::with_parts(
            endpoint,
            config,
            SocketConnector,
            TokioTimer,
            JsonTranslator::new(),
        )
    }
}

impl<X: Translator, C: Connector, T: Timer> MessageClient<X, C, T> {
    /// Create a client with explicit connector, timer and translator.
    pub fn with_parts(
        endpoint: Endpoint,
        config: ClientConfig,
        connector: C,
        timer: T,
        translator: X,
    ) -> Self {
        let connection =
            ResilientConnection::with_parts(endpoint, config.connection_config(), connector, timer);
        let parser = FrameParser::with_config(translator, config.frame_config());
        Self {
            connection,
            parser,
            outbound: VecDeque::new(),
            config,
        }
    }

    /// Encode and send `message`, or queue it until the next connection.
    ///
    /// Encoding happens here, so an unencodable message is rejected
    /// immediately and never enters the queue.
    pub fn send(&mut self, message: &X::Message) -> Result<()> {
        if self.connection.is_destroyed() {
            return Err(ClientError::InvalidState("client destroyed"));
        }
        let frame = self.parser.encode(message)?;

        self.reclaim_unsent();
        if self.connection.is_connected() && self.outbound.is_empty() {
            self.connection.write(frame)?;
        } else {
            self.outbound.push_back(frame);
            debug!(queued = self.outbound.len(), "not connected; message queued");
        }
        Ok(())
    }

    /// Wait for the next event.
    ///
    /// Returns `None` once [`ClientEvent::Closed`] has been delivered.
    /// Cancel-safe.
    pub async fn next_event(&mut self) -> Option<ClientEvent<X::Message>> {
        loop {
            match self.connection.next_event().await? {
                ConnectionEvent::Connected => {
                    self.parser.reset();
                    self.drain_outbound();
                    return Some(ClientEvent::Connected);
                }
                ConnectionEvent::Disconnected(cause) => {
                    self.reclaim_unsent();
                    return Some(ClientEvent::Disconnected(cause));
                }
                ConnectionEvent::Data(chunk) => {
                    match self.parser.handle_data(chunk, &mut self.connection) {
                        Ok(Some(message)) => return Some(ClientEvent::Message(message)),
                        Ok(None) => continue,
                        Err(err) => {
                            debug!(error = %err, "rejected incoming frame");
                            return Some(ClientEvent::Error(err.into()));
                        }
                    }
                }
                ConnectionEvent::Closed => return Some(ClientEvent::Closed),
            }
        }
    }

    /// Write everything handed to the current connection.
    ///
    /// Returns immediately while disconnected; queued messages go out on
    /// the next connection.
    pub async fn flush(&mut self) -> Result<()> {
        if self.connection.is_destroyed() {
            return Err(ClientError::InvalidState("client destroyed"));
        }
        if !self.connection.is_connected() {
            return Ok(());
        }
        if let Err(err) = self.connection.flush().await {
            self.reclaim_unsent();
            return Err(err.into());
        }
        Ok(())
    }

    /// Close the connection and stop reconnecting. Queued messages are
    /// discarded.
    pub fn destroy(&mut self) {
        if self.connection.is_destroyed() {
            return;
        }
        self.reclaim_unsent();
        if !self.outbound.is_empty() {
            warn!(
                dropped = self.outbound.len(),
                endpoint = %self.connection.endpoint(),
                "destroying client with undelivered messages"
            );
        }
        self.outbound.clear();
        self.parser.reset();
        self.connection.destroy();
    }

    /// Messages waiting for a connection.
    pub fn queued(&self) -> usize {
        self.outbound.len()
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    pub fn is_destroyed(&self) -> bool {
        self.connection.is_destroyed()
    }

    pub fn connection(&self) -> &ResilientConnection<C, T> {
        &self.connection
    }

    pub fn endpoint(&self) -> &Endpoint {
        self.connection.endpoint()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Move frames left on a dead transport to the front of the queue.
    fn reclaim_unsent(&mut self) {
        let unsent = self.connection.take_unsent();
        if unsent.is_empty() {
            return;
        }
        debug!(count = unsent.len(), "re-queueing frames from lost connection");
        for frame in unsent.into_iter().rev() {
            self.outbound.push_front(frame);
        }
    }

    fn drain_outbound(&mut self) {
        self.reclaim_unsent();
        if self.outbound.is_empty() {
            return;
        }
        debug!(count = self.outbound.len(), "sending queued messages");
        while let Some(frame) = self.outbound.pop_front() {
            if let Err(err) = self.connection.write(frame.clone()) {
                debug!(error = %err, "connection lost while draining queue");
                self.outbound.push_front(frame);
                return;
            }
        }
    }
}

impl<X: Translator, C: Connector, T: Timer> std::fmt::Debug for MessageClient<X, C, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageClient")
            .field("connection", &self.connection)
            .field("queued", &self.outbound.len())
            .finish()
    }
}
