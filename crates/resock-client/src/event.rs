use resock_transport::TransportError;

use crate::error::ClientError;

/// Notifications produced by a [`MessageClient`](crate::MessageClient).
#[derive(Debug)]
pub enum ClientEvent<M> {
    /// A connection was established. Queued messages have been handed to it.
    Connected,
    /// The connection was lost; reconnection is already under way.
    Disconnected(TransportError),
    /// A decoded message from the peer.
    Message(M),
    /// A received frame was rejected. The connection stays up.
    Error(ClientError),
    /// The client was destroyed. Always the last event.
    Closed,
}

impl<M> ClientEvent<M> {
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }
}
