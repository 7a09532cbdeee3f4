/// Errors that can occur in message client operations.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] resock_transport::TransportError),

    /// Frame-level error: a message could not be encoded, or a received
    /// frame could not be decoded.
    #[error("frame error: {0}")]
    Frame(#[from] resock_frame::FrameError),

    /// The operation is not valid in the client's current state.
    #[error("invalid state: {0}")]
    InvalidState(&'static str),
}

impl ClientError {
    /// True when a peer sent bytes that are not a valid frame.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(self, Self::Frame(err) if err.is_protocol_violation())
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
