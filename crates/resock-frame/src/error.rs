/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The frame bytes are not a valid encoding of any message.
    #[error("malformed frame ({len} bytes): {source}")]
    Decode {
        len: usize,
        source: serde_json::Error,
    },

    /// A delimiter arrived with no payload in front of it.
    #[error("empty frame")]
    EmptyFrame,

    /// The message could not be encoded.
    #[error("failed to encode message: {0}")]
    Encode(#[source] serde_json::Error),

    /// An encoded payload contains the frame delimiter.
    #[error("payload contains the frame delimiter at byte {offset}")]
    DelimiterInPayload { offset: usize },

    /// Buffered bytes exceeded the configured limit without a delimiter.
    #[error("frame too large ({size} bytes buffered, max {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// Excess bytes could not be returned to the connection.
    #[error("push-back failed: {0}")]
    PushBack(#[from] resock_transport::TransportError),

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FrameError {
    /// True for errors caused by the bytes a peer sent (as opposed to local
    /// encoding or I/O failures).
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            Self::Decode { .. } | Self::EmptyFrame | Self::FrameTooLarge { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
