//! Configuration for message clients.

use std::time::Duration;

use resock_frame::{FrameConfig, DEFAULT_MAX_FRAME};
use resock_transport::{ConnectionConfig, DEFAULT_RECONNECT_DELAY};

/// Configuration for a [`MessageClient`](crate::MessageClient).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Wait between a failed connection attempt and the next one.
    pub reconnect_delay: Duration,

    /// Largest accepted incoming frame, in bytes.
    pub max_frame_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            max_frame_size: DEFAULT_MAX_FRAME,
        }
    }
}

impl ClientConfig {
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    pub fn with_max_frame_size(mut self, size: usize) -> Self {
        self.max_frame_size = size;
        self
    }

    pub fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig {
            reconnect_delay: self.reconnect_delay,
        }
    }

    pub fn frame_config(&self) -> FrameConfig {
        FrameConfig {
            max_frame_size: self.max_frame_size,
        }
    }
}
