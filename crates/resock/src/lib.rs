//! Self-healing socket connections with newline-delimited JSON messaging.
//!
//! resock keeps a client connected to a TCP or Unix socket endpoint through
//! server restarts and network drops, frames messages as one JSON document
//! per line, and queues outgoing messages until a connection is available.
//!
//! # Crate Structure
//!
//! - [`transport`]: Endpoints, sockets and the reconnecting connection
//! - [`frame`]: Delimiter framing, push-back parsing and translators
//! - [`client`]: Message client with an outbound queue (behind `client` feature)

/// Re-export transport types.
pub mod transport {
    pub use resock_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use resock_frame::*;
}

/// Re-export client types (requires `client` feature).
#[cfg(feature = "client")]
pub mod client {
    pub use resock_client::*;
}
