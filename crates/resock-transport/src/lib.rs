//! Self-healing stream connections.
//!
//! Provides the byte-stream layer of resock:
//! - [`Endpoint`] addressing for TCP and Unix domain sockets
//! - [`SocketStream`] / [`SocketListener`] over tokio sockets
//! - [`ResilientConnection`], which reconnects after transient failures with
//!   a fixed delay and supports pushing read bytes back onto the stream
//!
//! This is the lowest layer of resock. Framing and the message client build
//! on top of the [`ConnectionEvent`] stream and the [`PushBack`] capability.

pub mod connection;
pub mod connector;
pub mod endpoint;
pub mod error;
pub mod listener;
pub mod stream;

pub use connection::{
    ConnectionConfig, ConnectionEvent, ConnectionState, PushBack, ResilientConnection,
    DEFAULT_RECONNECT_DELAY,
};
pub use connector::{Connector, SocketConnector, Timer, TokioTimer};
pub use endpoint::{Endpoint, DEFAULT_HOST};
pub use error::{Result, TransportError};
pub use listener::SocketListener;
pub use stream::SocketStream;
