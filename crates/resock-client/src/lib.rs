//! Reconnecting message client.
//!
//! This is the "just works" layer. Point a [`MessageClient`] at an endpoint,
//! send messages whether or not the peer is up yet, and receive decoded
//! messages plus connection lifecycle events. Messages sent while
//! disconnected are queued and delivered in order after the next connect.

pub mod client;
pub mod config;
pub mod error;
pub mod event;
pub mod handle;

pub use client::MessageClient;
pub use config::ClientConfig;
pub use error::{ClientError, Result};
pub use event::ClientEvent;
pub use handle::ClientHandle;
