use std::io;
use std::time::Duration;

use futures_core::future::BoxFuture;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

use crate::endpoint::Endpoint;
use crate::stream::SocketStream;

/// Opens transport streams for a [`ResilientConnection`](crate::ResilientConnection).
///
/// The returned future must not borrow `self` or the endpoint; a connection
/// keeps it across calls to `next_event` until it resolves.
pub trait Connector: Send + Sync + 'static {
    /// The connected byte stream.
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// Start one connection attempt.
    fn connect(&self, endpoint: &Endpoint) -> BoxFuture<'static, io::Result<Self::Stream>>;
}

/// Connects real TCP and Unix domain sockets.
#[derive(Debug, Clone, Copy, Default)]
pub struct SocketConnector;

impl Connector for SocketConnector {
    type Stream = SocketStream;

    fn connect(&self, endpoint: &Endpoint) -> BoxFuture<'static, io::Result<SocketStream>> {
        let endpoint = endpoint.clone();
        Box::pin(async move {
            match endpoint {
                Endpoint::Tcp { host, port } => {
                    let stream = tokio::net::TcpStream::connect((host.as_str(), port)).await?;
                    debug!(%host, port, "connected tcp stream");
                    Ok(SocketStream::from_tcp(stream))
                }
                #[cfg(unix)]
                Endpoint::Unix(path) => {
                    let stream = tokio::net::UnixStream::connect(&path).await?;
                    debug!(?path, "connected unix domain socket");
                    Ok(SocketStream::from_unix(stream))
                }
            }
        })
    }
}

/// Sleeps between reconnect attempts.
///
/// Injected into [`ResilientConnection`](crate::ResilientConnection) so retry
/// timing can be observed and controlled in tests.
pub trait Timer: Send + Sync + 'static {
    /// A future that resolves once `duration` has elapsed.
    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()>;
}

/// Wall-clock timer backed by `tokio::time`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioTimer;

impl Timer for TokioTimer {
    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
        Box::pin(tokio::time::sleep(duration))
    }
}
