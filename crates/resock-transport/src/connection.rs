use std::collections::VecDeque;
use std::future::poll_fn;
use std::io;
use std::pin::Pin;
use std::task::{ready, Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use futures_core::future::BoxFuture;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tracing::{debug, info};

use crate::connector::{Connector, SocketConnector, Timer, TokioTimer};
use crate::endpoint::Endpoint;
use crate::error::{Result, TransportError};

const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Delay between a failed connection attempt and the next one.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(100);

/// Configuration for a [`ResilientConnection`].
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Fixed wait after a failed attempt. There is no backoff and no retry cap.
    pub reconnect_delay: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
        }
    }
}

/// Lifecycle state of a [`ResilientConnection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No transport and no attempt in flight.
    Disconnected,
    /// A connection attempt (or the delay before the next one) is in flight.
    Connecting,
    /// A transport is open and usable.
    Connected,
    /// Terminal. No further attempts, events or writes.
    Destroyed,
}

/// Notifications produced by [`ResilientConnection::next_event`].
#[derive(Debug)]
pub enum ConnectionEvent {
    /// A transport was established (first connect or any reconnect).
    Connected,
    /// The live transport failed or was closed by the remote end.
    /// A new attempt is already under way.
    Disconnected(TransportError),
    /// Raw bytes from the active transport, in arrival order.
    Data(Bytes),
    /// The connection was destroyed. Always the last event.
    Closed,
}

/// Capability to return already-read bytes to the front of a stream.
///
/// Pushed-back chunks are redelivered before anything else is read.
pub trait PushBack {
    /// Push `chunk` back so it is the next data delivered.
    fn unshift(&mut self, chunk: Bytes) -> Result<()>;
}

/// In-memory stream of pending chunks, consumed from the front.
impl PushBack for VecDeque<Bytes> {
    fn unshift(&mut self, chunk: Bytes) -> Result<()> {
        if !chunk.is_empty() {
            self.push_front(chunk);
        }
        Ok(())
    }
}

enum Pending<S> {
    Idle,
    Attempt(BoxFuture<'static, io::Result<S>>),
    Delay(BoxFuture<'static, ()>),
}

struct ActiveTransport<S> {
    stream: S,
    unread: VecDeque<Bytes>,
    outgoing: VecDeque<Bytes>,
    /// Bytes of `outgoing.front()` already accepted by the stream.
    written: usize,
    needs_flush: bool,
}

impl<S: AsyncRead + AsyncWrite + Unpin> ActiveTransport<S> {
    fn new(stream: S) -> Self {
        Self {
            stream,
            unread: VecDeque::new(),
            outgoing: VecDeque::new(),
            written: 0,
            needs_flush: false,
        }
    }

    fn poll_drain(&mut self, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        while let Some(front) = self.outgoing.front() {
            let n = ready!(Pin::new(&mut self.stream).poll_write(cx, &front[self.written..]))?;
            if n == 0 {
                return Poll::Ready(Err(io::ErrorKind::WriteZero.into()));
            }
            self.written += n;
            self.needs_flush = true;
            if self.written == front.len() {
                self.outgoing.pop_front();
                self.written = 0;
            }
        }

        if self.needs_flush {
            ready!(Pin::new(&mut self.stream).poll_flush(cx))?;
            self.needs_flush = false;
        }
        Poll::Ready(Ok(()))
    }

    fn poll_io(&mut self, cx: &mut Context<'_>) -> Poll<Result<Bytes>> {
        if let Some(chunk) = self.unread.pop_front() {
            return Poll::Ready(Ok(chunk));
        }

        if let Poll::Ready(Err(err)) = self.poll_drain(cx) {
            return Poll::Ready(Err(err.into()));
        }

        let mut chunk = [0u8; READ_CHUNK_SIZE];
        let mut buf = ReadBuf::new(&mut chunk);
        match ready!(Pin::new(&mut self.stream).poll_read(cx, &mut buf)) {
            Ok(()) if buf.filled().is_empty() => Poll::Ready(Err(TransportError::EndOfStream)),
            Ok(()) => Poll::Ready(Ok(Bytes::copy_from_slice(buf.filled()))),
            Err(err) => Poll::Ready(Err(err.into())),
        }
    }

    /// Frames not completely written, oldest first. A partially written
    /// frame is returned whole.
    fn into_unsent(self) -> VecDeque<Bytes> {
        self.outgoing
    }
}

/// A stream connection that keeps itself alive.
///
/// Created connecting. A failed attempt is retried after
/// [`ConnectionConfig::reconnect_delay`], forever, until [`destroy`](Self::destroy).
/// A live transport that errors or reaches end-of-stream produces
/// [`ConnectionEvent::Disconnected`] and an immediate new attempt.
///
/// The connection is driven by awaiting [`next_event`](Self::next_event);
/// connection attempts, retry delays, reads and buffered writes only make
/// progress while it is being polled. `next_event` is cancel-safe.
pub struct ResilientConnection<C: Connector = SocketConnector, T: Timer = TokioTimer> {
    endpoint: Endpoint,
    config: ConnectionConfig,
    connector: C,
    timer: T,
    state: ConnectionState,
    transport: Option<ActiveTransport<C::Stream>>,
    pending: Pending<C::Stream>,
    events: VecDeque<ConnectionEvent>,
    unsent: VecDeque<Bytes>,
    destroyed: bool,
    attempts: u64,
}

impl ResilientConnection {
    /// Connect to `endpoint` over real sockets and wall-clock time.
    pub fn new(endpoint: Endpoint, config: ConnectionConfig) -> Self {
        Self::with_parts(endpoint, config, SocketConnector, TokioTimer)
    }
}

impl<C: Connector, T: Timer> ResilientConnection<C, T> {
    /// Create a connection with explicit connector and timer. The first
    /// attempt starts immediately.
    pub fn with_parts(endpoint: Endpoint, config: ConnectionConfig, connector: C, timer: T) -> Self {
        let mut connection = Self {
            endpoint,
            config,
            connector,
            timer,
            state: ConnectionState::Disconnected,
            transport: None,
            pending: Pending::Idle,
            events: VecDeque::new(),
            unsent: VecDeque::new(),
            destroyed: false,
            attempts: 0,
        };
        connection.connect();
        connection
    }

    /// Start connecting. No-op while connecting, connected or destroyed.
    pub fn connect(&mut self) {
        if self.destroyed {
            return;
        }
        if self.state == ConnectionState::Disconnected {
            self.start_attempt();
        }
    }

    /// Wait for the next event.
    ///
    /// Returns `None` once [`ConnectionEvent::Closed`] has been delivered.
    pub async fn next_event(&mut self) -> Option<ConnectionEvent> {
        loop {
            if let Some(event) = self.events.pop_front() {
                return Some(event);
            }

            match self.state {
                ConnectionState::Destroyed => return None,
                ConnectionState::Disconnected => self.start_attempt(),
                ConnectionState::Connecting => self.advance_connect().await,
                ConnectionState::Connected => {
                    if let Some(chunk) = self.pump().await {
                        return Some(ConnectionEvent::Data(chunk));
                    }
                }
            }
        }
    }

    /// Queue one frame for writing on the active transport.
    ///
    /// Bytes are written while [`next_event`](Self::next_event) or
    /// [`flush`](Self::flush) is being awaited.
    pub fn write(&mut self, frame: Bytes) -> Result<()> {
        match (self.state, self.transport.as_mut()) {
            (ConnectionState::Connected, Some(active)) => {
                if !frame.is_empty() {
                    active.outgoing.push_back(frame);
                }
                Ok(())
            }
            _ => Err(TransportError::InvalidState(
                "write requires an active transport",
            )),
        }
    }

    /// Write every queued frame to the active transport.
    ///
    /// A failure tears the transport down exactly like a read failure.
    pub async fn flush(&mut self) -> Result<()> {
        let result = poll_fn(|cx| match self.transport.as_mut() {
            Some(active) => active.poll_drain(cx),
            None => Poll::Ready(Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "no active transport",
            ))),
        })
        .await;

        match result {
            Ok(()) => Ok(()),
            Err(_) if self.state != ConnectionState::Connected => Err(
                TransportError::InvalidState("flush requires an active transport"),
            ),
            Err(err) => {
                let reported = io::Error::new(err.kind(), err.to_string());
                self.teardown(TransportError::Io(err));
                Err(TransportError::Io(reported))
            }
        }
    }

    /// Close the transport and stop reconnecting. Emits
    /// [`ConnectionEvent::Closed`] once; later calls are no-ops.
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;
        self.pending = Pending::Idle;
        if let Some(active) = self.transport.take() {
            drop(active);
        }
        self.unsent.clear();
        self.events.clear();
        self.state = ConnectionState::Destroyed;
        self.events.push_back(ConnectionEvent::Closed);
        info!(endpoint = %self.endpoint, attempts = self.attempts, "connection destroyed");
    }

    /// Frames that were queued on a transport that has since died, oldest first.
    pub fn take_unsent(&mut self) -> VecDeque<Bytes> {
        std::mem::take(&mut self.unsent)
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// True while a transport is live and writable.
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// True while an attempt or its retry delay is outstanding.
    pub fn is_connecting(&self) -> bool {
        self.state == ConnectionState::Connecting
    }

    /// True once [`destroy`](Self::destroy) has been called.
    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    /// Number of connection attempts started so far.
    pub fn attempts(&self) -> u64 {
        self.attempts
    }

    /// Address every attempt connects to.
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    fn start_attempt(&mut self) {
        if self.destroyed {
            return;
        }
        if let Some(stale) = self.transport.take() {
            self.unsent.extend(stale.into_unsent());
        }

        self.state = ConnectionState::Connecting;
        self.attempts += 1;
        debug!(endpoint = %self.endpoint, attempt = self.attempts, "connecting");
        self.pending = Pending::Attempt(self.connector.connect(&self.endpoint));
    }

    async fn advance_connect(&mut self) {
        match &mut self.pending {
            Pending::Idle => self.start_attempt(),
            Pending::Attempt(attempt) => {
                let result = attempt.await;
                self.pending = Pending::Idle;
                match result {
                    Ok(stream) => self.on_connected(stream),
                    Err(err) => {
                        debug!(
                            endpoint = %self.endpoint,
                            attempt = self.attempts,
                            error = %err,
                            delay = ?self.config.reconnect_delay,
                            "connection attempt failed; retrying"
                        );
                        self.pending = Pending::Delay(self.timer.sleep(self.config.reconnect_delay));
                    }
                }
            }
            Pending::Delay(delay) => {
                delay.await;
                self.pending = Pending::Idle;
                self.start_attempt();
            }
        }
    }

    fn on_connected(&mut self, stream: C::Stream) {
        if self.destroyed {
            return;
        }
        self.transport = Some(ActiveTransport::new(stream));
        self.state = ConnectionState::Connected;
        self.events.push_back(ConnectionEvent::Connected);
        info!(endpoint = %self.endpoint, attempt = self.attempts, "connected");
    }

    async fn pump(&mut self) -> Option<Bytes> {
        let outcome = poll_fn(|cx| match self.transport.as_mut() {
            Some(active) => active.poll_io(cx),
            None => Poll::Ready(Err(TransportError::InvalidState("no active transport"))),
        })
        .await;

        match outcome {
            Ok(chunk) => Some(chunk),
            Err(cause) => {
                self.teardown(cause);
                None
            }
        }
    }

    fn teardown(&mut self, cause: TransportError) {
        info!(endpoint = %self.endpoint, error = %cause, "connection lost; reconnecting");
        self.events.push_back(ConnectionEvent::Disconnected(cause));
        self.start_attempt();
    }
}

impl<C: Connector, T: Timer> PushBack for ResilientConnection<C, T> {
    fn unshift(&mut self, chunk: Bytes) -> Result<()> {
        match (self.state, self.transport.as_mut()) {
            (ConnectionState::Connected, Some(active)) => {
                if !chunk.is_empty() {
                    debug!(len = chunk.len(), "pushing back unread bytes");
                    active.unread.push_front(chunk);
                }
                Ok(())
            }
            _ => Err(TransportError::InvalidState(
                "push-back requires an active transport",
            )),
        }
    }
}

impl<C: Connector, T: Timer> std::fmt::Debug for ResilientConnection<C, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilientConnection")
            .field("endpoint", &self.endpoint)
            .field("state", &self.state)
            .field("attempts", &self.attempts)
            .field("reconnect_delay", &self.config.reconnect_delay)
            .finish()
    }
}
