use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use resock_frame::Translator;
use resock_transport::{Connector, Timer};
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::client::MessageClient;
use crate::error::{ClientError, Result};
use crate::event::ClientEvent;

enum Command<M> {
    Send(M),
    Flush(oneshot::Sender<Result<()>>),
    Destroy,
}

/// Cloneable handle to a client running on a background task.
///
/// Dropping every handle destroys the client.
pub struct ClientHandle<M> {
    commands: mpsc::UnboundedSender<Command<M>>,
    destroyed: Arc<AtomicBool>,
}

impl<M> ClientHandle<M> {
    /// Send `message`, or queue it until the next connection.
    ///
    /// Encoding happens on the client task; an unencodable message is
    /// reported as [`ClientEvent::Error`].
    pub fn send(&self, message: M) -> Result<()> {
        if self.is_destroyed() {
            return Err(ClientError::InvalidState("client destroyed"));
        }
        self.commands
            .send(Command::Send(message))
            .map_err(|_| ClientError::InvalidState("client task has stopped"))
    }

    /// Wait until everything handed to the current connection is written.
    ///
    /// Fails with [`ClientError::InvalidState`] if the client is destroyed
    /// before the flush completes.
    pub async fn flush(&self) -> Result<()> {
        let (reply, done) = oneshot::channel();
        self.commands
            .send(Command::Flush(reply))
            .map_err(|_| ClientError::InvalidState("client task has stopped"))?;
        done.await
            .map_err(|_| ClientError::InvalidState("client task has stopped"))?
    }

    /// Destroy the client. Idempotent.
    pub fn destroy(&self) {
        if !self.destroyed.swap(true, Ordering::AcqRel) {
            let _ = self.commands.send(Command::Destroy);
        }
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }
}

impl<M> Clone for ClientHandle<M> {
    fn clone(&self) -> Self {
        Self {
            commands: self.commands.clone(),
            destroyed: Arc::clone(&self.destroyed),
        }
    }
}

impl<M> std::fmt::Debug for ClientHandle<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientHandle")
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}

impl<X, C, T> MessageClient<X, C, T>
where
    X: Translator + Send + 'static,
    X::Message: Send + 'static,
    C: Connector,
    T: Timer,
{
    /// Run the client on a tokio task.
    ///
    /// Every event is forwarded to the returned receiver, ending with
    /// [`ClientEvent::Closed`]. Must be called within a tokio runtime.
    pub fn spawn(
        self,
    ) -> (
        ClientHandle<X::Message>,
        mpsc::UnboundedReceiver<ClientEvent<X::Message>>,
    ) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let destroyed = Arc::new(AtomicBool::new(self.is_destroyed()));

        tokio::spawn(run(self, command_rx, event_tx, Arc::clone(&destroyed)));

        let handle = ClientHandle {
            commands: command_tx,
            destroyed,
        };
        (handle, event_rx)
    }
}

type FlushReply = oneshot::Sender<Result<()>>;

/// What the client produced while the task was driving it.
enum Progress<M> {
    Flushed(Result<()>),
    Event(Option<ClientEvent<M>>),
}

/// Drive the client toward the oldest pending flush, or toward its next
/// event when nobody is waiting on a flush. Cancel-safe.
async fn advance<X, C, T>(
    client: &mut MessageClient<X, C, T>,
    flushing: bool,
) -> Progress<X::Message>
where
    X: Translator,
    C: Connector,
    T: Timer,
{
    if flushing {
        Progress::Flushed(client.flush().await)
    } else {
        Progress::Event(client.next_event().await)
    }
}

fn abandon(flushes: &mut VecDeque<FlushReply>) {
    for reply in flushes.drain(..) {
        let _ = reply.send(Err(ClientError::InvalidState("client destroyed")));
    }
}

async fn run<X, C, T>(
    mut client: MessageClient<X, C, T>,
    mut commands: mpsc::UnboundedReceiver<Command<X::Message>>,
    events: mpsc::UnboundedSender<ClientEvent<X::Message>>,
    destroyed: Arc<AtomicBool>,
) where
    X: Translator,
    C: Connector,
    T: Timer,
{
    let mut handles_alive = true;
    let mut flushes: VecDeque<FlushReply> = VecDeque::new();

    loop {
        tokio::select! {
            biased;

            command = commands.recv(), if handles_alive => match command {
                Some(Command::Send(message)) => {
                    if let Err(err) = client.send(&message) {
                        let _ = events.send(ClientEvent::Error(err));
                    }
                }
                Some(Command::Flush(reply)) => flushes.push_back(reply),
                Some(Command::Destroy) => {
                    client.destroy();
                    abandon(&mut flushes);
                }
                None => {
                    debug!(endpoint = %client.endpoint(), "all client handles dropped");
                    handles_alive = false;
                    client.destroy();
                    abandon(&mut flushes);
                }
            },

            progress = advance(&mut client, !flushes.is_empty()) => match progress {
                Progress::Flushed(result) => {
                    if let Some(reply) = flushes.pop_front() {
                        let _ = reply.send(result);
                    }
                }
                Progress::Event(Some(event)) => {
                    let _ = events.send(event);
                }
                Progress::Event(None) => break,
            },
        }
    }

    abandon(&mut flushes);
    destroyed.store(true, Ordering::Release);
}
