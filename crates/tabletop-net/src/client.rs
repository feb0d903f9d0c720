//! Client side of a relay connection.
//!
//! A [`GameClient`] owns one transport. A background task reads frames and
//! pushes them onto a FIFO inbox; the UI drains it with
//! [`GameClient::next_message`] once per tick. The inbox is the only state
//! shared between the two, and the consumer never waits on it: if the
//! receive task holds the lock, `next_message` reports nothing and the caller
//! simply polls again next tick.
//!
//! State changes are broadcast via a [`watch`] channel so any number of
//! consumers can react without polling.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Arc, TryLockError};

use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{Mutex, watch};

use crate::framing::FrameError;
use crate::messages::Message;
use crate::transport::{FrameReader, FrameWriter, TcpTransport};

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Attempting to establish a TCP connection.
    Connecting,
    /// Logged in and receiving.
    Connected,
    /// Connection lost, refused, or intentionally closed.
    Disconnected,
}

/// Observable connection state backed by a [`watch`] channel.
pub struct ConnectionStateWatch {
    tx: watch::Sender<ConnectionState>,
    rx: watch::Receiver<ConnectionState>,
}

impl Default for ConnectionStateWatch {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionStateWatch {
    /// Create a new watch initialized to [`ConnectionState::Disconnected`].
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(ConnectionState::Disconnected);
        Self { tx, rx }
    }

    /// Set the current connection state, notifying all subscribers.
    pub fn set(&self, state: ConnectionState) {
        let _ = self.tx.send(state);
    }

    /// Return a new subscriber receiver.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.rx.clone()
    }

    /// Return the current state without blocking.
    pub fn current(&self) -> ConnectionState {
        *self.rx.borrow()
    }
}

/// Errors reported by [`GameClient`]. None of them tear down the caller.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// There is no open connection to send on.
    #[error("no connection open to accept data")]
    NotConnected,

    /// The TCP connect itself failed.
    #[error("connection to {addr} failed: {source}")]
    Connect {
        /// Where we tried to go.
        addr: SocketAddr,
        /// Why it failed.
        #[source]
        source: std::io::Error,
    },

    /// Framing failed while sending.
    #[error(transparent)]
    Frame(#[from] FrameError),
}

type Inbox = Arc<std::sync::Mutex<VecDeque<Message>>>;
type SharedWriter = Arc<Mutex<FrameWriter<OwnedWriteHalf>>>;

/// A player's connection to the relay.
pub struct GameClient {
    name: String,
    writer: Option<SharedWriter>,
    inbox: Inbox,
    state: Arc<ConnectionStateWatch>,
    /// Sending `true` makes the receive task exit.
    shutdown_tx: Option<watch::Sender<bool>>,
}

impl GameClient {
    /// Create a disconnected client that will log in as `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            writer: None,
            inbox: Arc::new(std::sync::Mutex::new(VecDeque::new())),
            state: Arc::new(ConnectionStateWatch::new()),
            shutdown_tx: None,
        }
    }

    /// Display name sent with the next login.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Change the name used for the next login.
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// Return the connection state watch.
    pub fn state(&self) -> &Arc<ConnectionStateWatch> {
        &self.state
    }

    /// Whether the client currently believes it is connected.
    pub fn is_connected(&self) -> bool {
        self.state.current() == ConnectionState::Connected
    }

    /// Connect to the relay at `addr`, log in, and start receiving.
    ///
    /// Any previous connection is closed first. On failure the client stays
    /// [`ConnectionState::Disconnected`] and can simply be asked to connect
    /// again.
    pub async fn connect(&mut self, addr: SocketAddr) -> Result<(), ClientError> {
        self.disconnect().await;
        self.state.set(ConnectionState::Connecting);
        tracing::info!("Connecting to relay at {addr}");

        let transport = match TcpTransport::connect(addr).await {
            Ok(transport) => transport,
            Err(source) => {
                tracing::warn!("Connection to {addr} failed: {source}");
                self.state.set(ConnectionState::Disconnected);
                return Err(ClientError::Connect { addr, source });
            }
        };
        let (reader, mut writer) = transport.into_split();

        if let Err(e) = writer.write_frame(&Message::login(&self.name)).await {
            tracing::warn!("Login to {addr} failed: {e}");
            writer.close().await;
            self.state.set(ConnectionState::Disconnected);
            return Err(e.into());
        }

        let writer = Arc::new(Mutex::new(writer));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        self.state.set(ConnectionState::Connected);

        let inbox = Arc::clone(&self.inbox);
        let state = Arc::clone(&self.state);
        let task_writer = Arc::clone(&writer);
        tokio::spawn(async move {
            Self::receive_loop(reader, &inbox, &state, &task_writer, shutdown_rx).await;
        });

        self.writer = Some(writer);
        self.shutdown_tx = Some(shutdown_tx);
        Ok(())
    }

    /// Send one message to the relay.
    ///
    /// Encoding failures leave the connection as it was. Write failures mean
    /// the connection is gone: the client flips to
    /// [`ConnectionState::Disconnected`] and reports the error.
    pub async fn send(&self, msg: &Message) -> Result<(), ClientError> {
        let Some(writer) = &self.writer else {
            tracing::warn!("Cannot send {:?}: not connected", msg.tag());
            return Err(ClientError::NotConnected);
        };

        match writer.lock().await.write_frame(msg).await {
            Ok(()) => Ok(()),
            Err(e @ (FrameError::FrameTooLarge { .. } | FrameError::MalformedFrame(_))) => {
                tracing::warn!("Could not send {:?}: {e}", msg.tag());
                Err(e.into())
            }
            Err(e) => {
                tracing::warn!("No connection open to accept data: {e}");
                self.state.set(ConnectionState::Disconnected);
                Err(e.into())
            }
        }
    }

    /// Pop the oldest received message without waiting.
    ///
    /// Returns `None` when the inbox is empty *or* momentarily locked by the
    /// receive task.
    pub fn next_message(&self) -> Option<Message> {
        match self.inbox.try_lock() {
            Ok(mut inbox) => inbox.pop_front(),
            Err(TryLockError::WouldBlock) => None,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner().pop_front(),
        }
    }

    /// Close the connection, if any. Safe to call repeatedly.
    pub async fn disconnect(&mut self) {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(true);
        }
        if let Some(writer) = self.writer.take() {
            writer.lock().await.close().await;
        }
        self.state.set(ConnectionState::Disconnected);
    }

    /// Read frames until the connection closes or shutdown is signalled.
    async fn receive_loop(
        mut reader: FrameReader<OwnedReadHalf>,
        inbox: &std::sync::Mutex<VecDeque<Message>>,
        state: &ConnectionStateWatch,
        writer: &Mutex<FrameWriter<OwnedWriteHalf>>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                result = reader.read_frame() => {
                    match result {
                        Ok(msg) => {
                            tracing::trace!("Received {:?} from {}", msg.tag(), msg.source);
                            match inbox.lock() {
                                Ok(mut queue) => queue.push_back(msg),
                                Err(poisoned) => poisoned.into_inner().push_back(msg),
                            }
                        }
                        Err(FrameError::MalformedFrame(reason)) => {
                            tracing::warn!("Bad data received and ignored: {reason}");
                        }
                        Err(e) => {
                            tracing::warn!("Failure while reading from relay: {e}");
                            writer.lock().await.close().await;
                            state.set(ConnectionState::Disconnected);
                            break;
                        }
                    }
                }
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }
    }
}
