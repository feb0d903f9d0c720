//! Relay server: accepts player connections, runs the login handshake, and
//! routes every inbound message to its recipients.
//!
//! All registry state lives in one [`Registry`] behind a single
//! [`tokio::sync::Mutex`]. Each connection task holds that lock for the whole
//! of routing one message, so message processing is totally ordered across
//! the server: a broadcast can never interleave with a login or a disconnect.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::io::AsyncWrite;
use tokio::net::TcpListener;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{Mutex, watch};

use crate::framing::FrameError;
use crate::messages::{Address, BROADCAST_ADDR, LoginAck, Message, Payload, SERVER_ADDR};
use crate::transport::{FrameReader, FrameWriter, TcpTransport};

/// Port the relay listens on unless told otherwise.
pub const DEFAULT_PORT: u16 = 6061;

/// Unique identifier for a TCP connection within a relay process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Atomic generator for monotonically increasing [`ConnectionId`]s.
pub struct IdGenerator {
    next: AtomicU64,
}

impl IdGenerator {
    /// Create a new generator starting at 1.
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    /// Return the next unique [`ConnectionId`].
    pub fn next_id(&self) -> ConnectionId {
        ConnectionId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Error returned when the registry is at capacity.
#[derive(Debug)]
pub struct ConnectionLimitReached;

/// Problems the relay reports locally. None of these are sent to peers.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// An anonymous connection sent something other than a login.
    #[error("protocol violation on {connection}: {reason}")]
    ProtocolViolation {
        /// Offending connection.
        connection: ConnectionId,
        /// What it did wrong.
        reason: String,
    },

    /// The connection is no longer registered.
    #[error("{0} is not registered")]
    UnknownConnection(ConnectionId),
}

/// A logged-in player, owned by the [`Registry`].
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerRecord {
    /// Address assigned at login.
    pub address: Address,
    /// Current display name.
    pub name: String,
    /// Connection the player speaks through.
    pub connection: ConnectionId,
}

struct Peer<W> {
    writer: FrameWriter<W>,
    /// `None` while the connection is anonymous.
    address: Option<Address>,
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Connected sockets and logged-in players, plus the routing algorithm.
///
/// Generic over the write half so routing can be driven over in-memory
/// streams as well as TCP.
pub struct Registry<W> {
    connections: HashMap<ConnectionId, Peer<W>>,
    players: BTreeMap<Address, PlayerRecord>,
    next_address: u32,
    max_connections: usize,
}

impl<W: AsyncWrite + Unpin> Registry<W> {
    /// Create an empty registry accepting up to `max_connections` sockets.
    pub fn new(max_connections: usize) -> Self {
        Self {
            connections: HashMap::new(),
            players: BTreeMap::new(),
            next_address: 1,
            max_connections,
        }
    }

    /// Register a freshly accepted, still anonymous connection.
    pub fn open(
        &mut self,
        id: ConnectionId,
        writer: FrameWriter<W>,
    ) -> Result<(), ConnectionLimitReached> {
        if self.connections.len() >= self.max_connections {
            return Err(ConnectionLimitReached);
        }
        self.connections.insert(
            id,
            Peer {
                writer,
                address: None,
            },
        );
        Ok(())
    }

    /// Whether `id` is still registered.
    pub fn is_open(&self, id: ConnectionId) -> bool {
        self.connections.contains_key(&id)
    }

    /// Number of open sockets, logged in or not.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Logged-in players keyed by address.
    pub fn players(&self) -> &BTreeMap<Address, PlayerRecord> {
        &self.players
    }

    /// Route one message received on connection `id`.
    pub async fn route(&mut self, id: ConnectionId, mut msg: Message) -> Result<(), RelayError> {
        let peer = self
            .connections
            .get(&id)
            .ok_or(RelayError::UnknownConnection(id))?;
        let Some(source) = peer.address else {
            return self.login(id, msg).await;
        };

        // Whatever the client claimed, the sender is the connection's owner.
        msg.source = source;

        if msg.payload.is_broadcast() {
            self.broadcast(&msg).await;
            return Ok(());
        }

        match &mut msg.payload {
            Payload::Ping(ping) if ping.dest == SERVER_ADDR => {
                ping.bounced = true;
                ping.dest = source;
                msg.source = SERVER_ADDR;
                tracing::debug!("Bounced ping from {source}");
                self.send_to(source, &msg).await;
            }
            Payload::Ping(ping) => {
                let dest = ping.dest;
                tracing::debug!("Forwarding ping from {source} to {dest}");
                self.send_to(dest, &msg).await;
            }
            Payload::ChangeName(change) => {
                if let Some(record) = self.players.get_mut(&source) {
                    tracing::info!("{} ({source}) is now known as {}", record.name, change.name);
                    record.name = change.name.clone();
                }
                self.broadcast(&msg).await;
            }
            Payload::Quit => {
                tracing::info!("Player {source} quit");
                self.disconnect(id).await;
                self.broadcast(&msg).await;
            }
            _ => match msg.dest() {
                Some(dest) => self.send_to(dest, &msg).await,
                None => tracing::debug!("Dropping {:?} from {source}: nowhere to route it", msg.tag()),
            },
        }

        Ok(())
    }

    /// Handle the first message of an anonymous connection.
    async fn login(&mut self, id: ConnectionId, mut msg: Message) -> Result<(), RelayError> {
        let Payload::Login(login) = &msg.payload else {
            return Err(RelayError::ProtocolViolation {
                connection: id,
                reason: format!("{:?} sent before logging in", msg.tag()),
            });
        };
        let name = login.name.clone();

        let address = self.allocate_address();
        let others = self
            .players
            .values()
            .map(|record| (record.address, record.name.clone()))
            .collect();
        let ack = Message::new(Payload::LoginAck(LoginAck {
            address,
            players: others,
        }));

        let Some(peer) = self.connections.get_mut(&id) else {
            return Err(RelayError::UnknownConnection(id));
        };
        if let Err(e) = peer.writer.write_frame(&ack).await {
            tracing::warn!("Could not acknowledge login on {id}: {e}");
            self.disconnect(id).await;
            return Ok(());
        }
        peer.address = Some(address);
        self.players.insert(
            address,
            PlayerRecord {
                address,
                name: name.clone(),
                connection: id,
            },
        );
        tracing::info!("{name} logged in on {id} as player {address}");

        msg.source = address;
        self.broadcast(&msg).await;
        Ok(())
    }

    fn allocate_address(&mut self) -> Address {
        if self.next_address == BROADCAST_ADDR.0 {
            self.next_address += 1;
        }
        let address = Address(self.next_address);
        self.next_address += 1;
        address
    }

    fn connections_except(&self, source: Address) -> Vec<ConnectionId> {
        self.players
            .values()
            .filter(|record| record.address != source)
            .map(|record| record.connection)
            .collect()
    }

    /// Write `msg` to each target, returning the ones whose write failed.
    ///
    /// Runs under the registry lock with no write timeout, so a peer whose
    /// send buffer is full holds up the whole relay.
    async fn deliver(&mut self, targets: &[ConnectionId], msg: &Message) -> Vec<ConnectionId> {
        let mut failed = Vec::new();
        for id in targets {
            let Some(peer) = self.connections.get_mut(id) else {
                continue;
            };
            if let Err(e) = peer.writer.write_frame(msg).await {
                tracing::debug!("Delivery of {:?} to {id} failed: {e}", msg.tag());
                failed.push(*id);
            }
        }
        failed
    }

    /// Send `msg` to every logged-in player except its source.
    async fn broadcast(&mut self, msg: &Message) {
        let targets = self.connections_except(msg.source);
        for id in self.deliver(&targets, msg).await {
            self.disconnect(id).await;
        }
    }

    /// Send `msg` to the player at `dest`, if there is one.
    async fn send_to(&mut self, dest: Address, msg: &Message) {
        let Some(record) = self.players.get(&dest) else {
            tracing::debug!("Dropping {:?} for unknown address {dest}", msg.tag());
            return;
        };
        let target = [record.connection];
        for id in self.deliver(&target, msg).await {
            self.disconnect(id).await;
        }
    }

    /// Forget connection `id`, close it, and tell everyone who is left.
    ///
    /// Only the first call for a connection has any effect; returns whether
    /// this call was it. Delivery failures while announcing the departure
    /// cascade into further disconnects.
    pub async fn disconnect(&mut self, id: ConnectionId) -> bool {
        let removed = self.connections.contains_key(&id);
        let mut pending = vec![id];

        while let Some(id) = pending.pop() {
            let Some(mut peer) = self.connections.remove(&id) else {
                continue;
            };
            peer.writer.close().await;

            let Some(address) = peer.address else {
                tracing::debug!("Anonymous {id} disconnected");
                continue;
            };
            if let Some(record) = self.players.remove(&address) {
                tracing::info!("{} ({address}) disconnected", record.name);
            }

            let notice = Message::departed(address);
            let targets = self.connections_except(SERVER_ADDR);
            pending.extend(self.deliver(&targets, &notice).await);
        }

        removed
    }

    /// Run [`disconnect`](Self::disconnect) for every open connection.
    pub async fn disconnect_all(&mut self) {
        let ids: Vec<ConnectionId> = self.connections.keys().copied().collect();
        for id in ids {
            self.disconnect(id).await;
        }
    }
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

/// Configuration for [`Relay`].
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Address to bind to. Default: `0.0.0.0:6061`.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections. Default: 64.
    pub max_connections: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            max_connections: 64,
        }
    }
}

type SharedRegistry = Arc<Mutex<Registry<OwnedWriteHalf>>>;

/// TCP relay that accepts player connections and routes their messages.
pub struct Relay {
    config: RelayConfig,
    registry: SharedRegistry,
    id_gen: IdGenerator,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl Relay {
    /// Create a new relay with the given configuration.
    pub fn new(config: RelayConfig) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            registry: Arc::new(Mutex::new(Registry::new(config.max_connections))),
            id_gen: IdGenerator::new(),
            config,
            shutdown_tx,
            shutdown_rx,
        }
    }

    /// Shared registry (exposed for inspection).
    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    /// Bind to the configured address and run the accept loop.
    pub async fn run(&self) -> std::io::Result<()> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        tracing::info!("Relay listening on {}", self.config.bind_addr);
        self.run_with_listener(listener).await
    }

    /// Run the accept loop with a pre-bound listener (useful for tests).
    ///
    /// Returns when [`shutdown`](Self::shutdown) is signalled or the listener
    /// fails. Either way every still-registered connection goes through
    /// disconnect handling before this returns.
    pub async fn run_with_listener(&self, listener: TcpListener) -> std::io::Result<()> {
        let mut shutdown_rx = self.shutdown_rx.clone();

        let result = loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, peer_addr) = match accepted {
                        Ok(pair) => pair,
                        Err(e) => {
                            tracing::error!("Listener failed: {e}");
                            break Err(e);
                        }
                    };
                    if let Err(e) = self.accept(stream, peer_addr).await {
                        tracing::warn!("Could not set up connection from {peer_addr}: {e}");
                    }
                }
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        tracing::info!("Relay shutting down");
                        break Ok(());
                    }
                }
            }
        };

        self.registry.lock().await.disconnect_all().await;
        result
    }

    /// Signal the relay to shut down gracefully.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    async fn accept(
        &self,
        stream: tokio::net::TcpStream,
        peer_addr: SocketAddr,
    ) -> std::io::Result<()> {
        let id = self.id_gen.next_id();
        let (reader, writer) = TcpTransport::from_stream(stream)?.into_split();

        if self.registry.lock().await.open(id, writer).is_err() {
            tracing::warn!("Connection limit reached, rejecting {peer_addr}");
            return Ok(());
        }
        tracing::info!("Accepted {id} from {peer_addr}");

        let registry = Arc::clone(&self.registry);
        let shutdown_rx = self.shutdown_rx.clone();
        tokio::spawn(async move {
            Self::handle_connection(id, reader, &registry, shutdown_rx).await;
            registry.lock().await.disconnect(id).await;
            tracing::info!("{id} closed");
        });
        Ok(())
    }

    /// Per-connection reader loop. Returns once the connection is finished
    /// for any reason; the caller runs disconnect handling.
    async fn handle_connection(
        id: ConnectionId,
        mut reader: FrameReader<OwnedReadHalf>,
        registry: &SharedRegistry,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                result = reader.read_frame() => {
                    match result {
                        Ok(msg) => {
                            let mut registry = registry.lock().await;
                            if let Err(e) = registry.route(id, msg).await {
                                tracing::warn!("{e}");
                            }
                            if !registry.is_open(id) {
                                break;
                            }
                        }
                        Err(FrameError::ConnectionClosed) => break,
                        Err(e) => {
                            tracing::warn!("Dropping {id}: {e}");
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use tokio::io::{DuplexStream, duplex};
    use tokio::net::TcpStream;

    use crate::messages::{ChangeName, Dice, Ping, PlayerDeparted};

    type TestRegistry = Registry<DuplexStream>;

    /// Open a connection on the registry and return the far end of it.
    fn open(registry: &mut TestRegistry, id: u64) -> FrameReader<DuplexStream> {
        let (ours, theirs) = duplex(64 * 1024);
        registry
            .open(ConnectionId(id), FrameWriter::new(ours))
            .unwrap();
        FrameReader::new(theirs)
    }

    /// Open and log in, swallowing the LoginAck.
    async fn join(
        registry: &mut TestRegistry,
        id: u64,
        name: &str,
    ) -> (FrameReader<DuplexStream>, LoginAck) {
        let mut reader = open(registry, id);
        registry
            .route(ConnectionId(id), Message::login(name))
            .await
            .unwrap();
        match reader.read_frame().await.unwrap().payload {
            Payload::LoginAck(ack) => (reader, ack),
            other => panic!("expected LoginAck, got {other:?}"),
        }
    }

    async fn next(reader: &mut FrameReader<DuplexStream>) -> Message {
        tokio::time::timeout(Duration::from_millis(200), reader.read_frame())
            .await
            .expect("expected a frame")
            .unwrap()
    }

    async fn assert_silent(reader: &mut FrameReader<DuplexStream>) {
        let result = tokio::time::timeout(Duration::from_millis(50), reader.read_frame()).await;
        assert!(result.is_err(), "expected no frame, got {result:?}");
    }

    #[tokio::test]
    async fn test_addresses_are_sequential_and_never_reused() {
        let mut registry = TestRegistry::new(16);
        let (_a, ack_a) = join(&mut registry, 10, "Alice").await;
        let (_b, ack_b) = join(&mut registry, 11, "Bob").await;
        registry.disconnect(ConnectionId(10)).await;
        let (_c, ack_c) = join(&mut registry, 12, "Carol").await;

        assert_eq!(ack_a.address, Address(1));
        assert_eq!(ack_b.address, Address(2));
        assert_eq!(ack_c.address, Address(3));
    }

    #[tokio::test]
    async fn test_allocation_skips_broadcast_address() {
        let mut registry = TestRegistry::new(16);
        registry.next_address = 254;
        let (_a, ack_a) = join(&mut registry, 1, "Alice").await;
        let (_b, ack_b) = join(&mut registry, 2, "Bob").await;

        assert_eq!(ack_a.address, Address(254));
        assert_eq!(ack_b.address, Address(256));
    }

    #[tokio::test]
    async fn test_login_ack_lists_only_earlier_players() {
        let mut registry = TestRegistry::new(16);
        let (mut alice, ack_a) = join(&mut registry, 1, "Alice").await;
        let (_bob, ack_b) = join(&mut registry, 2, "Bob").await;

        assert!(ack_a.players.is_empty());
        assert_eq!(ack_b.players.len(), 1);
        assert_eq!(ack_b.players[&Address(1)], "Alice");

        let arrival = next(&mut alice).await;
        assert_eq!(arrival.source, Address(2));
        assert_eq!(arrival, {
            let mut expected = Message::login("Bob");
            expected.source = Address(2);
            expected
        });
    }

    #[tokio::test]
    async fn test_anonymous_messages_are_dropped() {
        let mut registry = TestRegistry::new(16);
        let (mut alice, _) = join(&mut registry, 1, "Alice").await;
        let mut stranger = open(&mut registry, 2);

        let result = registry.route(ConnectionId(2), Message::say("hi")).await;
        assert!(matches!(result, Err(RelayError::ProtocolViolation { .. })));
        assert!(registry.is_open(ConnectionId(2)));
        assert_silent(&mut alice).await;
        assert_silent(&mut stranger).await;
    }

    #[tokio::test]
    async fn test_broadcast_reaches_everyone_but_the_sender() {
        let mut registry = TestRegistry::new(16);
        let (mut alice, _) = join(&mut registry, 1, "Alice").await;
        let (mut bob, _) = join(&mut registry, 2, "Bob").await;
        let (mut carol, _) = join(&mut registry, 3, "Carol").await;
        next(&mut alice).await; // Bob arrives
        next(&mut alice).await; // Carol arrives
        next(&mut bob).await; // Carol arrives

        let mut spoofed = Message::new(Payload::Dice(Dice { number: 4 }));
        spoofed.source = Address(3);
        registry.route(ConnectionId(1), spoofed).await.unwrap();

        for reader in [&mut bob, &mut carol] {
            let msg = next(reader).await;
            assert_eq!(msg.source, Address(1), "source must be stamped by the relay");
            assert_eq!(msg.payload, Payload::Dice(Dice { number: 4 }));
        }
        assert_silent(&mut alice).await;
    }

    #[tokio::test]
    async fn test_ping_to_server_bounces_to_sender() {
        let mut registry = TestRegistry::new(16);
        let (mut alice, _) = join(&mut registry, 1, "Alice").await;
        let (mut bob, _) = join(&mut registry, 2, "Bob").await;
        next(&mut alice).await;

        registry
            .route(ConnectionId(2), Message::ping(SERVER_ADDR, 1234))
            .await
            .unwrap();

        let echo = next(&mut bob).await;
        assert_eq!(echo.source, SERVER_ADDR);
        assert_eq!(
            echo.payload,
            Payload::Ping(Ping {
                dest: Address(2),
                sent_at_ms: 1234,
                bounced: true,
            })
        );
        assert_silent(&mut alice).await;
    }

    #[tokio::test]
    async fn test_ping_to_player_is_forwarded_unmodified() {
        let mut registry = TestRegistry::new(16);
        let (mut alice, _) = join(&mut registry, 1, "Alice").await;
        let (mut bob, _) = join(&mut registry, 2, "Bob").await;
        let (mut carol, _) = join(&mut registry, 3, "Carol").await;
        next(&mut alice).await;
        next(&mut alice).await;
        next(&mut bob).await;

        registry
            .route(ConnectionId(1), Message::ping(Address(3), 77))
            .await
            .unwrap();

        let forwarded = next(&mut carol).await;
        assert_eq!(forwarded.source, Address(1));
        assert_eq!(
            forwarded.payload,
            Payload::Ping(Ping {
                dest: Address(3),
                sent_at_ms: 77,
                bounced: false,
            })
        );
        assert_silent(&mut alice).await;
        assert_silent(&mut bob).await;
    }

    #[tokio::test]
    async fn test_ping_to_unknown_address_is_dropped() {
        let mut registry = TestRegistry::new(16);
        let (mut alice, _) = join(&mut registry, 1, "Alice").await;

        let result = registry
            .route(ConnectionId(1), Message::ping(Address(40), 1))
            .await;
        assert!(result.is_ok());
        assert_silent(&mut alice).await;
    }

    #[tokio::test]
    async fn test_change_name_updates_registry_and_broadcasts() {
        let mut registry = TestRegistry::new(16);
        let (mut alice, _) = join(&mut registry, 1, "Alice").await;
        let (_bob, _) = join(&mut registry, 2, "Bob").await;
        next(&mut alice).await;

        let rename = Message::new(Payload::ChangeName(ChangeName {
            name: "Robert".to_string(),
        }));
        registry.route(ConnectionId(2), rename).await.unwrap();

        assert_eq!(registry.players()[&Address(2)].name, "Robert");
        let msg = next(&mut alice).await;
        assert_eq!(msg.source, Address(2));
        assert!(matches!(msg.payload, Payload::ChangeName(ref c) if c.name == "Robert"));
    }

    #[tokio::test]
    async fn test_quit_announces_departure_then_quit() {
        let mut registry = TestRegistry::new(16);
        let (mut alice, _) = join(&mut registry, 1, "Alice").await;
        let (mut bob, _) = join(&mut registry, 2, "Bob").await;
        next(&mut alice).await;

        registry
            .route(ConnectionId(2), Message::new(Payload::Quit))
            .await
            .unwrap();

        let departed = next(&mut alice).await;
        assert_eq!(
            departed.payload,
            Payload::PlayerDeparted(PlayerDeparted {
                address: Address(2)
            })
        );
        let quit = next(&mut alice).await;
        assert_eq!(quit.source, Address(2));
        assert_eq!(quit.payload, Payload::Quit);

        assert!(!registry.is_open(ConnectionId(2)));
        assert!(!registry.players().contains_key(&Address(2)));
        assert!(matches!(
            bob.read_frame().await,
            Err(FrameError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        let mut registry = TestRegistry::new(16);
        let (mut alice, _) = join(&mut registry, 1, "Alice").await;
        let (_bob, _) = join(&mut registry, 2, "Bob").await;
        next(&mut alice).await;

        assert!(registry.disconnect(ConnectionId(2)).await);
        assert!(!registry.disconnect(ConnectionId(2)).await);

        let departed = next(&mut alice).await;
        assert!(matches!(departed.payload, Payload::PlayerDeparted(_)));
        assert_silent(&mut alice).await;
    }

    #[tokio::test]
    async fn test_anonymous_disconnect_is_not_announced() {
        let mut registry = TestRegistry::new(16);
        let (mut alice, _) = join(&mut registry, 1, "Alice").await;
        let _stranger = open(&mut registry, 2);

        assert!(registry.disconnect(ConnectionId(2)).await);
        assert_silent(&mut alice).await;
    }

    #[tokio::test]
    async fn test_failed_delivery_disconnects_only_that_target() {
        let mut registry = TestRegistry::new(16);
        let (mut alice, _) = join(&mut registry, 1, "Alice").await;
        let (mut bob, _) = join(&mut registry, 2, "Bob").await;
        let (carol, _) = join(&mut registry, 3, "Carol").await;
        next(&mut alice).await;
        next(&mut alice).await;
        next(&mut bob).await;
        drop(carol);

        registry
            .route(ConnectionId(1), Message::say("anyone there?"))
            .await
            .unwrap();

        assert_eq!(next(&mut bob).await.payload, Message::say("anyone there?").payload);
        for reader in [&mut alice, &mut bob] {
            let departed = next(reader).await;
            assert_eq!(
                departed.payload,
                Payload::PlayerDeparted(PlayerDeparted {
                    address: Address(3)
                })
            );
        }
        assert!(!registry.players().contains_key(&Address(3)));
        assert_eq!(registry.connection_count(), 2);
    }

    #[tokio::test]
    async fn test_connection_limit_enforced() {
        let mut registry = TestRegistry::new(1);
        let _first = open(&mut registry, 1);
        let (ours, _theirs) = duplex(64);
        assert!(
            registry
                .open(ConnectionId(2), FrameWriter::new(ours))
                .is_err()
        );
    }

    #[test]
    fn test_connection_id_uniqueness() {
        let id_gen = IdGenerator::new();
        let id1 = id_gen.next_id();
        let id2 = id_gen.next_id();
        assert_ne!(id1, id2);
        assert_eq!(id1.0 + 1, id2.0);
    }

    #[tokio::test]
    async fn test_shutdown_disconnects_everyone() {
        let relay = Arc::new(Relay::new(RelayConfig::default()));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let srv = Arc::clone(&relay);
        let server = tokio::spawn(async move { srv.run_with_listener(listener).await });

        let mut transport = TcpTransport::connect(addr).await.unwrap();
        transport.write_frame(&Message::login("Alice")).await.unwrap();
        assert!(matches!(
            transport.read_frame().await.unwrap().payload,
            Payload::LoginAck(_)
        ));

        relay.shutdown();
        server.await.unwrap().unwrap();

        assert!(matches!(
            transport.read_frame().await,
            Err(FrameError::ConnectionClosed)
        ));
        assert_eq!(relay.registry().lock().await.connection_count(), 0);
    }

    #[tokio::test]
    async fn test_malformed_frame_drops_connection() {
        let relay = Arc::new(Relay::new(RelayConfig::default()));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let srv = Arc::clone(&relay);
        tokio::spawn(async move { srv.run_with_listener(listener).await });

        let mut stream = TcpStream::connect(addr).await.unwrap();
        tokio::io::AsyncWriteExt::write_all(&mut stream, &[0x00, 0x01, 0xEE])
            .await
            .unwrap();

        let mut buf = [0u8; 8];
        let n = tokio::io::AsyncReadExt::read(&mut stream, &mut buf)
            .await
            .unwrap();
        assert_eq!(n, 0, "relay should hang up on a malformed frame");
    }
}
