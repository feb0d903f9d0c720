//! Relay networking: message catalog, framing, transport, the relay server,
//! and the player-side client.

pub mod client;
pub mod framing;
pub mod messages;
pub mod relay;
pub mod roster;
pub mod transport;

pub use client::{ClientError, ConnectionState, ConnectionStateWatch, GameClient};
pub use framing::{FrameError, MAX_FRAME_LEN, read_frame, write_frame};
pub use messages::{
    Address, BROADCAST_ADDR, Coord, Message, MessageError, MessageTag, PROTOCOL_VERSION, Payload,
    SERVER_ADDR,
};
pub use relay::{
    ConnectionId, ConnectionLimitReached, DEFAULT_PORT, IdGenerator, PlayerRecord, Registry, Relay,
    RelayConfig, RelayError,
};
pub use roster::{LobbyEvent, Roster, now_ms};
pub use transport::{FrameReader, FrameWriter, TcpTransport, Transport};
