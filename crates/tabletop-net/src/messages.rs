//! Message catalog and payload serialization.
//!
//! Every message is serialized with [`postcard`] and prefixed with a protocol
//! version byte. The enum discriminant of [`Payload`] is the type tag, so the
//! schema is explicit on both ends and never depends on shared runtime types.
//! Use [`serialize_message`] and [`deserialize_message`] for encoding/decoding.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Current wire-protocol version. Prepended to every serialized message.
pub const PROTOCOL_VERSION: u8 = 1;

/// Address of the relay itself.
pub const SERVER_ADDR: Address = Address(0);

/// Address meaning "every participant".
pub const BROADCAST_ADDR: Address = Address(255);

// ---------------------------------------------------------------------------
// Addressing
// ---------------------------------------------------------------------------

/// Identifies the relay, the broadcast group, or one logged-in player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Address(pub u32);

impl Address {
    /// Whether this address can belong to a player (neither reserved value).
    pub fn is_player(self) -> bool {
        self != SERVER_ADDR && self != BROADCAST_ADDR
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            SERVER_ADDR => write!(f, "server"),
            BROADCAST_ADDR => write!(f, "broadcast"),
            Address(n) => write!(f, "#{n}"),
        }
    }
}

/// A board square, column first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Coord {
    /// Zero-based column.
    pub column: u16,
    /// Zero-based row.
    pub row: u16,
}

impl Coord {
    /// Shorthand constructor.
    pub const fn new(column: u16, row: u16) -> Self {
        Self { column, row }
    }
}

impl fmt::Display for Coord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.column, self.row)
    }
}

// ---------------------------------------------------------------------------
// Top-level message
// ---------------------------------------------------------------------------

/// One protocol message: who sent it, and what it says.
///
/// `source` is always filled in by the relay from the sending connection;
/// whatever a client puts there is overwritten before routing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    /// Sender address, stamped by the relay.
    pub source: Address,
    /// Variant-specific content.
    pub payload: Payload,
}

/// Message variants. The enum discriminant is the wire type tag.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Payload {
    // --- Lobby ---
    /// Anonymous connection asks to join under a display name.
    Login(Login),
    /// Relay confirms a login to the new client only.
    LoginAck(LoginAck),
    /// Relay announces that a player's connection went away.
    PlayerDeparted(PlayerDeparted),
    /// Chat line.
    Say(Text),
    /// Chat action ("/me waves").
    Emote(Text),
    /// Player renamed themself.
    ChangeName(ChangeName),
    /// Player leaves voluntarily.
    Quit,

    // --- Game ---
    /// Piece moved between two squares.
    Move(Move),
    /// Piece placed on an empty square.
    Place(Place),
    /// Current side gives up its turn.
    Pass(GameRef),
    /// Current side concedes.
    Surrender(GameRef),
    /// A new game starts.
    NewGame(NewGame),
    /// Die result for the current side.
    Dice(Dice),

    // --- System ---
    /// Latency probe, either bounced by the relay or forwarded to a player.
    Ping(Ping),
}

// ---------------------------------------------------------------------------
// Payload structs
// ---------------------------------------------------------------------------

/// Login request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Login {
    /// Desired display name.
    pub name: String,
}

/// Login acknowledgement.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoginAck {
    /// Address assigned to the new player.
    pub address: Address,
    /// Everyone else who was connected at login time.
    pub players: BTreeMap<Address, String>,
}

/// Departure notice.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlayerDeparted {
    /// Address of the player that left.
    pub address: Address,
}

/// Free-form chat text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Text {
    pub text: String,
}

/// Rename.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChangeName {
    /// The new display name.
    pub name: String,
}

/// Move of a piece.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Move {
    pub from: Coord,
    pub to: Coord,
}

/// Placement of a new piece.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Place {
    pub at: Coord,
}

/// Optional reference to the game a turn-level action belongs to.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GameRef {
    /// Game-type tag, when the sender chose to include it.
    pub game: Option<String>,
    /// Game-specific options.
    pub options: BTreeMap<String, String>,
}

/// New game announcement.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewGame {
    /// Game-type tag, e.g. `"NoughtsAndCrosses"`.
    pub game: String,
    /// Game-specific options.
    pub options: BTreeMap<String, String>,
}

/// Die roll.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Dice {
    /// Rolled number.
    pub number: u8,
}

/// Latency probe.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Ping {
    /// Target address; [`SERVER_ADDR`] asks the relay to bounce it.
    pub dest: Address,
    /// Sender clock at send time, Unix milliseconds.
    pub sent_at_ms: u64,
    /// Set by the relay when it bounced the probe.
    pub bounced: bool,
}

// ---------------------------------------------------------------------------
// Tags and classification
// ---------------------------------------------------------------------------

/// Fieldless mirror of [`Payload`], handy for logging and matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageTag {
    Login,
    LoginAck,
    PlayerDeparted,
    Say,
    Emote,
    ChangeName,
    Quit,
    Move,
    Place,
    Pass,
    Surrender,
    NewGame,
    Dice,
    Ping,
}

impl Payload {
    /// Extract the tag without consuming the payload.
    pub fn tag(&self) -> MessageTag {
        match self {
            Payload::Login(_) => MessageTag::Login,
            Payload::LoginAck(_) => MessageTag::LoginAck,
            Payload::PlayerDeparted(_) => MessageTag::PlayerDeparted,
            Payload::Say(_) => MessageTag::Say,
            Payload::Emote(_) => MessageTag::Emote,
            Payload::ChangeName(_) => MessageTag::ChangeName,
            Payload::Quit => MessageTag::Quit,
            Payload::Move(_) => MessageTag::Move,
            Payload::Place(_) => MessageTag::Place,
            Payload::Pass(_) => MessageTag::Pass,
            Payload::Surrender(_) => MessageTag::Surrender,
            Payload::NewGame(_) => MessageTag::NewGame,
            Payload::Dice(_) => MessageTag::Dice,
            Payload::Ping(_) => MessageTag::Ping,
        }
    }

    /// Variants the relay forwards to every connection except the sender.
    pub fn is_broadcast(&self) -> bool {
        matches!(
            self,
            Payload::Say(_)
                | Payload::Emote(_)
                | Payload::Move(_)
                | Payload::Place(_)
                | Payload::Pass(_)
                | Payload::NewGame(_)
                | Payload::Surrender(_)
                | Payload::Dice(_)
        )
    }
}

impl Message {
    /// Wrap a payload. The source starts as [`SERVER_ADDR`]; the relay
    /// rewrites it for anything a client sends.
    pub fn new(payload: Payload) -> Self {
        Self {
            source: SERVER_ADDR,
            payload,
        }
    }

    /// Login request for `name`.
    pub fn login(name: impl Into<String>) -> Self {
        Self::new(Payload::Login(Login { name: name.into() }))
    }

    /// Chat line.
    pub fn say(text: impl Into<String>) -> Self {
        Self::new(Payload::Say(Text { text: text.into() }))
    }

    /// Chat action.
    pub fn emote(text: impl Into<String>) -> Self {
        Self::new(Payload::Emote(Text { text: text.into() }))
    }

    /// Ping towards `dest`, stamped with the sender clock.
    pub fn ping(dest: Address, sent_at_ms: u64) -> Self {
        Self::new(Payload::Ping(Ping {
            dest,
            sent_at_ms,
            bounced: false,
        }))
    }

    /// Relay-originated departure notice for `address`.
    pub fn departed(address: Address) -> Self {
        Self::new(Payload::PlayerDeparted(PlayerDeparted { address }))
    }

    /// Shorthand for `self.payload.tag()`.
    pub fn tag(&self) -> MessageTag {
        self.payload.tag()
    }

    /// Destination of point-to-point variants.
    pub fn dest(&self) -> Option<Address> {
        match &self.payload {
            Payload::Ping(ping) => Some(ping.dest),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur while decoding a message payload.
#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    /// The payload was empty.
    #[error("empty payload")]
    EmptyPayload,

    /// The version byte does not match [`PROTOCOL_VERSION`].
    #[error("unsupported protocol version {0}")]
    UnsupportedVersion(u8),

    /// Postcard (de)serialization failed.
    #[error("postcard error: {0}")]
    Postcard(#[from] postcard::Error),
}

// ---------------------------------------------------------------------------
// Serialization helpers
// ---------------------------------------------------------------------------

/// Serialize a [`Message`] into a versioned binary payload.
///
/// Wire format: `[version: u8] [postcard-encoded Message]`
pub fn serialize_message(msg: &Message) -> Result<Vec<u8>, MessageError> {
    let body = postcard::to_allocvec(msg)?;
    let mut out = Vec::with_capacity(1 + body.len());
    out.push(PROTOCOL_VERSION);
    out.extend_from_slice(&body);
    Ok(out)
}

/// Deserialize a versioned binary payload into a [`Message`].
///
/// Trailing bytes after the message are rejected.
pub fn deserialize_message(data: &[u8]) -> Result<Message, MessageError> {
    let (&version, body) = data.split_first().ok_or(MessageError::EmptyPayload)?;
    if version != PROTOCOL_VERSION {
        return Err(MessageError::UnsupportedVersion(version));
    }

    let (msg, rest) = postcard::take_from_bytes::<Message>(body)?;
    if !rest.is_empty() {
        return Err(MessageError::Postcard(postcard::Error::DeserializeBadEncoding));
    }
    Ok(msg)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
