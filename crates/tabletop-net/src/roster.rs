//! The client's view of who else is connected.
//!
//! Fed with every lobby-level message the client receives; turns them into
//! [`LobbyEvent`]s the UI can print without knowing the protocol.

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::messages::{Address, Message, Payload};

/// Current wall clock in Unix milliseconds, as carried by pings.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// Something a player would want to see in the chat window.
#[derive(Debug, Clone, PartialEq)]
pub enum LobbyEvent {
    /// Our own login was accepted.
    LoggedIn { address: Address },
    /// Someone new arrived.
    Joined { address: Address, name: String },
    /// Someone changed their name.
    Renamed {
        address: Address,
        old: Option<String>,
        new: String,
    },
    /// A connection went away.
    Departed {
        address: Address,
        name: Option<String>,
    },
    /// Someone quit on purpose.
    Quit { address: Address },
    /// Chat line.
    Said { from: String, text: String },
    /// Chat action.
    Emoted { from: String, text: String },
    /// One of our pings came back.
    PingReply { from: Address, rtt_ms: u64 },
    /// Another player pinged us directly.
    Pinged { from: Address },
}

/// Address → name map of connected players, plus our own address.
#[derive(Debug, Default, Clone)]
pub struct Roster {
    local: Option<Address>,
    players: BTreeMap<Address, String>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Our address, once the relay has acknowledged the login.
    pub fn local_address(&self) -> Option<Address> {
        self.local
    }

    /// Everyone else currently connected.
    pub fn players(&self) -> &BTreeMap<Address, String> {
        &self.players
    }

    /// Display name for `address`, if known.
    pub fn name_of(&self, address: Address) -> Option<&str> {
        self.players.get(&address).map(String::as_str)
    }

    /// Case-insensitive lookup by display name.
    pub fn find_by_name(&self, name: &str) -> Option<Address> {
        self.players
            .iter()
            .find(|(_, candidate)| candidate.eq_ignore_ascii_case(name))
            .map(|(address, _)| *address)
    }

    fn label(&self, address: Address) -> String {
        self.name_of(address)
            .map_or_else(|| address.to_string(), str::to_owned)
    }

    /// Update the roster from `msg` and describe what happened.
    ///
    /// Game-level messages are ignored and yield `None`.
    pub fn apply(&mut self, msg: &Message, now_ms: u64) -> Option<LobbyEvent> {
        let source = msg.source;
        match &msg.payload {
            Payload::LoginAck(ack) => {
                self.local = Some(ack.address);
                self.players = ack.players.clone();
                Some(LobbyEvent::LoggedIn {
                    address: ack.address,
                })
            }
            Payload::Login(login) => {
                self.players.insert(source, login.name.clone());
                Some(LobbyEvent::Joined {
                    address: source,
                    name: login.name.clone(),
                })
            }
            Payload::ChangeName(change) => {
                let old = self.players.insert(source, change.name.clone());
                Some(LobbyEvent::Renamed {
                    address: source,
                    old,
                    new: change.name.clone(),
                })
            }
            Payload::PlayerDeparted(departed) => {
                let name = self.players.remove(&departed.address);
                Some(LobbyEvent::Departed {
                    address: departed.address,
                    name,
                })
            }
            Payload::Quit => {
                self.players.remove(&source);
                Some(LobbyEvent::Quit { address: source })
            }
            Payload::Say(say) => Some(LobbyEvent::Said {
                from: self.label(source),
                text: say.text.clone(),
            }),
            Payload::Emote(emote) => Some(LobbyEvent::Emoted {
                from: self.label(source),
                text: emote.text.clone(),
            }),
            Payload::Ping(ping) if ping.bounced => {
                Some(LobbyEvent::PingReply {
                    from: source,
                    rtt_ms: now_ms.saturating_sub(ping.sent_at_ms),
                })
            }
            Payload::Ping(_) => Some(LobbyEvent::Pinged { from: source }),
            _ => None,
        }
    }
}
