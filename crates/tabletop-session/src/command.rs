//! Lines typed by the local player: chat, `/` commands, and recall.

use std::collections::VecDeque;

use tabletop_net::messages::ChangeName;
use tabletop_net::{Message, Payload, Roster, SERVER_ADDR};

/// How many typed lines [`History`] keeps.
pub const MAX_HISTORY: usize = 10;

/// Why a typed line could not be turned into a message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("no '/' command used")]
    NoCommand,

    #[error("/{0} requires an argument")]
    MissingArgument(&'static str),

    #[error("{0} not recognised as a player")]
    UnknownPlayer(String),

    #[error("command /{0} not recognised")]
    UnknownCommand(String),
}

/// Turn one typed line into the message to send, if any.
///
/// Plain text is a `Say`. Lines starting with `/` are commands:
///
/// - `/me <text>` emotes
/// - `/ping` pings the relay, `/ping <name>` pings that player
/// - `/nick <name>` changes the local display name
/// - `/quit` leaves the relay
///
/// Command names are case-insensitive. A blank line yields `Ok(None)`.
pub fn parse_input(
    line: &str,
    roster: &Roster,
    now_ms: u64,
) -> Result<Option<Message>, CommandError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let Some(command_line) = line.strip_prefix('/') else {
        return Ok(Some(Message::say(line)));
    };
    if command_line.is_empty() || command_line.starts_with(char::is_whitespace) {
        return Err(CommandError::NoCommand);
    }

    let (command, arg) = match command_line.split_once(char::is_whitespace) {
        Some((command, arg)) => (command, arg.trim()),
        None => (command_line, ""),
    };

    let msg = match command.to_ascii_lowercase().as_str() {
        "me" => {
            if arg.is_empty() {
                return Err(CommandError::MissingArgument("me"));
            }
            Message::emote(arg)
        }
        "ping" => {
            let dest = if arg.is_empty() {
                SERVER_ADDR
            } else {
                roster
                    .find_by_name(arg)
                    .ok_or_else(|| CommandError::UnknownPlayer(arg.to_string()))?
            };
            Message::ping(dest, now_ms)
        }
        "nick" => {
            if arg.is_empty() {
                return Err(CommandError::MissingArgument("nick"));
            }
            Message::new(Payload::ChangeName(ChangeName {
                name: arg.to_string(),
            }))
        }
        "quit" => Message::new(Payload::Quit),
        _ => return Err(CommandError::UnknownCommand(command.to_string())),
    };
    Ok(Some(msg))
}

/// The last few lines the player typed, browsable with up/down.
#[derive(Debug, Clone, Default)]
pub struct History {
    lines: VecDeque<String>,
    /// Position being viewed; `lines.len()` when not browsing.
    index: usize,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember `line` as the newest entry, dropping any earlier copy of
    /// it, and stop browsing.
    pub fn push(&mut self, line: impl Into<String>) {
        let line = line.into();
        self.lines.retain(|kept| *kept != line);
        if self.lines.len() >= MAX_HISTORY {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
        self.index = self.lines.len();
    }

    /// Whether the player has started browsing back.
    pub fn is_browsing(&self) -> bool {
        self.index < self.lines.len()
    }

    /// Step back one line, sticking at the oldest.
    pub fn previous(&mut self) -> Option<&str> {
        self.index = self.index.saturating_sub(1);
        self.lines.get(self.index).map(String::as_str)
    }

    /// Step forward one line, sticking at the newest. Does nothing unless
    /// browsing.
    pub fn next(&mut self) -> Option<&str> {
        if !self.is_browsing() {
            return None;
        }
        self.index = (self.index + 1).min(self.lines.len() - 1);
        self.lines.get(self.index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}
