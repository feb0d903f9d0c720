//! Builds sessions from game-type tags.

use std::collections::BTreeMap;

use tabletop_net::Address;
use tabletop_net::messages::NewGame;

use crate::error::SessionError;
use crate::games::NoughtsAndCrosses;
use crate::rules::Rules;
use crate::session::{Seat, Session};

/// Options carried by a `NewGame` message.
pub type GameOptions = BTreeMap<String, String>;

/// Makes a fresh rule engine from the game options.
pub type Constructor = fn(&GameOptions) -> Box<dyn Rules>;

/// Registry of playable games keyed by tag.
#[derive(Debug, Clone, Default)]
pub struct GameFactory {
    games: BTreeMap<String, Constructor>,
}

impl GameFactory {
    /// An empty factory.
    pub fn new() -> Self {
        Self::default()
    }

    /// A factory that knows every built-in game.
    pub fn with_builtin_games() -> Self {
        let mut factory = Self::new();
        factory.register(NoughtsAndCrosses::TAG, noughts_and_crosses);
        factory
    }

    /// Add or replace the game under `tag`.
    pub fn register(&mut self, tag: impl Into<String>, constructor: Constructor) {
        self.games.insert(tag.into(), constructor);
    }

    /// Registered tags in sorted order.
    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.games.keys().map(String::as_str)
    }

    /// Start a new session of the game `tag`.
    pub fn create(
        &self,
        tag: &str,
        options: &GameOptions,
        seats: Vec<Seat>,
        local: Address,
    ) -> Result<Session, SessionError> {
        let constructor = self
            .games
            .get(tag)
            .ok_or_else(|| SessionError::UnknownGame(tag.to_string()))?;
        Session::new(tag, constructor(options), seats, local)
    }

    /// Start the session a `NewGame` message asks for.
    pub fn create_from(
        &self,
        request: &NewGame,
        seats: Vec<Seat>,
        local: Address,
    ) -> Result<Session, SessionError> {
        self.create(&request.game, &request.options, seats, local)
    }
}

fn noughts_and_crosses(_options: &GameOptions) -> Box<dyn Rules> {
    Box::new(NoughtsAndCrosses::new())
}
