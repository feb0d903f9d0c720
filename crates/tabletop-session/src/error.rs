//! Error types for sessions and rules.

use tabletop_net::{Address, Coord};

use crate::rules::SideId;

/// Why a game action was refused.
///
/// Never sent over the wire: remote offenders are logged and ignored, local
/// callers get the value back.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RuleViolation {
    /// The acting player does not control the side whose turn it is.
    #[error("it is {current}'s turn")]
    NotYourTurn {
        /// Side currently on turn.
        current: SideId,
    },

    /// The acting player controls no side in this game.
    #[error("{0} is not seated in this game")]
    NotSeated(Address),

    /// The game already has a result.
    #[error("the game is over")]
    GameOver,

    /// No legal path between the two tiles.
    #[error("illegal move from {from} to {to}")]
    IllegalMove { from: Coord, to: Coord },

    /// The tile cannot take a new piece.
    #[error("illegal place at {0}")]
    IllegalPlace(Coord),

    /// A transition is still animating.
    #[error("busy animating the previous action")]
    Busy,

    /// Coordinates outside the board.
    #[error("{0} is outside the board")]
    OutOfBoard(Coord),
}

/// Errors setting up a session.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// No game registered under this tag.
    #[error("unknown game {0:?}")]
    UnknownGame(String),

    /// Seats handed to the session do not match the game's sides.
    #[error("game needs {expected} seats, got {got}")]
    SeatMismatch { expected: usize, got: usize },
}
