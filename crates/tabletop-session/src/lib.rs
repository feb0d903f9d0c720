//! Turn-based game sessions driven by relay messages: the rule-engine seam,
//! the session state machine with its pending queue, the game factory, and
//! chat command parsing for the local player.

pub mod command;
pub mod error;
pub mod factory;
pub mod games;
pub mod rules;
pub mod session;

pub use command::{CommandError, History, parse_input};
pub use error::{RuleViolation, SessionError};
pub use factory::{Constructor, GameFactory, GameOptions};
pub use games::NoughtsAndCrosses;
pub use rules::{Outcome, Path, Rules, SideId};
pub use session::{
    Flow, GameResult, PendingQueue, Seat, Session, SessionEvent, SessionState,
};
