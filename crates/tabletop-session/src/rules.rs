//! The seam between a session and the game it referees.
//!
//! A [`Rules`] implementation owns the board and answers legality queries.
//! The session owns everything else: whose turn it is, transitions, queued
//! messages, and the game result.

use std::fmt;

use tabletop_net::Coord;

/// Index of a side in turn order, starting at 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SideId(pub usize);

impl fmt::Display for SideId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "side {}", self.0)
    }
}

/// Tiles a moving piece passes through, ending on the destination.
pub type Path = Vec<Coord>;

/// What applying an action did to the game.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Play goes on with the next side.
    Continue,
    /// The given side has won.
    Won(SideId),
    /// Nobody can win any more.
    Stalemate,
}

/// Per-game rule engine.
pub trait Rules: Send {
    /// Human-readable side names in turn order. The length is the number of
    /// seats the game needs.
    fn side_names(&self) -> &[&'static str];

    /// Board extent as `(columns, rows)`.
    fn board_size(&self) -> (u16, u16);

    /// Path for `side` moving a piece from `from` to `to`, or `None` if the
    /// move is illegal.
    fn find_path(&self, side: SideId, from: Coord, to: Coord) -> Option<Path>;

    /// Whether `side` may place a new piece at `at`.
    fn legal_place(&self, side: SideId, at: Coord) -> bool;

    /// Carry out a move already validated by [`find_path`](Self::find_path).
    fn apply_move(&mut self, side: SideId, path: &Path) -> Outcome;

    /// Carry out a place already validated by [`legal_place`](Self::legal_place).
    fn apply_place(&mut self, side: SideId, at: Coord) -> Outcome;

    /// Whether `side` has anything it could do on its turn.
    fn has_legal_action(&self, side: SideId) -> bool;

    /// Called when `side` rolls a die.
    fn dice_rolled(&mut self, _side: SideId, _number: u8) {}

    /// Whether `at` lies on the board.
    fn contains(&self, at: Coord) -> bool {
        let (columns, rows) = self.board_size();
        at.column < columns && at.row < rows
    }
}
