//! Noughts and crosses on a 3x3 grid.

use tabletop_net::Coord;

use crate::rules::{Outcome, Path, Rules, SideId};

const SIZE: usize = 3;

/// Every line of three through the grid, as `(column, row)` pairs.
const LINES: [[(usize, usize); SIZE]; 8] = [
    [(0, 0), (0, 1), (0, 2)],
    [(1, 0), (1, 1), (1, 2)],
    [(2, 0), (2, 1), (2, 2)],
    [(0, 0), (1, 0), (2, 0)],
    [(0, 1), (1, 1), (2, 1)],
    [(0, 2), (1, 2), (2, 2)],
    [(0, 0), (1, 1), (2, 2)],
    [(2, 0), (1, 1), (0, 2)],
];

/// Noughts play first, crosses second. Pieces are only ever placed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NoughtsAndCrosses {
    /// Indexed `[column][row]`.
    grid: [[Option<SideId>; SIZE]; SIZE],
}

impl NoughtsAndCrosses {
    /// Game-type tag used in `NewGame` messages.
    pub const TAG: &'static str = "NoughtsAndCrosses";

    pub fn new() -> Self {
        Self::default()
    }

    /// Piece at `at`, if any.
    pub fn piece(&self, at: Coord) -> Option<SideId> {
        self.grid
            .get(usize::from(at.column))?
            .get(usize::from(at.row))
            .copied()
            .flatten()
    }

    /// Render the grid row by row as `O`, `X` and `-`, one line per row.
    pub fn layout(&self) -> String {
        let mut out = String::with_capacity(SIZE * (SIZE + 1));
        for row in 0..SIZE {
            for column in 0..SIZE {
                out.push(match self.grid[column][row] {
                    Some(SideId(0)) => 'O',
                    Some(_) => 'X',
                    None => '-',
                });
            }
            out.push('\n');
        }
        out
    }

    /// Inverse of [`layout`](Self::layout). Unknown characters are empty
    /// squares; whitespace is skipped.
    pub fn from_layout(layout: &str) -> Self {
        let mut game = Self::new();
        let cells = layout.chars().filter(|c| !c.is_whitespace());
        for (i, cell) in cells.take(SIZE * SIZE).enumerate() {
            let (column, row) = (i % SIZE, i / SIZE);
            game.grid[column][row] = match cell {
                'O' => Some(SideId(0)),
                'X' => Some(SideId(1)),
                _ => None,
            };
        }
        game
    }

    fn spaces_left(&self) -> usize {
        self.grid.iter().flatten().filter(|cell| cell.is_none()).count()
    }

    fn has_line(&self, side: SideId) -> bool {
        LINES.iter().any(|line| {
            line.iter()
                .all(|&(column, row)| self.grid[column][row] == Some(side))
        })
    }
}

impl Rules for NoughtsAndCrosses {
    fn side_names(&self) -> &[&'static str] {
        &["Noughts", "Crosses"]
    }

    fn board_size(&self) -> (u16, u16) {
        (SIZE as u16, SIZE as u16)
    }

    fn find_path(&self, _side: SideId, _from: Coord, _to: Coord) -> Option<Path> {
        None
    }

    fn legal_place(&self, _side: SideId, at: Coord) -> bool {
        self.contains(at) && self.piece(at).is_none()
    }

    fn apply_move(&mut self, _side: SideId, _path: &Path) -> Outcome {
        Outcome::Continue
    }

    fn apply_place(&mut self, side: SideId, at: Coord) -> Outcome {
        self.grid[usize::from(at.column)][usize::from(at.row)] = Some(side);
        if self.has_line(side) {
            Outcome::Won(side)
        } else if self.spaces_left() == 0 {
            Outcome::Stalemate
        } else {
            Outcome::Continue
        }
    }

    fn has_legal_action(&self, _side: SideId) -> bool {
        self.spaces_left() > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{GameResult, Seat, Session};
    use tabletop_net::Address;

    fn hotseat(game: NoughtsAndCrosses) -> Session {
        let me = Address(1);
        let seats = vec![Seat::new(me, "Me"), Seat::new(me, "Me")];
        Session::new(NoughtsAndCrosses::TAG, Box::new(game), seats, me).unwrap()
    }

    #[test]
    fn test_column_wins() {
        let mut game = NoughtsAndCrosses::from_layout("O-- O-- ---");
        assert_eq!(
            game.apply_place(SideId(0), Coord::new(0, 2)),
            Outcome::Won(SideId(0))
        );
    }

    #[test]
    fn test_row_and_diagonals_win() {
        let mut row = NoughtsAndCrosses::from_layout("--- XX- ---");
        assert_eq!(
            row.apply_place(SideId(1), Coord::new(2, 1)),
            Outcome::Won(SideId(1))
        );

        let mut backslash = NoughtsAndCrosses::from_layout("O-- -O- ---");
        assert_eq!(
            backslash.apply_place(SideId(0), Coord::new(2, 2)),
            Outcome::Won(SideId(0))
        );

        let mut slash = NoughtsAndCrosses::from_layout("--X -X- ---");
        assert_eq!(
            slash.apply_place(SideId(1), Coord::new(0, 2)),
            Outcome::Won(SideId(1))
        );
    }

    #[test]
    fn test_full_board_without_line_is_stalemate() {
        let mut game = NoughtsAndCrosses::from_layout("OXO OXX XO-");
        assert_eq!(
            game.apply_place(SideId(0), Coord::new(2, 2)),
            Outcome::Stalemate
        );
        assert!(!game.has_legal_action(SideId(1)));
    }

    #[test]
    fn test_occupied_and_outside_squares_are_illegal() {
        let game = NoughtsAndCrosses::from_layout("X-- --- ---");
        assert!(!game.legal_place(SideId(0), Coord::new(0, 0)));
        assert!(!game.legal_place(SideId(0), Coord::new(3, 0)));
        assert!(game.legal_place(SideId(0), Coord::new(1, 0)));
        assert_eq!(game.find_path(SideId(0), Coord::new(0, 0), Coord::new(1, 0)), None);
    }

    #[test]
    fn test_layout_reads_back() {
        let text = "OX-\n-O-\n--X\n";
        assert_eq!(NoughtsAndCrosses::from_layout(text).layout(), text);
    }

    #[test]
    fn test_hotseat_game_to_a_win() {
        let mut session = hotseat(NoughtsAndCrosses::new());
        for (column, row) in [(0, 0), (1, 0), (0, 1), (1, 1)] {
            session.play_place(Coord::new(column, row)).unwrap();
        }
        assert_eq!(session.result(), None);
        session.play_place(Coord::new(0, 2)).unwrap();
        assert_eq!(session.result(), Some(GameResult::Won(SideId(0))));
        assert_eq!(session.side_name(SideId(0)), "Noughts");
    }
}
