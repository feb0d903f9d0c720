//! Built-in games.

mod noughts_and_crosses;

pub use noughts_and_crosses::NoughtsAndCrosses;
