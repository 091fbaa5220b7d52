//! N-in-a-row on an R x C board, with a Monte Carlo tree search (UCT) opponent.
extern crate rand;

pub mod agents;
pub mod board_game;
pub mod config;
pub mod game;
pub mod n_in_a_row;

pub use board_game::{BoardError, Cell, EndState, GameState, Player, Position};
pub use config::{ConfigError, GameConfig, SearchConfig};
pub use n_in_a_row::NInARowBoard;
