//! Shared vocabulary for two player, N-in-a-row style board games.
use std::fmt;

use thiserror::Error;

use Player::{P1, P2};

/// Errors from entering a move onto a board.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum BoardError {
    #[error("out of range: {0}")]
    OutOfRange(Position),
    #[error("cell taken: {0}")]
    CellTaken(Position),
}

/// Did the game end in a draw or was there a winner?
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EndState {
    Winner(Player),
    Draw,
}

/// Has the game ended or is it ongoing?
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GameState {
    Ended(EndState),
    Ongoing,
}

impl GameState {
    pub fn is_ended(self) -> bool {
        matches!(self, GameState::Ended(_))
    }

    /// The winning player, if there is one. A draw and an unfinished game both return None.
    pub fn winner(self) -> Option<Player> {
        match self {
            GameState::Ended(EndState::Winner(player)) => Some(player),
            _ => None,
        }
    }
}

/// Used for deciding whose turn it is. P1 goes first.
#[derive(Eq, Hash, Clone, Copy, Debug, PartialEq)]
pub enum Player {
    P1,
    P2,
}

impl Player {
    pub fn get_opponent(self) -> Player {
        match self {
            P1 => P2,
            P2 => P1,
        }
    }

    /// Character used when rendering the player's pieces.
    pub fn symbol(self) -> char {
        match self {
            P1 => 'o',
            P2 => 'x',
        }
    }
}

impl fmt::Display for Player {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}({})", self, self.symbol())
    }
}

/// Represents a single cell of a game board.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Cell {
    Empty,
    Full(Player),
}

impl Cell {
    pub fn symbol(self) -> char {
        match self {
            Cell::Empty => '.',
            Cell::Full(player) => player.symbol(),
        }
    }
}

/// A (row, col) coordinate on the board. Zero-indexed; displayed one-indexed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Position {
    pub row: usize,
    pub col: usize,
}

impl Position {
    pub fn new(row: usize, col: usize) -> Position {
        Position { row, col }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "({:02}, {:02})", self.row + 1, self.col + 1)
    }
}

#[test]
fn test_get_opponent() {
    assert_eq!(P1.get_opponent(), P2);
    assert_eq!(P2.get_opponent(), P1);
    assert_eq!(P1.get_opponent().get_opponent(), P1);
}

#[test]
fn test_position_display_is_one_indexed() {
    assert_eq!(Position::new(0, 2).to_string(), "(01, 03)");
    assert_eq!(Position::new(11, 9).to_string(), "(12, 10)");
}

#[test]
fn test_game_state_winner() {
    assert_eq!(GameState::Ended(EndState::Winner(P2)).winner(), Some(P2));
    assert_eq!(GameState::Ended(EndState::Draw).winner(), None);
    assert!(GameState::Ended(EndState::Draw).is_ended());
    assert_eq!(GameState::Ongoing.winner(), None);
    assert!(!GameState::Ongoing.is_ended());
}
