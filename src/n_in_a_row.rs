//! N-in-a-row game interface: an R x C grid where players alternate laying down pieces and
//! the first to line up `win_length` of them along a row, column or diagonal wins.
use std::fmt;

use rand::seq::SliceRandom;
use rand::Rng;

use crate::board_game;
use crate::config::GameConfig;

use board_game::Cell::{Empty, Full};
use board_game::EndState::{Draw, Winner};
use board_game::GameState::{Ended, Ongoing};
use board_game::Player::P1;
use board_game::{BoardError, Cell, GameState, Player, Position};

// (row, col) steps for horizontal, vertical, \ diagonal and / diagonal runs
const DIRECTIONS: [(isize, isize); 4] = [(0, 1), (1, 0), (1, 1), (1, -1)];

/// Store the shape and state of the board.
#[derive(Clone, PartialEq, Eq)]
pub struct NInARowBoard {
    // rows, cols and win length, fixed for the lifetime of the board
    config: GameConfig,
    // row-major, so a 3x3 grid would be a vec of length 9
    cells: Vec<Cell>,
    // None only before the first move
    last_move: Option<Position>,
}

impl fmt::Debug for NInARowBoard {
    fn fmt(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        let board_repr: String = self.cells.iter().map(|c| c.symbol()).collect();
        write!(
            formatter,
            "NInARowBoard {{ {}x{} win {}, cells: [{}], last_move: {:?} }}",
            self.config.rows, self.config.cols, self.config.win_length, board_repr, self.last_move,
        )
    }
}

/// Render the board with one-indexed labels. The piece from the last move is upper case:
///
/// ```text
///  1|o|.|.|
///  2|.|X|.|
///  3|.|.|.|
///    1 2 3
/// last move: P2(x) (02, 02)
/// ```
impl fmt::Display for NInARowBoard {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for row in 0..self.config.rows {
            write!(f, "{:>2}|", row + 1)?;
            for col in 0..self.config.cols {
                let pos = Position::new(row, col);
                let mut symbol = self.get(pos).symbol();
                if self.last_move == Some(pos) {
                    symbol = symbol.to_ascii_uppercase();
                }
                write!(f, "{}|", symbol)?;
            }
            writeln!(f)?;
        }
        write!(f, "   ")?;
        for col in 0..self.config.cols {
            write!(f, "{:<2}", (col + 1) % 10)?;
        }
        writeln!(f)?;
        match (self.last_mover(), self.last_move) {
            (Some(player), Some(pos)) => write!(f, "last move: {} {}", player, pos),
            _ => write!(f, "last move: none"),
        }
    }
}

impl NInARowBoard {
    /// Return a new empty board with the given shape.
    pub fn new(config: GameConfig) -> NInARowBoard {
        NInARowBoard {
            cells: vec![Empty; config.num_cells()],
            config,
            last_move: None,
        }
    }

    pub fn config(&self) -> GameConfig {
        self.config
    }

    pub fn last_move(&self) -> Option<Position> {
        self.last_move
    }

    /// The player that made the most recent move, None before the first move.
    pub fn last_mover(&self) -> Option<Player> {
        match self.last_move.map(|pos| self.get(pos)) {
            Some(Full(player)) => Some(player),
            _ => None,
        }
    }

    /// The player whose turn it is. P1 goes first.
    pub fn next_player(&self) -> Player {
        self.last_mover().map_or(P1, Player::get_opponent)
    }

    fn in_range(&self, pos: Position) -> bool {
        pos.row < self.config.rows && pos.col < self.config.cols
    }

    /// Panics if pos is off the board.
    pub fn get(&self, pos: Position) -> Cell {
        self.cells[pos.row * self.config.cols + pos.col]
    }

    pub fn is_valid_move(&self, pos: Position) -> bool {
        self.in_range(pos) && self.get(pos) == Empty
    }

    /// Lay down the next player's piece at pos. Return the state of the game afterwards, Err
    /// if the move is not legal (the board is left untouched).
    pub fn apply_move(&mut self, pos: Position) -> Result<GameState, BoardError> {
        if !self.in_range(pos) {
            return Err(BoardError::OutOfRange(pos));
        }
        if self.get(pos) != Empty {
            return Err(BoardError::CellTaken(pos));
        }
        let player = self.next_player();
        self.cells[pos.row * self.config.cols + pos.col] = Full(player);
        self.last_move = Some(pos);

        Ok(self.outcome())
    }

    /// Empty cells in row-major order.
    pub fn empty_cells(&self) -> Vec<Position> {
        let cols = self.config.cols;
        self.cells
            .iter()
            .enumerate()
            .filter(|&(_, &cell)| cell == Empty)
            .map(|(i, _)| Position::new(i / cols, i % cols))
            .collect()
    }

    /// Every empty cell exactly once, uniformly shuffled. Random playouts and the expansion
    /// order of the tree search both come from this order.
    pub fn legal_moves<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<Position> {
        let mut moves = self.empty_cells();
        moves.shuffle(rng);
        moves
    }

    pub fn num_cells_remaining(&self) -> usize {
        self.cells.iter().filter(|&&c| c == Empty).count()
    }

    /// Length of the run of `player` pieces starting at (row, col) and stepping by (dr, dc).
    fn run_length(&self, row: usize, col: usize, (dr, dc): (isize, isize), player: Player) -> usize {
        let (rows, cols) = (self.config.rows as isize, self.config.cols as isize);
        let (mut r, mut c) = (row as isize, col as isize);
        let mut length = 0;
        while r >= 0 && r < rows && c >= 0 && c < cols {
            if self.get(Position::new(r as usize, c as usize)) != Full(player) {
                break;
            }
            length += 1;
            if length == self.config.win_length {
                break;
            }
            r += dr;
            c += dc;
        }
        length
    }

    /// Ended(Winner) if some cell starts a run of `win_length` along any of the four axes,
    /// Ended(Draw) if the board is full otherwise, Ongoing if neither.
    pub fn outcome(&self) -> GameState {
        for row in 0..self.config.rows {
            for col in 0..self.config.cols {
                if let Full(player) = self.get(Position::new(row, col)) {
                    for &dir in DIRECTIONS.iter() {
                        if self.run_length(row, col, dir, player) >= self.config.win_length {
                            return Ended(Winner(player));
                        }
                    }
                }
            }
        }
        if self.num_cells_remaining() == 0 {
            return Ended(Draw);
        }
        Ongoing
    }

    /// Compact row-major encoding of the cells, e.g. "ox.......", used as a lookup key.
    pub fn cells_key(&self) -> String {
        self.cells.iter().map(|c| c.symbol()).collect()
    }
}

#[cfg(test)]
fn play_moves(board: &mut NInARowBoard, moves: &[(usize, usize)]) -> GameState {
    let mut state = Ongoing;
    for &(r, c) in moves {
        state = board.apply_move(Position::new(r, c)).unwrap();
    }
    state
}

#[test]
fn test_apply_move() {
    use board_game::Player::P2;

    let mut board = NInARowBoard::new(GameConfig::default());
    assert_eq!(board.last_mover(), None);
    assert_eq!(board.next_player(), P1);
    assert_eq!(board.empty_cells().len(), 9);

    assert_eq!(Ok(Ongoing), board.apply_move(Position::new(1, 1)));
    assert_eq!(board.get(Position::new(1, 1)), Full(P1));
    assert_eq!(board.last_mover(), Some(P1));
    assert_eq!(board.last_move(), Some(Position::new(1, 1)));

    assert_eq!(Ok(Ongoing), board.apply_move(Position::new(1, 2)));
    assert_eq!(board.get(Position::new(1, 2)), Full(P2));
    assert_eq!(board.last_mover(), Some(P2));
    assert_eq!(board.empty_cells().len(), 7);

    let before = board.clone();
    assert_eq!(
        Err(BoardError::CellTaken(Position::new(1, 2))),
        board.apply_move(Position::new(1, 2))
    );
    assert_eq!(
        Err(BoardError::OutOfRange(Position::new(1, 3))),
        board.apply_move(Position::new(1, 3))
    );
    assert_eq!(
        Err(BoardError::OutOfRange(Position::new(3, 0))),
        board.apply_move(Position::new(3, 0))
    );
    assert_eq!(board, before);
    assert!(!board.is_valid_move(Position::new(1, 1)));
    assert!(!board.is_valid_move(Position::new(9, 9)));
    assert!(board.is_valid_move(Position::new(0, 0)));
}

#[test]
fn test_legal_moves_are_the_empty_cells() {
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;
    use std::collections::HashSet;

    let mut board = NInARowBoard::new(GameConfig::new(4, 5, 3));
    play_moves(&mut board, &[(0, 0), (3, 4), (2, 2)]);
    let expected: HashSet<Position> = board.empty_cells().into_iter().collect();
    assert_eq!(expected.len(), 17);

    for seed in 0..20 {
        let mut rng = ChaCha20Rng::seed_from_u64(seed);
        let moves = board.legal_moves(&mut rng);
        assert_eq!(moves.len(), 17);
        let got: HashSet<Position> = moves.into_iter().collect();
        assert_eq!(got, expected);
    }
}

#[test]
fn test_top_row_win() {
    let mut board = NInARowBoard::new(GameConfig::default());
    assert_eq!(
        Ongoing,
        play_moves(&mut board, &[(0, 0), (1, 0), (0, 1), (1, 1)])
    );
    assert_eq!(Ended(Winner(P1)), play_moves(&mut board, &[(0, 2)]));
    assert_eq!(board.outcome(), Ended(Winner(P1)));
    assert_eq!(board.outcome().winner(), Some(P1));
}

#[test]
fn test_column_and_diagonal_wins() {
    use board_game::Player::P2;

    // column, won by P2
    let mut board = NInARowBoard::new(GameConfig::default());
    let state = play_moves(&mut board, &[(0, 0), (0, 2), (1, 1), (1, 2), (2, 0), (2, 2)]);
    assert_eq!(state, Ended(Winner(P2)));

    // \ diagonal
    let mut board = NInARowBoard::new(GameConfig::default());
    let state = play_moves(&mut board, &[(0, 0), (0, 1), (1, 1), (0, 2), (2, 2)]);
    assert_eq!(state, Ended(Winner(P1)));

    // / diagonal
    let mut board = NInARowBoard::new(GameConfig::default());
    let state = play_moves(&mut board, &[(0, 2), (0, 0), (1, 1), (0, 1), (2, 0)]);
    assert_eq!(state, Ended(Winner(P1)));
}

#[test]
fn test_full_board_draw() {
    // o x o
    // o x x
    // x o o
    let mut board = NInARowBoard::new(GameConfig::default());
    let state = play_moves(
        &mut board,
        &[(0, 0), (0, 1), (0, 2), (1, 1), (1, 0), (1, 2), (2, 1), (2, 0), (2, 2)],
    );
    assert_eq!(state, Ended(Draw));
    assert_eq!(board.num_cells_remaining(), 0);
    assert_eq!(board.outcome().winner(), None);
}

#[test]
fn test_win_length_shorter_than_board() {
    // four in a row on a 6x7 board, along a / diagonal away from the edges
    let mut board = NInARowBoard::new(GameConfig::new(6, 7, 4));
    let state = play_moves(
        &mut board,
        &[(4, 1), (0, 0), (3, 2), (0, 1), (2, 3), (0, 2)],
    );
    assert_eq!(state, Ongoing);
    assert_eq!(play_moves(&mut board, &[(1, 4)]), Ended(Winner(P1)));

    // three is not enough
    let mut board = NInARowBoard::new(GameConfig::new(6, 7, 4));
    let state = play_moves(&mut board, &[(5, 0), (0, 0), (5, 1), (0, 6), (5, 2)]);
    assert_eq!(state, Ongoing);
}

#[test]
fn test_clone_is_independent() {
    let mut board = NInARowBoard::new(GameConfig::default());
    play_moves(&mut board, &[(1, 1)]);
    let mut copy = board.clone();
    assert_eq!(copy, board);

    copy.apply_move(Position::new(0, 0)).unwrap();
    assert_eq!(board.get(Position::new(0, 0)), Empty);
    assert_eq!(board.last_move(), Some(Position::new(1, 1)));

    board.apply_move(Position::new(2, 2)).unwrap();
    assert_eq!(copy.get(Position::new(2, 2)), Empty);
    assert_eq!(copy.last_move(), Some(Position::new(0, 0)));
}

#[test]
fn test_display_marks_last_move() {
    let mut board = NInARowBoard::new(GameConfig::default());
    play_moves(&mut board, &[(0, 0), (1, 1)]);
    let rendered = board.to_string();
    assert_eq!(
        rendered,
        " 1|o|.|.|\n 2|.|X|.|\n 3|.|.|.|\n   1 2 3 \nlast move: P2(x) (02, 02)"
    );
    assert_eq!(board.cells_key(), "o...x....");
}

/// Winner found by checking every possible line of `win_length` cells directly.
#[cfg(test)]
fn brute_force_outcome(board: &NInARowBoard) -> GameState {
    let GameConfig {
        rows,
        cols,
        win_length,
    } = board.config();
    for player in [P1, P1.get_opponent()] {
        for row in 0..rows as isize {
            for col in 0..cols as isize {
                for &(dr, dc) in DIRECTIONS.iter() {
                    let line_owned = (0..win_length as isize).all(|i| {
                        let (r, c) = (row + i * dr, col + i * dc);
                        r >= 0
                            && c >= 0
                            && (r as usize) < rows
                            && (c as usize) < cols
                            && board.get(Position::new(r as usize, c as usize)) == Full(player)
                    });
                    if line_owned {
                        return Ended(Winner(player));
                    }
                }
            }
        }
    }
    if board.cells.iter().all(|&cell| cell != Empty) {
        return Ended(Draw);
    }
    Ongoing
}

#[test]
fn test_outcome_and_legal_moves_over_random_games() {
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;
    use std::collections::HashSet;

    let configs = [
        GameConfig::default(),
        GameConfig::new(4, 4, 3),
        GameConfig::new(6, 7, 4),
        GameConfig::new(2, 5, 2),
        GameConfig::new(5, 1, 3),
    ];
    for config in configs {
        for seed in 0..25 {
            let mut rng = ChaCha20Rng::seed_from_u64(seed);
            let mut board = NInARowBoard::new(config);
            loop {
                let expected: HashSet<Position> = board.empty_cells().into_iter().collect();
                let moves = board.legal_moves(&mut rng);
                assert_eq!(moves.len(), expected.len());
                assert_eq!(moves.iter().copied().collect::<HashSet<_>>(), expected);
                assert_eq!(moves.len(), board.num_cells_remaining());

                let move_ = match moves.first() {
                    Some(&move_) => move_,
                    None => break,
                };
                let state = board.apply_move(move_).unwrap();
                assert_eq!(state, brute_force_outcome(&board), "{:?}", board);
                if state.is_ended() {
                    break;
                }
            }
        }
    }
}
