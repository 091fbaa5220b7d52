//! Table-driven reinforcement learning agent.
//!
//! Keeps an estimate of how good every board it has seen is for its own player, picks the
//! move leading to the best looking board (or, now and then, a random one) and backs the
//! final result of each game up through the boards that led to it.
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::agents::{AgentError, BoardGameAgent};
use crate::board_game;
use crate::config::GameConfig;
use crate::n_in_a_row::NInARowBoard;

use board_game::EndState::{Draw, Winner};
use board_game::GameState::Ongoing;
use board_game::Player::{P1, P2};
use board_game::{EndState, Player, Position};

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("failed to {operation} {path}: {source}")]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("bad policy file: {0}")]
    Json(#[from] serde_json::Error),
    #[error("policy was learned on {found:?}, this game is {expected:?}")]
    ShapeMismatch {
        expected: GameConfig,
        found: GameConfig,
    },
}

/// Board value estimates keyed by `NInARowBoard::cells_key`, for one board shape.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ValueTable {
    config: GameConfig,
    values: HashMap<String, f64>,
}

impl ValueTable {
    pub fn new(config: GameConfig) -> ValueTable {
        ValueTable {
            config,
            values: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, board: &NInARowBoard) -> Option<f64> {
        self.values.get(&board.cells_key()).copied()
    }

    fn insert(&mut self, board: &NInARowBoard, value: f64) {
        self.values.insert(board.cells_key(), value);
    }

    pub fn save(&self, path: &Path) -> Result<(), PolicyError> {
        let file = File::create(path).map_err(|source| PolicyError::Io {
            operation: "create",
            path: path.to_path_buf(),
            source,
        })?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, self)?;
        writer.flush().map_err(|source| PolicyError::Io {
            operation: "write",
            path: path.to_path_buf(),
            source,
        })?;
        info!(path = %path.display(), states = self.len(), "saved policy");
        Ok(())
    }

    /// Load a table, refusing one learned on a different board shape.
    pub fn load(path: &Path, expected: GameConfig) -> Result<ValueTable, PolicyError> {
        let file = File::open(path).map_err(|source| PolicyError::Io {
            operation: "open",
            path: path.to_path_buf(),
            source,
        })?;
        let table: ValueTable = serde_json::from_reader(BufReader::new(file))?;
        if table.config != expected {
            return Err(PolicyError::ShapeMismatch {
                expected,
                found: table.config,
            });
        }
        info!(path = %path.display(), states = table.len(), "loaded policy");
        Ok(table)
    }
}

#[derive(Clone, Debug)]
/// Agent that learns board values by temporal difference backups over its own games.
pub struct TabularAgent {
    // Are we P1 or P2?
    player: Player,
    table: ValueTable,
    // Step size of each backup, between 0 and 1.
    learn_rate: f64,
    // Chance of playing a random move instead of the best known one.
    explore_rate: f64,
    rng: ChaCha20Rng,
}

impl BoardGameAgent for TabularAgent {
    fn choose_move(&mut self, board: &NInARowBoard) -> Result<Position, AgentError> {
        let moves = board.legal_moves(&mut self.rng);
        let first = match moves.first() {
            Some(&move_) => move_,
            None => panic!("TabularAgent asked to move on a full board: {:?}", board),
        };
        if self.rng.gen::<f64>() < self.explore_rate {
            return Ok(first);
        }

        let mut best_move = first;
        let mut max_value = f64::NEG_INFINITY;
        for move_ in moves {
            let mut future = board.clone();
            if let Err(msg) = future.apply_move(move_) {
                panic!("TabularAgent tried an illegal move: {}", msg);
            }
            let value = self.value_of(&future);
            if value > max_value {
                best_move = move_;
                max_value = value;
            }
        }
        debug!(player = %self.player, chosen = %best_move, value = max_value, "TabularAgent chose a move");

        Ok(best_move)
    }

    /// Back the final reward up through the game, newest board first.
    fn game_over(&mut self, history: &[NInARowBoard], end_state: EndState) {
        let mut target = self.reward(end_state);
        for board in history.iter().rev() {
            let mut value = self.value_of(board);
            value += self.learn_rate * (target - value);
            self.table.insert(board, value);
            target = value;
        }
    }
}

impl TabularAgent {
    pub fn new(
        player: Player,
        config: GameConfig,
        learn_rate: f64,
        explore_rate: f64,
        seed: u64,
    ) -> TabularAgent {
        TabularAgent::with_table(player, ValueTable::new(config), learn_rate, explore_rate, seed)
    }

    pub fn with_table(
        player: Player,
        table: ValueTable,
        learn_rate: f64,
        explore_rate: f64,
        seed: u64,
    ) -> TabularAgent {
        TabularAgent {
            player,
            table,
            learn_rate,
            explore_rate,
            rng: ChaCha20Rng::seed_from_u64(seed),
        }
    }

    pub fn table(&self) -> &ValueTable {
        &self.table
    }

    pub fn set_explore_rate(&mut self, explore_rate: f64) {
        self.explore_rate = explore_rate;
    }

    /// Reward for how a game ended. Draws are worth less to P1, who had the first move.
    fn reward(&self, end_state: EndState) -> f64 {
        match (end_state, self.player) {
            (Winner(winner), player) if winner == player => 1.,
            (Winner(_), _) => 0.,
            (Draw, P1) => 0.1,
            (Draw, P2) => 0.5,
        }
    }

    /// Known value of a board, or a first guess that is remembered: 1 for a board we have
    /// won, 0.5 for an unfinished game, 0 otherwise.
    fn value_of(&mut self, board: &NInARowBoard) -> f64 {
        if let Some(value) = self.table.get(board) {
            return value;
        }
        let value = match board.outcome() {
            Ongoing => 0.5,
            state if state.winner() == Some(self.player) => 1.,
            _ => 0.,
        };
        self.table.insert(board, value);
        value
    }
}

#[cfg(test)]
fn board_after(moves: &[(usize, usize)]) -> NInARowBoard {
    let mut board = NInARowBoard::new(GameConfig::default());
    for &(r, c) in moves {
        board.apply_move(Position::new(r, c)).unwrap();
    }
    board
}

#[test]
fn test_greedy_agent_takes_the_win() {
    let board = board_after(&[(0, 0), (1, 0), (0, 1), (1, 1)]);
    let mut agent = TabularAgent::new(P1, GameConfig::default(), 0.1, 0., 1);
    assert_eq!(agent.choose_move(&board).unwrap(), Position::new(0, 2));
    // every board it looked at is now in the table
    assert_eq!(agent.table().len(), 5);
}

#[test]
fn test_game_over_backs_up_reward() {
    let first = board_after(&[(0, 0)]);
    let second = board_after(&[(0, 0), (1, 1)]);
    let mut agent = TabularAgent::new(P1, GameConfig::default(), 0.5, 0.1, 1);
    agent.game_over(&[first.clone(), second.clone()], Winner(P1));
    assert_eq!(agent.table().get(&second), Some(0.75));
    assert_eq!(agent.table().get(&first), Some(0.625));

    let mut loser = TabularAgent::new(P2, GameConfig::default(), 0.5, 0.1, 1);
    loser.game_over(&[first.clone(), second.clone()], Winner(P1));
    assert_eq!(loser.table().get(&second), Some(0.25));
    assert_eq!(loser.table().get(&first), Some(0.375));
}

#[test]
fn test_draw_rewards() {
    let p1 = TabularAgent::new(P1, GameConfig::default(), 0.1, 0.1, 1);
    let p2 = TabularAgent::new(P2, GameConfig::default(), 0.1, 0.1, 1);
    assert_eq!(p1.reward(Draw), 0.1);
    assert_eq!(p2.reward(Draw), 0.5);
    assert_eq!(p2.reward(Winner(P2)), 1.);
    assert_eq!(p1.reward(Winner(P2)), 0.);
}

#[test]
fn test_value_table_save_and_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("p1.json");

    let mut agent = TabularAgent::new(P1, GameConfig::default(), 0.5, 0., 1);
    agent.game_over(&[board_after(&[(0, 0)])], Winner(P1));
    agent.table().save(&path).unwrap();

    let loaded = ValueTable::load(&path, GameConfig::default()).unwrap();
    assert_eq!(&loaded, agent.table());

    let mismatch = ValueTable::load(&path, GameConfig::new(4, 4, 3));
    assert!(matches!(mismatch, Err(PolicyError::ShapeMismatch { .. })));

    let missing = ValueTable::load(&dir.path().join("nope.json"), GameConfig::default());
    assert!(matches!(missing, Err(PolicyError::Io { .. })));
}
