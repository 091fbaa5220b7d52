//! Board and search configuration.
use serde::{Deserialize, Serialize};
use thiserror::Error;

// From UCT formula, "theoretically equivalent to sqrt(2)" - see
// https://en.wikipedia.org/wiki/Monte_Carlo_tree_search#Exploration_and_exploitation
pub const DEFAULT_EXPLORATION_CONSTANT: f64 = std::f64::consts::SQRT_2;

pub const DEFAULT_ITERATIONS: usize = 1000;

#[derive(Clone, Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("board must have at least one row and one column, got {rows}x{cols}")]
    EmptyBoard { rows: usize, cols: usize },
    #[error("win length {win_length} does not fit on a {rows}x{cols} board")]
    BadWinLength {
        win_length: usize,
        rows: usize,
        cols: usize,
    },
    #[error("search needs at least one iteration")]
    NoIterations,
    #[error("search needs at least one thread")]
    NoThreads,
    #[error("exploration constant must be finite and non-negative, got {0}")]
    BadExplorationConstant(f64),
}

/// Shape of the board and how many pieces in a row it takes to win. Fixed for one game.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameConfig {
    pub rows: usize,
    pub cols: usize,
    pub win_length: usize,
}

impl Default for GameConfig {
    fn default() -> Self {
        GameConfig {
            rows: 3,
            cols: 3,
            win_length: 3,
        }
    }
}

impl GameConfig {
    pub fn new(rows: usize, cols: usize, win_length: usize) -> GameConfig {
        GameConfig {
            rows,
            cols,
            win_length,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rows == 0 || self.cols == 0 {
            return Err(ConfigError::EmptyBoard {
                rows: self.rows,
                cols: self.cols,
            });
        }
        // a run has to fit along at least one axis
        if self.win_length == 0 || self.win_length > self.rows.max(self.cols) {
            return Err(ConfigError::BadWinLength {
                win_length: self.win_length,
                rows: self.rows,
                cols: self.cols,
            });
        }
        Ok(())
    }

    pub fn num_cells(&self) -> usize {
        self.rows * self.cols
    }
}

/// Parameters for the UCT search.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SearchConfig {
    // Number of select/expand/simulate/backpropagate rounds per move choice.
    pub iterations: usize,
    // Weight of the exploration term in UCB1.
    pub exploration_constant: f64,
    // Independent trees searched in parallel. 1 means the plain single threaded search.
    pub threads: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        SearchConfig {
            iterations: DEFAULT_ITERATIONS,
            exploration_constant: DEFAULT_EXPLORATION_CONSTANT,
            threads: 1,
        }
    }
}

impl SearchConfig {
    pub fn with_iterations(iterations: usize) -> SearchConfig {
        SearchConfig {
            iterations,
            ..SearchConfig::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.iterations == 0 {
            return Err(ConfigError::NoIterations);
        }
        if self.threads == 0 {
            return Err(ConfigError::NoThreads);
        }
        if !self.exploration_constant.is_finite() || self.exploration_constant < 0. {
            return Err(ConfigError::BadExplorationConstant(
                self.exploration_constant,
            ));
        }
        Ok(())
    }
}

#[test]
fn test_game_config_validate() {
    assert_eq!(GameConfig::default().validate(), Ok(()));
    assert_eq!(GameConfig::new(6, 7, 4).validate(), Ok(()));
    assert_eq!(GameConfig::new(1, 5, 5).validate(), Ok(()));
    assert_eq!(
        GameConfig::new(0, 3, 3).validate(),
        Err(ConfigError::EmptyBoard { rows: 0, cols: 3 })
    );
    assert!(GameConfig::new(3, 3, 4).validate().is_err());
    assert!(GameConfig::new(3, 3, 0).validate().is_err());
}

#[test]
fn test_search_config_validate() {
    assert_eq!(SearchConfig::default().validate(), Ok(()));
    assert_eq!(
        SearchConfig::with_iterations(0).validate(),
        Err(ConfigError::NoIterations)
    );
    let no_threads = SearchConfig {
        threads: 0,
        ..SearchConfig::default()
    };
    assert_eq!(no_threads.validate(), Err(ConfigError::NoThreads));
    let nan = SearchConfig {
        exploration_constant: f64::NAN,
        ..SearchConfig::default()
    };
    assert!(nan.validate().is_err());
}
