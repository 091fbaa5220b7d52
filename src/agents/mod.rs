//! Agents that can play N-in-a-row: a human at a terminal, a random mover, the UCT search
//! agent and a table-driven reinforcement learner.
mod mcts_agent;
mod tabular_agent;
pub use mcts_agent::{
    search_with_stats, simulate_random_playout, uct_search, MCTSAgent, MoveStats, NodeId,
    SearchReport, SearchTree, TreeNode,
};
pub use tabular_agent::{PolicyError, TabularAgent, ValueTable};

use std::io::{self, BufRead, Write};

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use thiserror::Error;
use tracing::warn;

use crate::board_game::{EndState, Position};
use crate::n_in_a_row::NInARowBoard;

/// Why an agent did not produce a move.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("player quit")]
    Quit,
    #[error("failed to read move: {0}")]
    Input(#[from] io::Error),
}

/// An agent that will choose a valid move given the state of the game board.
pub trait BoardGameAgent {
    fn choose_move(&mut self, board: &NInARowBoard) -> Result<Position, AgentError>;

    /// Called once a game this agent played in is over. `history` holds the board after
    /// every move, in order.
    fn game_over(&mut self, _history: &[NInARowBoard], _end_state: EndState) {}
}

/*
 * -----------
 * Human Agent
 * -----------
 */

/// Errors from parsing a line of human input.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ParseMoveError {
    #[error("expected \"row,col\"")]
    BadFormat,
    #[error("\"{0}\" is not a row or column number")]
    NotANumber(String),
    #[error("rows and columns start at 1")]
    ZeroIndex,
}

/// A parsed line of human input.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HumanInput {
    Move(Position),
    Quit,
}

/// Parse "row,col" (one-indexed, e.g. "1,3" is the top right of a 3x3 board) or "q".
pub fn parse_move(input: &str) -> Result<HumanInput, ParseMoveError> {
    let input = input.trim();
    if input == "q" {
        return Ok(HumanInput::Quit);
    }
    let fields: Vec<&str> = input.split(',').map(str::trim).collect();
    if fields.len() != 2 {
        return Err(ParseMoveError::BadFormat);
    }
    let mut indexes = [0usize; 2];
    for (index, field) in indexes.iter_mut().zip(fields) {
        *index = field
            .parse()
            .map_err(|_| ParseMoveError::NotANumber(field.to_string()))?;
        if *index == 0 {
            return Err(ParseMoveError::ZeroIndex);
        }
    }

    Ok(HumanInput::Move(Position::new(indexes[0] - 1, indexes[1] - 1)))
}

/// Where a human agent's typed lines come from.
pub trait LineSource {
    /// Append the next line, newline included, to `buf`. Ok(0) at the end of input.
    fn read_raw_line(&mut self, buf: &mut Vec<u8>) -> io::Result<usize>;
}

impl<R: BufRead> LineSource for R {
    fn read_raw_line(&mut self, buf: &mut Vec<u8>) -> io::Result<usize> {
        self.read_until(b'\n', buf)
    }
}

/// The process's stdin, locked for one line at a time so several agents can share it.
#[derive(Clone, Copy, Debug, Default)]
pub struct SharedStdin;

impl LineSource for SharedStdin {
    fn read_raw_line(&mut self, buf: &mut Vec<u8>) -> io::Result<usize> {
        io::stdin().lock().read_until(b'\n', buf)
    }
}

/// An agent controlled by the user running the program.
pub struct HumanAgent<R, W> {
    input: R,
    output: W,
}

impl HumanAgent<SharedStdin, io::Stdout> {
    /// Human at the terminal.
    pub fn stdio() -> Self {
        HumanAgent::new(SharedStdin, io::stdout())
    }
}

impl<R: LineSource, W: Write> HumanAgent<R, W> {
    pub fn new(input: R, output: W) -> Self {
        HumanAgent { input, output }
    }
}

impl<R: LineSource, W: Write> BoardGameAgent for HumanAgent<R, W> {
    /// Keep asking until we get a legal move. "q" or the end of input quits.
    fn choose_move(&mut self, board: &NInARowBoard) -> Result<Position, AgentError> {
        loop {
            write!(self.output, "{}(row, col)> ", board.next_player())?;
            self.output.flush()?;

            let mut raw = Vec::new();
            if self.input.read_raw_line(&mut raw)? == 0 {
                return Err(AgentError::Quit);
            }
            // bytes that are not UTF-8 just make a line that fails to parse
            let line = String::from_utf8_lossy(&raw);
            match parse_move(&line) {
                Ok(HumanInput::Quit) => return Err(AgentError::Quit),
                Ok(HumanInput::Move(pos)) if board.is_valid_move(pos) => return Ok(pos),
                Ok(HumanInput::Move(pos)) => {
                    warn!(%pos, "rejected illegal move from human");
                    writeln!(self.output, "Oops, {} is not a legal move", pos)?;
                }
                Err(msg) => {
                    writeln!(self.output, "Oops, enter valid input: {}", msg)?;
                }
            }
        }
    }
}

/*
 * ------------
 * Random Agent
 * ------------
 */

#[derive(Clone, Debug)]
/// Agent that makes random moves.
pub struct RandomAgent {
    rng: ChaCha20Rng,
}

impl BoardGameAgent for RandomAgent {
    fn choose_move(&mut self, board: &NInARowBoard) -> Result<Position, AgentError> {
        match board.empty_cells().choose(&mut self.rng) {
            Some(&move_) => Ok(move_),
            None => panic!("RandomAgent asked to move on a full board: {:?}", board),
        }
    }
}

impl RandomAgent {
    pub fn new(seed: u64) -> RandomAgent {
        RandomAgent {
            rng: ChaCha20Rng::seed_from_u64(seed),
        }
    }
}

#[test]
fn test_parse_move() {
    assert_eq!(parse_move("1,3\n"), Ok(HumanInput::Move(Position::new(0, 2))));
    assert_eq!(parse_move(" 12 , 4 "), Ok(HumanInput::Move(Position::new(11, 3))));
    assert_eq!(parse_move("q\n"), Ok(HumanInput::Quit));
    assert_eq!(parse_move("a0"), Err(ParseMoveError::BadFormat));
    assert_eq!(parse_move("1,2,3"), Err(ParseMoveError::BadFormat));
    assert_eq!(
        parse_move("one,2"),
        Err(ParseMoveError::NotANumber("one".to_string()))
    );
    assert_eq!(parse_move("0,2"), Err(ParseMoveError::ZeroIndex));
}

#[test]
fn test_human_agent_retries_until_legal() {
    use crate::config::GameConfig;

    let mut board = NInARowBoard::new(GameConfig::default());
    board.apply_move(Position::new(0, 0)).unwrap();

    let input = "nonsense\n1,1\n4,1\n2,2\n";
    let mut output = Vec::new();
    let move_ = HumanAgent::new(input.as_bytes(), &mut output)
        .choose_move(&board)
        .unwrap();
    assert_eq!(move_, Position::new(1, 1));

    let printed = String::from_utf8(output).unwrap();
    assert_eq!(printed.matches("(row, col)> ").count(), 4);
    assert!(printed.contains("Oops, enter valid input"));
    assert!(printed.contains("(01, 01) is not a legal move"));
    assert!(printed.contains("(04, 01) is not a legal move"));
}

#[test]
fn test_human_agent_reprompts_after_bytes_that_are_not_utf8() {
    use crate::config::GameConfig;

    let board = NInARowBoard::new(GameConfig::default());
    let input: &[u8] = b"\xff\xfe\n2,2\n";
    let mut output = Vec::new();
    let move_ = HumanAgent::new(input, &mut output)
        .choose_move(&board)
        .unwrap();
    assert_eq!(move_, Position::new(1, 1));

    let printed = String::from_utf8(output).unwrap();
    assert_eq!(printed.matches("(row, col)> ").count(), 2);
    assert!(printed.contains("Oops, enter valid input"));
}

#[test]
fn test_human_agent_quits() {
    use crate::config::GameConfig;

    let board = NInARowBoard::new(GameConfig::default());
    let quit = HumanAgent::new("x\nq\n".as_bytes(), io::sink()).choose_move(&board);
    assert!(matches!(quit, Err(AgentError::Quit)));

    let eof = HumanAgent::new("".as_bytes(), io::sink()).choose_move(&board);
    assert!(matches!(eof, Err(AgentError::Quit)));
}

#[test]
fn test_random_agent_moves_legally() {
    use crate::config::GameConfig;

    let mut board = NInARowBoard::new(GameConfig::new(4, 4, 3));
    let mut agent = RandomAgent::new(9);
    while !board.outcome().is_ended() {
        let move_ = agent.choose_move(&board).unwrap();
        assert!(board.is_valid_move(move_));
        board.apply_move(move_).unwrap();
    }
}
