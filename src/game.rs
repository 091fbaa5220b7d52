//! Game loop: alternate two agents on one authoritative board until the game ends.
use tracing::{debug, info, warn};

use crate::agents::{AgentError, BoardGameAgent};
use crate::board_game;
use crate::config::GameConfig;
use crate::n_in_a_row::NInARowBoard;

use board_game::EndState::{Draw, Winner};
use board_game::GameState::Ended;
use board_game::Player::{P1, P2};
use board_game::{EndState, Position};

/// How a game went.
#[derive(Clone, Debug)]
pub struct GameRecord {
    pub end_state: EndState,
    // moves in the order they were played, P1 first
    pub moves: Vec<Position>,
    // the board after each move
    pub history: Vec<NInARowBoard>,
}

/// Play a game between p1 (who moves first) and p2. If `show` is set the board is printed to
/// stdout after every move. A move the board rejects is asked for again. An agent quitting
/// ends the game early with its error. With `feedback` set both agents hear how the game
/// ended, so learning agents learn from it.
pub fn play(
    p1: &mut dyn BoardGameAgent,
    p2: &mut dyn BoardGameAgent,
    config: GameConfig,
    show: bool,
    feedback: bool,
) -> Result<GameRecord, AgentError> {
    let mut board = NInARowBoard::new(config);
    let mut moves = vec![];
    let mut history = vec![];
    if show {
        println!("{}\n", board);
    }

    let end_state = loop {
        let player = board.next_player();
        let move_ = match player {
            P1 => p1.choose_move(&board)?,
            P2 => p2.choose_move(&board)?,
        };
        let state = match board.apply_move(move_) {
            Ok(state) => state,
            Err(msg) => {
                warn!(%player, "agent chose an illegal move: {}", msg);
                continue;
            }
        };
        debug!(%player, %move_, "move played");
        moves.push(move_);
        history.push(board.clone());
        if show {
            println!("{}\n", board);
        }
        if let Ended(end_state) = state {
            break end_state;
        }
    };

    match end_state {
        Winner(player) => info!(%player, moves = moves.len(), "game won"),
        Draw => info!(moves = moves.len(), "game drawn"),
    }
    if show {
        match end_state {
            Winner(player) => println!("{} wins in {} moves!", player, moves.len()),
            Draw => println!("Draw!"),
        }
    }
    if feedback {
        p1.game_over(&history, end_state);
        p2.game_over(&history, end_state);
    }

    Ok(GameRecord {
        end_state,
        moves,
        history,
    })
}

/// Wins and draws over a series of games.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Tally {
    pub p1_wins: usize,
    pub p2_wins: usize,
    pub draws: usize,
}

impl Tally {
    pub fn record(&mut self, end_state: EndState) {
        match end_state {
            Winner(P1) => self.p1_wins += 1,
            Winner(P2) => self.p2_wins += 1,
            Draw => self.draws += 1,
        }
    }

    pub fn games(&self) -> usize {
        self.p1_wins + self.p2_wins + self.draws
    }
}

/// Play `episodes` silent games between the same two agents. With `feedback` the agents
/// learn from every game; without it the series only measures how they do.
pub fn train(
    p1: &mut dyn BoardGameAgent,
    p2: &mut dyn BoardGameAgent,
    config: GameConfig,
    episodes: usize,
    feedback: bool,
) -> Result<Tally, AgentError> {
    let mut tally = Tally::default();
    for episode in 0..episodes {
        let record = play(p1, p2, config, false, feedback)?;
        tally.record(record.end_state);
        debug!(episode, ?tally, "training game finished");
    }
    info!(
        p1_wins = tally.p1_wins,
        p2_wins = tally.p2_wins,
        draws = tally.draws,
        feedback,
        "series finished"
    );
    Ok(tally)
}

#[test]
fn test_scripted_game_top_row_win() {
    use crate::agents::HumanAgent;
    use std::io;

    let mut p1 = HumanAgent::new("1,1\n1,2\n1,3\n".as_bytes(), io::sink());
    let mut p2 = HumanAgent::new("2,1\n2,2\n".as_bytes(), io::sink());
    let record = play(&mut p1, &mut p2, GameConfig::default(), false, true).unwrap();

    assert_eq!(record.end_state, Winner(P1));
    assert_eq!(
        record.moves,
        vec![
            Position::new(0, 0),
            Position::new(1, 0),
            Position::new(0, 1),
            Position::new(1, 1),
            Position::new(0, 2),
        ]
    );
    assert_eq!(record.history.len(), 5);
    assert_eq!(record.history[4].outcome(), Ended(Winner(P1)));
}

#[test]
fn test_quit_ends_the_game() {
    use crate::agents::{HumanAgent, RandomAgent};
    use std::io;

    let mut p1 = HumanAgent::new("2,2\nq\n".as_bytes(), io::sink());
    let mut p2 = RandomAgent::new(0);
    let result = play(&mut p1, &mut p2, GameConfig::default(), false, true);
    assert!(matches!(result, Err(AgentError::Quit)));
}

#[test]
fn test_random_games_are_consistent() {
    use crate::agents::RandomAgent;

    let config = GameConfig::new(4, 5, 3);
    let mut p1 = RandomAgent::new(1);
    let mut p2 = RandomAgent::new(2);
    for _ in 0..20 {
        let record = play(&mut p1, &mut p2, config, false, true).unwrap();
        assert_eq!(record.moves.len(), record.history.len());
        let last = record.history.last().unwrap();
        assert_eq!(last.outcome(), Ended(record.end_state));
        assert_eq!(last.num_cells_remaining(), config.num_cells() - record.moves.len());
        for (i, (board, &move_)) in record.history.iter().zip(record.moves.iter()).enumerate() {
            assert_eq!(board.last_move(), Some(move_));
            let mover = if i % 2 == 0 { P1 } else { P2 };
            assert_eq!(board.last_mover(), Some(mover));
        }
    }
}

#[test]
fn test_mcts_plays_a_full_game() {
    use crate::agents::{MCTSAgent, RandomAgent};
    use crate::config::SearchConfig;

    let mut p1 = RandomAgent::new(3);
    let mut p2 = MCTSAgent::new(SearchConfig::with_iterations(200), 4);
    let record = play(&mut p1, &mut p2, GameConfig::default(), false, true).unwrap();
    assert!(!record.moves.is_empty());
    assert!(record.history.last().unwrap().outcome().is_ended());
}

#[test]
fn test_train_tabular_agents() {
    use crate::agents::TabularAgent;

    let config = GameConfig::default();
    let mut p1 = TabularAgent::new(P1, config, 0.1, 0.1, 1);
    let mut p2 = TabularAgent::new(P2, config, 0.1, 0.1, 2);
    let tally = train(&mut p1, &mut p2, config, 200, true).unwrap();
    assert_eq!(tally.games(), 200);
    assert!(!p1.table().is_empty());
    assert!(!p2.table().is_empty());
}

#[cfg(test)]
struct CountingAgent {
    inner: crate::agents::RandomAgent,
    games_heard: usize,
}

#[cfg(test)]
impl BoardGameAgent for CountingAgent {
    fn choose_move(&mut self, board: &NInARowBoard) -> Result<Position, AgentError> {
        self.inner.choose_move(board)
    }

    fn game_over(&mut self, _history: &[NInARowBoard], _end_state: EndState) {
        self.games_heard += 1;
    }
}

#[test]
fn test_feedback_switch_controls_game_over() {
    use crate::agents::RandomAgent;

    let config = GameConfig::default();
    let mut p1 = CountingAgent {
        inner: RandomAgent::new(5),
        games_heard: 0,
    };
    let mut p2 = CountingAgent {
        inner: RandomAgent::new(6),
        games_heard: 0,
    };
    let tally = train(&mut p1, &mut p2, config, 7, true).unwrap();
    assert_eq!(tally.games(), 7);
    assert_eq!((p1.games_heard, p2.games_heard), (7, 7));

    let tally = train(&mut p1, &mut p2, config, 5, false).unwrap();
    assert_eq!(tally.games(), 5);
    assert_eq!((p1.games_heard, p2.games_heard), (7, 7));
}

#[test]
fn test_evaluation_leaves_learned_values_alone() {
    use crate::agents::TabularAgent;

    let config = GameConfig::default();
    let mut p1 = TabularAgent::new(P1, config, 0.2, 0.3, 1);
    let mut p2 = TabularAgent::new(P2, config, 0.2, 0.3, 2);
    train(&mut p1, &mut p2, config, 300, true).unwrap();

    p1.set_explore_rate(0.);
    p2.set_explore_rate(0.);
    let record = play(&mut p1, &mut p2, config, false, false).unwrap();
    let before: Vec<Option<f64>> = record.history.iter().map(|b| p1.table().get(b)).collect();
    train(&mut p1, &mut p2, config, 50, false).unwrap();
    let after: Vec<Option<f64>> = record.history.iter().map(|b| p1.table().get(b)).collect();
    assert_eq!(before, after);
}
