//! Monte Carlo tree search (UCT) agent.
//!
//! Each call to `choose_move` grows a fresh tree from the current board: select down the
//! tree with UCB1, expand one untried move, play a random game out from there, then
//! backpropagate the result to the root. The most visited root child is the chosen move.
extern crate num_cpus;
extern crate scoped_threadpool;

use std::cmp::Ordering;
use std::time::Instant;

use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use scoped_threadpool::Pool;
use tracing::{debug, info};

use crate::agents::{AgentError, BoardGameAgent};
use crate::board_game;
use crate::config::SearchConfig;
use crate::n_in_a_row::NInARowBoard;

use board_game::EndState::{Draw, Winner};
use board_game::GameState::{Ended, Ongoing};
use board_game::{EndState, GameState, Player, Position};

/// Index into the node arena of a `SearchTree`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

#[derive(Clone, Debug, PartialEq)]
/// Tree node for the Monte Carlo search tree.
pub struct TreeNode {
    // The move that reached this node from its parent. At the root, the last move on the board.
    move_: Option<Position>,
    // The player that made `move_`, and whose point of view this node's value is scored from.
    player: Option<Player>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    // Number of playouts that have passed through this node.
    visits: u32,
    // +1 per win, -1 per loss and +0.5 per draw, from `player`'s side.
    value: f64,
    // Moves from this node that have no child yet, popped from the back. Empty at end states.
    untried_moves: Vec<Position>,
}

impl TreeNode {
    pub fn move_(&self) -> Option<Position> {
        self.move_
    }

    pub fn player(&self) -> Option<Player> {
        self.player
    }

    pub fn visits(&self) -> u32 {
        self.visits
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    /// UCB1: mean value plus an exploration bonus that shrinks as the node is visited more
    /// relative to its parent. Only meaningful once the node has been visited.
    fn ucb_score(&self, parent_visits: u32, exploration_constant: f64) -> f64 {
        let visits = self.visits as f64;
        self.value / visits + exploration_constant * ((parent_visits as f64).ln() / visits).sqrt()
    }

    /// A playout through this node ended in `endstate`; score it from this node's player's side.
    fn update(&mut self, endstate: EndState) {
        self.visits += 1;
        self.value += match endstate {
            Draw => 0.5,
            Winner(winner) if Some(winner) == self.player => 1.,
            Winner(_) => -1.,
        };
    }
}

/// Arena of tree nodes addressed by `NodeId`. The root is always the first node, and the
/// whole tree is dropped once a move has been chosen.
#[derive(Clone, Debug)]
pub struct SearchTree {
    nodes: Vec<TreeNode>,
}

impl SearchTree {
    pub fn new<R: Rng + ?Sized>(board: &NInARowBoard, rng: &mut R) -> SearchTree {
        let root = TreeNode {
            move_: board.last_move(),
            player: board.last_mover(),
            parent: None,
            children: vec![],
            visits: 0,
            value: 0.,
            untried_moves: untried_moves_for(board, rng),
        };
        SearchTree { nodes: vec![root] }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn get(&self, id: NodeId) -> &TreeNode {
        &self.nodes[id.0]
    }

    fn get_mut(&mut self, id: NodeId) -> &mut TreeNode {
        &mut self.nodes[id.0]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn children(&self, id: NodeId) -> impl Iterator<Item = &TreeNode> + '_ {
        self.get(id).children.iter().map(move |&child| self.get(child))
    }

    /// The child to descend into, if this node has no untried moves left and at least one
    /// child. Ties go to the later child.
    fn select_child(&self, id: NodeId, exploration_constant: f64) -> Option<NodeId> {
        let node = self.get(id);
        if !node.untried_moves.is_empty() {
            return None;
        }
        node.children.iter().copied().max_by(|&a, &b| {
            let score_a = self.get(a).ucb_score(node.visits, exploration_constant);
            let score_b = self.get(b).ucb_score(node.visits, exploration_constant);
            score_a.partial_cmp(&score_b).unwrap_or(Ordering::Equal)
        })
    }

    /// Add a child for `move_`, which has just been applied to `board`.
    fn add_child<R: Rng + ?Sized>(
        &mut self,
        parent: NodeId,
        move_: Position,
        board: &NInARowBoard,
        rng: &mut R,
    ) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(TreeNode {
            move_: Some(move_),
            player: board.last_mover(),
            parent: Some(parent),
            children: vec![],
            visits: 0,
            value: 0.,
            untried_moves: untried_moves_for(board, rng),
        });
        self.get_mut(parent).children.push(id);
        id
    }

    /// Update every node from `leaf` up to and including the root.
    fn backpropagate(&mut self, leaf: NodeId, endstate: EndState) {
        let mut current = Some(leaf);
        while let Some(id) = current {
            let node = self.get_mut(id);
            node.update(endstate);
            current = node.parent;
        }
    }

    /// One round of select, expand, simulate and backpropagate on a private copy of `board`.
    fn run_iteration<R: Rng + ?Sized>(
        &mut self,
        board: &NInARowBoard,
        exploration_constant: f64,
        rng: &mut R,
    ) {
        let mut board = board.clone();
        let mut node = self.root();

        while let Some(child) = self.select_child(node, exploration_constant) {
            node = child;
            let move_ = match self.get(node).move_ {
                Some(move_) => move_,
                None => panic!("SearchTree has a non-root node without a move"),
            };
            enter_search_move(&mut board, move_);
        }

        if let Some(move_) = self.get_mut(node).untried_moves.pop() {
            enter_search_move(&mut board, move_);
            node = self.add_child(node, move_, &board, rng);
        }

        let endstate = simulate_random_playout(&mut board, rng);
        self.backpropagate(node, endstate);
    }

    fn root_stats(&self) -> Vec<MoveStats> {
        self.children(self.root())
            .filter_map(|child| {
                child.move_.map(|move_| MoveStats {
                    move_,
                    visits: child.visits,
                    value: child.value,
                })
            })
            .collect()
    }
}

fn untried_moves_for<R: Rng + ?Sized>(board: &NInARowBoard, rng: &mut R) -> Vec<Position> {
    match board.outcome() {
        Ongoing => board.legal_moves(rng),
        Ended(_) => vec![],
    }
}

/// Enter a move the search picked itself. Failing here means the tree and board disagree.
fn enter_search_move(board: &mut NInARowBoard, move_: Position) -> GameState {
    match board.apply_move(move_) {
        Ok(state) => state,
        Err(msg) => panic!("search entered an illegal move: {}, board: {:?}", msg, board),
    }
}

/// Play uniformly random moves until the game ends and return how it ended.
pub fn simulate_random_playout<R: Rng + ?Sized>(board: &mut NInARowBoard, rng: &mut R) -> EndState {
    let mut state = board.outcome();
    loop {
        if let Ended(endstate) = state {
            return endstate;
        }
        let move_ = match board.empty_cells().choose(rng) {
            Some(&move_) => move_,
            None => panic!("ongoing game with no empty cells: {:?}", board),
        };
        state = enter_search_move(board, move_);
    }
}

/// Visit statistics for one of the root's children.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MoveStats {
    pub move_: Position,
    pub visits: u32,
    pub value: f64,
}

/// What a search found: the chosen move and the root children it was chosen from.
#[derive(Clone, Debug)]
pub struct SearchReport {
    pub best_move: Position,
    pub children: Vec<MoveStats>,
    pub total_playouts: usize,
}

/// Run `iterations` rounds on a single tree and return the root children's statistics.
fn search_tree<R: Rng + ?Sized>(
    board: &NInARowBoard,
    iterations: usize,
    exploration_constant: f64,
    rng: &mut R,
) -> Vec<MoveStats> {
    let mut tree = SearchTree::new(board, rng);
    for _ in 0..iterations {
        tree.run_iteration(board, exploration_constant, rng);
    }
    debug!(nodes = tree.len(), iterations, "search tree complete");
    tree.root_stats()
}

/// Sum the per-move statistics of independent trees.
fn merge_stats(results: Vec<Vec<MoveStats>>) -> Vec<MoveStats> {
    let mut merged: Vec<MoveStats> = vec![];
    for stats in results.into_iter().flatten() {
        match merged.iter_mut().find(|m| m.move_ == stats.move_) {
            Some(m) => {
                m.visits += stats.visits;
                m.value += stats.value;
            }
            None => merged.push(stats),
        }
    }
    merged
}

/// Search from `board` and report on the root's children. With more than one thread the
/// iteration budget is split across independent trees whose root statistics are summed.
///
/// Panics if the game on `board` is already over or the config asks for no iterations.
pub fn search_with_stats<R: Rng + ?Sized>(
    board: &NInARowBoard,
    config: &SearchConfig,
    rng: &mut R,
) -> SearchReport {
    assert!(config.iterations > 0, "UCT search needs at least one iteration");
    assert!(
        !board.outcome().is_ended(),
        "UCT search on a finished game: {:?}",
        board
    );

    let threads = config.threads.max(1).min(config.iterations);
    let children = if threads == 1 {
        search_tree(board, config.iterations, config.exploration_constant, rng)
    } else {
        let seeds: Vec<u64> = (0..threads).map(|_| rng.gen()).collect();
        let mut results: Vec<Vec<MoveStats>> = vec![vec![]; threads];
        let mut pool = Pool::new(threads as u32);
        pool.scoped(|scoped| {
            for (i, (result, &seed)) in results.iter_mut().zip(seeds.iter()).enumerate() {
                // spread the remainder over the first few trees
                let iterations =
                    config.iterations / threads + usize::from(i < config.iterations % threads);
                let exploration_constant = config.exploration_constant;
                scoped.execute(move || {
                    let mut tree_rng = ChaCha20Rng::seed_from_u64(seed);
                    *result = search_tree(board, iterations, exploration_constant, &mut tree_rng);
                });
            }
        });
        merge_stats(results)
    };

    let best_move = match children.iter().max_by_key(|stats| stats.visits) {
        Some(stats) => stats.move_,
        None => panic!("UCT search produced no root children for {:?}", board),
    };
    let total_playouts = children.iter().map(|stats| stats.visits as usize).sum();

    SearchReport {
        best_move,
        children,
        total_playouts,
    }
}

/// The most visited move after searching from `board`. Never modifies `board`.
pub fn uct_search<R: Rng + ?Sized>(
    board: &NInARowBoard,
    config: &SearchConfig,
    rng: &mut R,
) -> Position {
    search_with_stats(board, config, rng).best_move
}

#[derive(Clone, Debug)]
/// AI agent that searches a fresh UCT tree with a fixed iteration budget for every move.
pub struct MCTSAgent {
    config: SearchConfig,
    rng: ChaCha20Rng,
}

impl BoardGameAgent for MCTSAgent {
    fn choose_move(&mut self, board: &NInARowBoard) -> Result<Position, AgentError> {
        info!(player = %board.next_player(), "MCTSAgent is thinking...");
        let now = Instant::now();
        let report = search_with_stats(board, &self.config, &mut self.rng);

        for stats in report.children.iter() {
            debug!(
                "{}: visits: {}, value: {:.3}, mean: {:.3}",
                stats.move_,
                stats.visits,
                stats.value,
                stats.value / stats.visits as f64
            );
        }
        let elapsed = now.elapsed();
        let playouts_per_sec =
            report.total_playouts as f64 / elapsed.as_secs_f64().max(f64::EPSILON);
        info!(
            chosen = %report.best_move,
            playouts = report.total_playouts,
            took = ?elapsed,
            playouts_per_sec,
            "MCTSAgent chose a move"
        );

        Ok(report.best_move)
    }
}

impl MCTSAgent {
    pub fn new(config: SearchConfig, seed: u64) -> MCTSAgent {
        MCTSAgent {
            config,
            rng: ChaCha20Rng::seed_from_u64(seed),
        }
    }

    /// Use every core the machine has for root-parallel search.
    pub fn with_all_cores(mut config: SearchConfig, seed: u64) -> MCTSAgent {
        config.threads = num_cpus::get();
        MCTSAgent::new(config, seed)
    }
}

#[cfg(test)]
fn board_after(moves: &[(usize, usize)]) -> NInARowBoard {
    use crate::config::GameConfig;

    let mut board = NInARowBoard::new(GameConfig::default());
    for &(r, c) in moves {
        board.apply_move(Position::new(r, c)).unwrap();
    }
    board
}

#[test]
fn test_uct_search_returns_legal_move() {
    use crate::config::GameConfig;

    let boards = vec![
        board_after(&[]),
        board_after(&[(1, 1)]),
        board_after(&[(0, 0), (1, 1), (2, 2), (0, 2)]),
        // only one cell left
        board_after(&[(0, 0), (0, 1), (0, 2), (1, 1), (1, 0), (1, 2), (2, 1), (2, 0)]),
        NInARowBoard::new(GameConfig::new(4, 6, 4)),
    ];
    for board in boards {
        for seed in 0..5 {
            let before = board.clone();
            let mut rng = ChaCha20Rng::seed_from_u64(seed);
            let move_ = uct_search(&board, &SearchConfig::with_iterations(200), &mut rng);
            assert!(board.is_valid_move(move_), "{} on {:?}", move_, board);
            assert_eq!(board, before);
        }
    }
}

#[test]
fn test_uct_search_is_reproducible_with_a_seed() {
    let board = board_after(&[(0, 0)]);
    let config = SearchConfig::with_iterations(300);
    let first = search_with_stats(&board, &config, &mut ChaCha20Rng::seed_from_u64(7));
    let second = search_with_stats(&board, &config, &mut ChaCha20Rng::seed_from_u64(7));
    assert_eq!(first.best_move, second.best_move);
    assert_eq!(first.children, second.children);
}

#[test]
fn test_every_iteration_visits_one_root_child() {
    let board = board_after(&[(1, 1)]);
    let mut rng = ChaCha20Rng::seed_from_u64(3);
    let mut tree = SearchTree::new(&board, &mut rng);
    for _ in 0..250 {
        tree.run_iteration(&board, SearchConfig::default().exploration_constant, &mut rng);
    }
    let root = tree.get(tree.root());
    assert_eq!(root.visits(), 250);
    assert_eq!(root.player(), Some(board_game::Player::P1));
    let child_visits: u32 = tree.children(tree.root()).map(|c| c.visits()).sum();
    assert_eq!(child_visits, 250);
    // every legal move was tried once the budget exceeded the number of moves
    assert_eq!(tree.children(tree.root()).count(), 8);
    for child in tree.children(tree.root()) {
        assert_eq!(child.player(), Some(board_game::Player::P2));
        assert!(child.value().abs() <= child.visits() as f64);
    }
}

#[test]
fn test_terminal_children_have_no_untried_moves() {
    // P1 to move and (0, 2) wins on the spot
    let board = board_after(&[(0, 0), (1, 0), (0, 1), (1, 1)]);
    let mut rng = ChaCha20Rng::seed_from_u64(11);
    let mut tree = SearchTree::new(&board, &mut rng);
    for _ in 0..100 {
        tree.run_iteration(&board, SearchConfig::default().exploration_constant, &mut rng);
    }
    let winning = tree
        .children(tree.root())
        .find(|c| c.move_() == Some(Position::new(0, 2)))
        .unwrap();
    assert!(winning.untried_moves.is_empty());
    assert!(winning.children.is_empty());
    // every playout through a won node is a win for the player that reached it
    assert_eq!(winning.value(), winning.visits() as f64);
}

#[test]
fn test_uct_search_finds_winning_move() {
    // P1 has two on the top row, P2 threatens the middle row
    let board = board_after(&[(0, 0), (1, 0), (0, 1), (1, 1)]);
    let config = SearchConfig::with_iterations(500);
    let wins = (0..10)
        .filter(|&seed| {
            let mut rng = ChaCha20Rng::seed_from_u64(seed);
            uct_search(&board, &config, &mut rng) == Position::new(0, 2)
        })
        .count();
    assert!(wins >= 9, "found the winning move in only {} of 10 runs", wins);
}

#[test]
fn test_uct_search_blocks_a_threat() {
    // P1 threatens (0, 2) and P2 has to block
    let board = board_after(&[(0, 0), (2, 2), (0, 1)]);
    let config = SearchConfig::with_iterations(2000);
    let blocks = (0..10)
        .filter(|&seed| {
            let mut rng = ChaCha20Rng::seed_from_u64(seed);
            uct_search(&board, &config, &mut rng) == Position::new(0, 2)
        })
        .count();
    assert!(blocks >= 8, "blocked in only {} of 10 runs", blocks);
}

#[test]
fn test_parallel_search_splits_the_budget() {
    let board = board_after(&[(1, 1)]);
    let config = SearchConfig {
        iterations: 301,
        threads: 4,
        ..SearchConfig::default()
    };
    let mut rng = ChaCha20Rng::seed_from_u64(5);
    let report = search_with_stats(&board, &config, &mut rng);
    assert_eq!(report.total_playouts, 301);
    assert!(board.is_valid_move(report.best_move));
    assert_eq!(report.children.len(), 8);
    let most_visits = report.children.iter().map(|c| c.visits).max().unwrap();
    let best = report
        .children
        .iter()
        .find(|c| c.move_ == report.best_move)
        .unwrap();
    assert_eq!(best.visits, most_visits);
}

#[test]
#[should_panic]
fn test_uct_search_on_finished_game_panics() {
    let board = board_after(&[(0, 0), (1, 0), (0, 1), (1, 1), (0, 2)]);
    let mut rng = ChaCha20Rng::seed_from_u64(0);
    uct_search(&board, &SearchConfig::default(), &mut rng);
}

#[test]
#[should_panic]
fn test_uct_search_without_iterations_panics() {
    let board = board_after(&[]);
    let mut rng = ChaCha20Rng::seed_from_u64(0);
    uct_search(&board, &SearchConfig::with_iterations(0), &mut rng);
}

#[test]
fn test_mcts_agent_takes_the_win() {
    let board = board_after(&[(0, 0), (1, 0), (0, 1), (1, 1)]);
    let mut agent = MCTSAgent::new(SearchConfig::with_iterations(1000), 42);
    assert_eq!(agent.choose_move(&board).unwrap(), Position::new(0, 2));
}
