//! Play N-in-a-row in the terminal, against the UCT agent or anything else in `agents`.
use std::io;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::info;

use n_in_a_row::agents::{
    AgentError, BoardGameAgent, HumanAgent, MCTSAgent, RandomAgent, TabularAgent, ValueTable,
};
use n_in_a_row::config::{DEFAULT_EXPLORATION_CONSTANT, DEFAULT_ITERATIONS};
use n_in_a_row::{game, GameConfig, Player, SearchConfig};

#[derive(Parser)]
#[command(name = "n-in-a-row")]
#[command(version, about = "N-in-a-row against a Monte Carlo tree search AI", long_about = None)]
struct Cli {
    /// Log filter, overridden by RUST_LOG
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Play one game, printing the board after every move
    Play(PlayArgs),

    /// Train two tabular agents against each other
    Train(TrainArgs),
}

#[derive(Args, Clone, Copy, Debug)]
struct BoardArgs {
    #[arg(long, default_value_t = 3)]
    rows: usize,

    #[arg(long, default_value_t = 3)]
    cols: usize,

    /// Pieces in a row needed to win
    #[arg(long, default_value_t = 3)]
    win_length: usize,
}

impl BoardArgs {
    fn config(&self) -> Result<GameConfig> {
        let config = GameConfig::new(self.rows, self.cols, self.win_length);
        config.validate()?;
        Ok(config)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum AgentKind {
    Human,
    Mcts,
    Random,
    Tabular,
}

#[derive(Args, Debug)]
struct PlayArgs {
    #[command(flatten)]
    board: BoardArgs,

    /// Who moves first
    #[arg(long, value_enum, default_value_t = AgentKind::Human)]
    p1: AgentKind,

    #[arg(long, value_enum, default_value_t = AgentKind::Mcts)]
    p2: AgentKind,

    /// UCT iterations per move
    #[arg(long, default_value_t = DEFAULT_ITERATIONS)]
    iterations: usize,

    /// UCB1 exploration constant
    #[arg(long, default_value_t = DEFAULT_EXPLORATION_CONSTANT)]
    exploration: f64,

    /// Search threads, defaults to every core
    #[arg(long)]
    threads: Option<usize>,

    /// Seed for the AI agents, random if not given
    #[arg(long)]
    seed: Option<u64>,

    /// Policy file for a tabular P1
    #[arg(long)]
    p1_policy: Option<PathBuf>,

    /// Policy file for a tabular P2
    #[arg(long)]
    p2_policy: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct TrainArgs {
    #[command(flatten)]
    board: BoardArgs,

    #[arg(long, default_value_t = 5000)]
    episodes: usize,

    #[arg(long, default_value_t = 0.1)]
    learn_rate: f64,

    #[arg(long, default_value_t = 0.1)]
    explore_rate: f64,

    /// Games played after training with exploration and learning switched off
    #[arg(long, default_value_t = 1000)]
    eval_episodes: usize,

    #[arg(long)]
    seed: Option<u64>,

    /// Where to save P1's policy
    #[arg(long)]
    save_p1: Option<PathBuf>,

    /// Where to save P2's policy
    #[arg(long)]
    save_p2: Option<PathBuf>,
}

fn init_tracing(level: &str) -> Result<()> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // stdout belongs to the board and the prompts
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .try_init()
        .context("failed to initialise logging")?;

    Ok(())
}

fn build_agent(
    kind: AgentKind,
    player: Player,
    policy: Option<&PathBuf>,
    args: &PlayArgs,
    config: GameConfig,
    seed: u64,
) -> Result<Box<dyn BoardGameAgent>> {
    let agent: Box<dyn BoardGameAgent> = match kind {
        AgentKind::Human => Box::new(HumanAgent::stdio()),
        AgentKind::Random => Box::new(RandomAgent::new(seed)),
        AgentKind::Mcts => {
            let search = SearchConfig {
                iterations: args.iterations,
                exploration_constant: args.exploration,
                threads: args.threads.unwrap_or(1),
            };
            search.validate()?;
            match args.threads {
                Some(_) => Box::new(MCTSAgent::new(search, seed)),
                None => Box::new(MCTSAgent::with_all_cores(search, seed)),
            }
        }
        AgentKind::Tabular => {
            let table = match policy {
                Some(path) => ValueTable::load(path, config)?,
                None => ValueTable::new(config),
            };
            Box::new(TabularAgent::with_table(player, table, 0.1, 0., seed))
        }
    };
    Ok(agent)
}

fn play(args: PlayArgs) -> Result<()> {
    let config = args.board.config()?;
    let seed = args.seed.unwrap_or_else(rand::random);
    info!(seed, ?config, "starting game");

    let mut p1 = build_agent(
        args.p1,
        Player::P1,
        args.p1_policy.as_ref(),
        &args,
        config,
        seed,
    )?;
    let mut p2 = build_agent(
        args.p2,
        Player::P2,
        args.p2_policy.as_ref(),
        &args,
        config,
        seed.wrapping_add(1),
    )?;

    match game::play(p1.as_mut(), p2.as_mut(), config, true, false) {
        Ok(_) => Ok(()),
        Err(AgentError::Quit) => {
            println!("quit!");
            Ok(())
        }
        Err(err) => Err(err.into()),
    }
}

fn print_tally(phase: &str, tally: &game::Tally) {
    println!(
        "{:<5} {:>8} >> [P1/{}] VS [P2/{}] VS [draw/{}]",
        phase,
        tally.games(),
        tally.p1_wins,
        tally.p2_wins,
        tally.draws
    );
}

fn train(args: TrainArgs) -> Result<()> {
    let config = args.board.config()?;
    let seed = args.seed.unwrap_or_else(rand::random);
    let mut p1 = TabularAgent::new(Player::P1, config, args.learn_rate, args.explore_rate, seed);
    let mut p2 = TabularAgent::new(
        Player::P2,
        config,
        args.learn_rate,
        args.explore_rate,
        seed.wrapping_add(1),
    );

    let tally = game::train(&mut p1, &mut p2, config, args.episodes, true)?;
    print_tally("train", &tally);

    if args.eval_episodes > 0 {
        p1.set_explore_rate(0.);
        p2.set_explore_rate(0.);
        let tally = game::train(&mut p1, &mut p2, config, args.eval_episodes, false)?;
        print_tally("eval", &tally);
    }

    if let Some(path) = &args.save_p1 {
        p1.table()
            .save(path)
            .with_context(|| format!("saving P1 policy to {}", path.display()))?;
    }
    if let Some(path) = &args.save_p2 {
        p2.table()
            .save(path)
            .with_context(|| format!("saving P2 policy to {}", path.display()))?;
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level)?;

    match cli.command {
        Commands::Play(args) => play(args),
        Commands::Train(args) => train(args),
    }
}
