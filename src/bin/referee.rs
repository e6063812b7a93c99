//! Plays a series of rock-paper-scissors matches between two programs.
//!
//! Defaults come from the `REFEREE_*` environment variables, command line options override them.

use std::path::PathBuf;
use std::time::Duration;

use ai_referee::prelude::*;
use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "referee", version, about = "Pit two programs against each other")]
struct Cli {
    /// First player executable
    program1: PathBuf,

    /// Second player executable
    program2: PathBuf,

    /// Number of matches to play
    #[arg(short, long)]
    repetitions: Option<usize>,

    /// Directory receiving the players' stderr, one sub-directory per match
    #[arg(long)]
    logs_dir: Option<PathBuf>,

    /// Seed of the generator drawing the players' seeds
    #[arg(long)]
    seed: Option<u64>,

    /// Time a player has to answer, in milliseconds
    #[arg(long, default_value_t = 1000)]
    move_timeout_ms: u64,

    /// Rounds per match
    #[arg(long, default_value_t = 1)]
    rounds: usize,

    /// Keep the logs of previous runs
    #[arg(long)]
    keep_logs: bool,

    /// Also write the referee's own log to a file in the current directory
    #[arg(long)]
    log: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = Configuration::from_env();
    if let Some(repetitions) = cli.repetitions {
        config = config.with_repetitions(repetitions);
    }
    if let Some(dir) = cli.logs_dir {
        config = config.with_logs_dir(dir);
    }
    if let Some(seed) = cli.seed {
        config = config.with_seed(seed);
    }
    if cli.keep_logs {
        config = config.with_clean_logs(false);
    }
    if cli.log {
        config = config.with_log(true);
    }

    let engine = RockPaperScissors::new(cli.rounds)
        .with_move_timeout(Duration::from_millis(cli.move_timeout_ms));
    let mut referee = Referee::new(engine, config)?;
    referee.run_series(&[cli.program1, cli.program2])?;
    Ok(())
}
