//! Repeated matches between the same programs.
//!
//! [`Referee`] runs a series of matches with a [`RulesEngine`] and adds up the score vectors.
//! Behavior is controlled by a [`Configuration`]: number of matches, where player logs go,
//! whether results are printed, and the seed of the generator giving each player its seed.
//!
//! # Example
//!
//! ```no_run
//! use ai_referee::prelude::*;
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = Configuration::new().with_repetitions(5).with_logs_dir("logs");
//!     let mut referee = Referee::new(RockPaperScissors::default(), config)?;
//!     let scores = referee.run_series(&["./bot_a", "./bot_b"])?;
//!     println!("{:?}", scores.totals());
//!     Ok(())
//! }
//! ```

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::Context;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{info, instrument, trace};

use crate::configuration::Configuration;
use crate::logger::init_logger;
use crate::match_result::MatchResult;
use crate::match_runner::{run_match, MatchSettings};
use crate::rules_engine::RulesEngine;

/// Runs matches between programs and aggregates their scores.
pub struct Referee<E: RulesEngine> {
    engine: E,
    config: Configuration,
    rng: StdRng,
}

impl<E: RulesEngine> Referee<E> {
    /// Create a [`Referee`] playing with `engine`.
    ///
    /// # Errors
    /// When file logging is enabled and the log subscriber cannot be installed.
    #[instrument(skip_all)]
    pub fn new(engine: E, config: Configuration) -> anyhow::Result<Referee<E>> {
        if config.log {
            init_logger()?;
        }
        trace!(?config);

        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Ok(Referee {
            engine,
            config,
            rng,
        })
    }

    /// Play a single match, logging into `<logs_dir>/<match_id>/`.
    pub fn run_match(
        &mut self,
        programs: &[impl AsRef<Path>],
        match_id: usize,
    ) -> anyhow::Result<MatchResult> {
        let programs: Vec<PathBuf> = programs.iter().map(|p| p.as_ref().to_path_buf()).collect();
        let seeds = programs.iter().map(|_| self.rng.random()).collect();
        let settings = MatchSettings {
            programs,
            match_id,
            logs_dir: self.config.logs_dir.clone(),
            seeds,
        };
        trace!(%settings, seeds = ?settings.seeds);
        run_match(&settings, &mut self.engine)
    }

    /// Play `repetitions` matches (ids `0..repetitions`) and sum the score vectors.
    ///
    /// # Errors
    /// When the logs directory cannot be reset or a match cannot be set up.
    pub fn run_series(&mut self, programs: &[impl AsRef<Path>]) -> anyhow::Result<SeriesScores> {
        if self.config.clean_logs {
            remove_logs_dir(&self.config.logs_dir)?;
        }

        let mut scores = SeriesScores::new(programs);
        for match_id in 0..self.config.repetitions {
            let result = self.run_match(programs, match_id)?;
            if self.config.verbose {
                println!("{}", result.description());
            }
            scores.add(&result);
        }
        info!(totals = ?scores.totals(), "series finished");

        if self.config.verbose {
            print!("{scores}");
        }
        Ok(scores)
    }

    /// The rules engine, e.g. to inspect state it kept between matches.
    pub fn engine(&mut self) -> &mut E {
        &mut self.engine
    }
}

fn remove_logs_dir(dir: &Path) -> anyhow::Result<()> {
    match fs::remove_dir_all(dir) {
        Ok(()) => {
            info!("removed old logs in {}", dir.display());
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => {
            Err(e).with_context(|| format!("could not remove logs directory '{}'", dir.display()))
        }
    }
}

/// Element-wise sum of the score vectors of a series.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesScores {
    programs: Vec<String>,
    totals: Vec<f64>,
    matches: usize,
}

impl SeriesScores {
    /// Zero totals for `programs`.
    pub fn new(programs: &[impl AsRef<Path>]) -> Self {
        SeriesScores {
            programs: programs
                .iter()
                .map(|p| p.as_ref().display().to_string())
                .collect(),
            totals: vec![0.0; programs.len()],
            matches: 0,
        }
    }

    /// Add one match. Extra scores beyond the number of programs are ignored.
    pub fn add(&mut self, result: &MatchResult) {
        for (total, score) in self.totals.iter_mut().zip(result.scores()) {
            *total += score;
        }
        self.matches += 1;
    }

    /// Sum of the scores of each program, in program order.
    pub fn totals(&self) -> &[f64] {
        &self.totals
    }

    /// Number of matches added.
    pub fn matches(&self) -> usize {
        self.matches
    }
}

impl fmt::Display for SeriesScores {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Final scores:")?;
        for (i, (program, total)) in self.programs.iter().zip(&self.totals).enumerate() {
            writeln!(f, "Bot #{i}({program}) has total score {total}")?;
        }
        Ok(())
    }
}
