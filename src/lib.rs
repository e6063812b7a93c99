//! # AI Referee
//!
//! A harness pitting programs against each other: each program runs as a child process whose
//! stdin/stdout are connected to the referee through pipes, and a pluggable rules engine
//! decides the outcome of the match.
//!
//! It provides:
//! - Timed, buffered byte streams over pipes ([`stream::PlayerStream`])
//! - Process orchestration for one match ([`match_runner::run_match`]): pipes, per-player
//!   error logs, spawn, and unconditional teardown
//! - The [`RulesEngine`](rules_engine::RulesEngine) trait, the only thing a game has to provide
//! - Match results with per-player scores ([`match_result::MatchResult`])
//! - Repeated matches with aggregated scores ([`referee::Referee`])
//!
//! Players are untrusted: they may be slow, silent, or crash. The rules engine is trusted.
//! Player processes are not sandboxed (no CPU or memory limits).
//!
//! # Documentation Overview
//!
//! - For timeouts and error reporting on player streams, see the [`stream`] module.
//! - For what happens around a single match, see [`match_runner`].
//! - For configuring series of matches, see [`Configuration`](configuration::Configuration).
//! - For implementing a game, see [`RulesEngine`](rules_engine::RulesEngine) and the
//!   ready-made [`RockPaperScissors`](games::RockPaperScissors).
//!
//! # Usage Example
//!
//! ```no_run
//! use std::io::BufRead;
//! use std::time::Duration;
//!
//! use ai_referee::prelude::*;
//!
//! /// The first player to say something wins.
//! fn first_word(players: &mut [Player<'_>]) -> anyhow::Result<MatchResult> {
//!     for player in players.iter_mut() {
//!         player.stream().set_timeout(Some(Duration::from_millis(500)));
//!     }
//!     for i in 0..players.len() {
//!         let mut line = String::new();
//!         if players[i].stream().read_line(&mut line)? > 0 {
//!             return Ok(MatchResult::win(players, &players[i], line.trim()));
//!         }
//!     }
//!     Ok(MatchResult::draw(players, "nobody talked"))
//! }
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = Configuration::new().with_repetitions(3);
//!     let mut referee = Referee::new(first_word, config)?;
//!     let scores = referee.run_series(&["./bot_a", "./bot_b"])?;
//!     assert_eq!(scores.matches(), 3);
//!     Ok(())
//! }
//! ```
//!
//! ## Player Requirements
//!
//! - A player is an executable started with one argument: a decimal random seed
//! - It reads from stdin and writes to stdout, as defined by the rules engine
//! - Whatever it writes to stderr lands in `<logs_dir>/<match_id>/<index>.<program>.err`
#![warn(missing_docs)]

pub use anyhow;
pub mod configuration;
pub mod games;
mod logger;
pub mod match_result;
pub mod match_runner;
pub mod player;
pub mod referee;
pub mod rules_engine;
pub mod stream;

/// Commonly used types and traits for quick access.
///
/// ```rust
/// use ai_referee::prelude::*;
/// ```
pub mod prelude {
    pub use crate::configuration::Configuration;
    pub use crate::games::RockPaperScissors;
    pub use crate::match_result::{MatchResult, Outcome};
    pub use crate::match_runner::{run_match, MatchSettings};
    pub use crate::player::Player;
    pub use crate::referee::{Referee, SeriesScores};
    pub use crate::rules_engine::RulesEngine;
    pub use crate::stream::{ErrorMode, PlayerStream, StreamError};
}
