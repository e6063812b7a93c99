//! Config for the referee behaviors
//!
//! Configuration can be created programmatically using [`Configuration::new()`] or by reading
//! environment variables using [`Configuration::from_env()`].
//!
//! # Environment Variables
//!
//! All values are optional. Flags are enabled by the (case-insensitive) value `"true"`.
//!
//! - `REFEREE_VERBOSE` — Print match results to stdout (default: `true`)
//! - `REFEREE_LOG` — Enable logging to a file (default: `false`)
//! - `REFEREE_LOGS_DIR` — Root directory of per-match player logs (default: `logs`)
//! - `REFEREE_CLEAN_LOGS` — Remove the logs directory before a series (default: `true`)
//! - `REFEREE_REPETITIONS` — Number of matches in a series (default: `10`)
//! - `REFEREE_SEED` — Seed of the generator drawing player seeds (default: random)

use std::path::{Path, PathBuf};

/// Configuration for referee behaviors.
#[derive(Debug, Clone)]
pub struct Configuration {
    pub(crate) verbose: bool,
    pub(crate) log: bool,
    pub(crate) logs_dir: PathBuf,
    pub(crate) clean_logs: bool,
    pub(crate) repetitions: usize,
    pub(crate) seed: Option<u64>,
}

impl Configuration {
    /// Create a new configuration with default parameters.
    ///
    /// By default:
    /// - Each match result and the final scores are printed to stdout.
    /// - Logging to file is disabled.
    /// - Player logs go to `logs/`, which is emptied before each series.
    /// - A series is 10 matches.
    /// - Player seeds are drawn from a randomly seeded generator.
    pub fn new() -> Self {
        Self {
            verbose: true,
            log: false,
            logs_dir: PathBuf::from("logs"),
            clean_logs: true,
            repetitions: 10,
            seed: None,
        }
    }

    /// Create configuration from environment variables.
    ///
    /// See the [module documentation](self) for the recognized variables. Unset or
    /// unparsable values keep their default.
    pub fn from_env() -> Self {
        fn get_env_flag(var: &str, default: bool) -> bool {
            match std::env::var(var) {
                Ok(val) => val.eq_ignore_ascii_case("true"),
                Err(_) => default,
            }
        }

        fn parse<T: std::str::FromStr>(var: &str) -> Option<T> {
            std::env::var(var).ok()?.parse().ok()
        }

        let defaults = Self::new();
        Self {
            verbose: get_env_flag("REFEREE_VERBOSE", defaults.verbose),
            log: get_env_flag("REFEREE_LOG", defaults.log),
            logs_dir: parse("REFEREE_LOGS_DIR").unwrap_or(defaults.logs_dir),
            clean_logs: get_env_flag("REFEREE_CLEAN_LOGS", defaults.clean_logs),
            repetitions: parse("REFEREE_REPETITIONS").unwrap_or(defaults.repetitions),
            seed: parse("REFEREE_SEED").or(defaults.seed),
        }
    }

    /// Enable or disable printing to stdout.
    pub fn with_verbose(mut self, value: bool) -> Self {
        self.verbose = value;
        self
    }

    /// Enable or disable logging to file.
    pub fn with_log(mut self, value: bool) -> Self {
        self.log = value;
        self
    }

    /// Directory receiving one sub-directory of player logs per match.
    pub fn with_logs_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.logs_dir = dir.into();
        self
    }

    /// Enable or disable removing the logs directory before a series.
    pub fn with_clean_logs(mut self, value: bool) -> Self {
        self.clean_logs = value;
        self
    }

    /// Number of matches in a series.
    pub fn with_repetitions(mut self, count: usize) -> Self {
        self.repetitions = count;
        self
    }

    /// Make the seeds handed to players reproducible.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Root directory of per-match player logs.
    pub fn logs_dir(&self) -> &Path {
        &self.logs_dir
    }

    /// Number of matches in a series.
    pub fn repetitions(&self) -> usize {
        self.repetitions
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self::new()
    }
}
