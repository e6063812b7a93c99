//! Runs one match: creates the pipes and log files, spawns one process per program, hands
//! the players to the rules engine and tears everything down.
//!
//! Teardown (kill every child, reap every child, close every descriptor) runs on every exit
//! path: normal return, setup error, rules engine error or panic.

use std::fmt::{self, Display};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::os::fd::{AsFd, OwnedFd};
use std::os::unix::fs::OpenOptionsExt;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};

use anyhow::{ensure, Context};
use nix::fcntl::OFlag;
use nix::unistd::pipe2;
use tracing::{debug, error, info, instrument, trace, warn};

use crate::match_result::MatchResult;
use crate::player::Player;
use crate::rules_engine::RulesEngine;
use crate::stream::ignore_sigpipe;

/// What to run for one match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchSettings {
    /// One program per player, in player order.
    pub programs: Vec<PathBuf>,
    /// Names the directory holding the players' error logs.
    pub match_id: usize,
    /// Root of all match directories.
    pub logs_dir: PathBuf,
    /// The only argument each program receives, one per program.
    pub seeds: Vec<u32>,
}

impl MatchSettings {
    /// Settings with randomly drawn seeds.
    pub fn new(programs: Vec<PathBuf>, match_id: usize, logs_dir: impl Into<PathBuf>) -> Self {
        let seeds = programs.iter().map(|_| rand::random()).collect();
        MatchSettings {
            programs,
            match_id,
            logs_dir: logs_dir.into(),
            seeds,
        }
    }

    /// Replace the seeds, one per program.
    pub fn with_seeds(self, seeds: Vec<u32>) -> Self {
        MatchSettings { seeds, ..self }
    }

    /// `<logs_dir>/<match_id>/`
    pub fn match_dir(&self) -> PathBuf {
        self.logs_dir.join(self.match_id.to_string())
    }

    /// `<logs_dir>/<match_id>/<index>.<program file name>.err`
    pub fn error_log_path(&self, index: usize) -> Option<PathBuf> {
        let program = self.programs.get(index)?;
        let file_name = program
            .file_name()
            .map(|name| name.to_string_lossy())
            .unwrap_or_else(|| program.to_string_lossy());
        Some(self.match_dir().join(format!("{index}.{file_name}.err")))
    }
}

impl Display for MatchSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let programs = self
            .programs
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(" vs ");
        write!(f, "match {}: {programs}", self.match_id)
    }
}

/// Play one match between `settings.programs` with `engine`.
///
/// A program that cannot be executed only hurts its own player: its stream is already closed
/// when the engine starts, and the reason is written to its error log.
///
/// # Errors
/// Returned when the match infrastructure itself cannot be set up (pipe, log file or process
/// creation failing). These are environment failures, not something a retry would fix.
/// Failures of the rules engine are not errors: they produce an
/// [`Outcome::Error`](crate::match_result::Outcome::Error) result.
#[instrument(skip_all, fields(match_id = settings.match_id))]
pub fn run_match<E: RulesEngine + ?Sized>(
    settings: &MatchSettings,
    engine: &mut E,
) -> anyhow::Result<MatchResult> {
    ensure!(
        settings.seeds.len() == settings.programs.len(),
        "{} seeds for {} programs",
        settings.seeds.len(),
        settings.programs.len()
    );
    ignore_sigpipe();

    let match_dir = settings.match_dir();
    fs::create_dir_all(&match_dir).with_context(|| {
        format!("could not create match directory '{}'", match_dir.display())
    })?;

    // declaration order is teardown order in reverse: processes die before descriptors close
    let mut slots = Vec::with_capacity(settings.programs.len());
    let mut processes = Processes::default();

    for (index, (program, &seed)) in settings.programs.iter().zip(&settings.seeds).enumerate() {
        let log_path = settings
            .error_log_path(index)
            .context("player without a program")?;
        let (slot, stdio) = PlayerSlot::open(index, program, &log_path)?;

        match spawn_player(program, seed, stdio) {
            Ok(child) => {
                debug!(player = index, pid = child.id(), program = %program.display(), "player started");
                processes.push(index, child);
            }
            Err(e) if is_exec_failure(&e) => {
                error!(player = index, program = %program.display(), "cannot execute player: {e}");
                slot.note(format_args!(
                    "cannot use/find the program binary '{}': {e}",
                    program.display()
                ));
            }
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("could not create process for player {index}"))
            }
        }
        slots.push(slot);
    }

    let mut players = slots
        .iter()
        .map(PlayerSlot::player)
        .collect::<anyhow::Result<Vec<_>>>()?;

    info!(players = players.len(), "starting rules engine");
    let result = play(engine, &mut players);
    info!(outcome = ?result.outcome(), "{}", result.description());

    drop(players);
    processes.terminate_all();
    Ok(result)
}

/// Run the engine, turning its errors and panics into error results.
fn play<E: RulesEngine + ?Sized>(engine: &mut E, players: &mut [Player<'_>]) -> MatchResult {
    let count = players.len();
    match panic::catch_unwind(AssertUnwindSafe(|| engine.play(players))) {
        Ok(Ok(result)) if result.scores().len() == count => result,
        Ok(Ok(result)) => {
            error!(
                scores = result.scores().len(),
                players = count,
                "rules engine returned a result for the wrong number of players"
            );
            MatchResult::error_for(
                count,
                &format!("{} scores for {count} players", result.scores().len()),
            )
        }
        Ok(Err(e)) => {
            error!("rules engine failed: {e:#}");
            MatchResult::error_for(count, &format!("{e:#}"))
        }
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_owned());
            error!("rules engine panicked: {message}");
            MatchResult::error_for(count, &format!("rules engine panicked: {message}"))
        }
    }
}

/// The referee's side of one player: its ends of both pipes and its error log.
struct PlayerSlot {
    index: usize,
    program: PathBuf,
    /// Read end of the pipe the player writes to.
    from_player: OwnedFd,
    /// Write end of the pipe the player reads from.
    to_player: OwnedFd,
    error_log: File,
}

/// The descriptors the child process gets as stdin, stdout and stderr.
struct ChildStdio {
    stdin: OwnedFd,
    stdout: OwnedFd,
    stderr: File,
}

impl PlayerSlot {
    fn open(index: usize, program: &Path, log_path: &Path) -> anyhow::Result<(Self, ChildStdio)> {
        // O_CLOEXEC: no other player inherits these
        let (from_player, player_stdout) =
            pipe2(OFlag::O_CLOEXEC).context("could not create pipe from player")?;
        let (player_stdin, to_player) =
            pipe2(OFlag::O_CLOEXEC).context("could not create pipe to player")?;

        info!(player = index, "creating error file {}", log_path.display());
        let error_log = OpenOptions::new()
            .create(true)
            .append(true)
            .mode(0o640)
            .open(log_path)
            .with_context(|| format!("could not open error file '{}'", log_path.display()))?;
        let stderr = error_log
            .try_clone()
            .context("could not duplicate error file")?;

        let slot = PlayerSlot {
            index,
            program: program.to_path_buf(),
            from_player,
            to_player,
            error_log,
        };
        let stdio = ChildStdio {
            stdin: player_stdin,
            stdout: player_stdout,
            stderr,
        };
        Ok((slot, stdio))
    }

    fn player(&self) -> anyhow::Result<Player<'_>> {
        let error_log = self
            .error_log
            .try_clone()
            .context("could not duplicate error file")?;
        Ok(Player::new(
            self.from_player.as_fd(),
            self.to_player.as_fd(),
            error_log,
            self.program.display().to_string(),
            self.index,
        ))
    }

    fn note(&self, message: fmt::Arguments<'_>) {
        if let Err(e) = writeln!(&self.error_log, "[referee] {message}") {
            warn!(player = self.index, "could not write to error file: {e}");
        }
    }
}

/// Start `program` with `seed` as its only argument.
///
/// The child ends of the pipes are consumed: once this returns, the referee only holds its
/// own ends, whether the program started or not.
fn spawn_player(program: &Path, seed: u32, stdio: ChildStdio) -> io::Result<Child> {
    trace!(program = %program.display(), seed, "spawning player");
    Command::new(program)
        .arg(seed.to_string())
        .stdin(Stdio::from(stdio.stdin))
        .stdout(Stdio::from(stdio.stdout))
        .stderr(Stdio::from(stdio.stderr))
        .spawn()
}

/// Whether a spawn error is about the program itself rather than the system.
fn is_exec_failure(err: &io::Error) -> bool {
    matches!(
        err.raw_os_error(),
        Some(
            libc::ENOENT
                | libc::EACCES
                | libc::EPERM
                | libc::ENOEXEC
                | libc::ENOTDIR
                | libc::ELOOP
                | libc::ENAMETOOLONG
                | libc::ETXTBSY
        )
    )
}

/// Running player processes. Killed and reaped on drop.
#[derive(Debug, Default)]
struct Processes {
    children: Vec<(usize, Child)>,
}

impl Processes {
    fn push(&mut self, index: usize, child: Child) {
        self.children.push((index, child));
    }

    /// Kill every child, then reap them all. Children that already exited are fine.
    fn terminate_all(&mut self) {
        for (index, child) in &mut self.children {
            if let Err(e) = child.kill() {
                debug!(player = *index, "could not kill player: {e}");
            }
        }
        for (index, mut child) in self.children.drain(..) {
            match child.wait() {
                Ok(status) => debug!(player = index, %status, "player reaped"),
                Err(e) => warn!(player = index, "could not reap player: {e}"),
            }
        }
    }
}

impl Drop for Processes {
    fn drop(&mut self) {
        self.terminate_all();
    }
}
