//! The rules engine's view of one participant of a match.

use std::fmt::Display;
use std::fs::File;
use std::io::Write;
use std::os::fd::BorrowedFd;

use tracing::warn;

use crate::stream::PlayerStream;

/// One participant of a match, as seen by a [`RulesEngine`](crate::rules_engine::RulesEngine).
///
/// Bundles the stream connected to the player's stdin/stdout with the player's name, its
/// position in the match, and the file that collects its stderr.
#[derive(Debug)]
pub struct Player<'m> {
    program_name: String,
    index: usize,
    stream: PlayerStream<'m>,
    error_log: File,
}

impl<'m> Player<'m> {
    /// * `read_fd` - connected to the program's stdout.
    /// * `write_fd` - connected to the program's stdin.
    /// * `error_log` - the file the program's stderr goes to. The referee can write there too.
    /// * `program_name` - does not need to be unique.
    /// * `index` - 0-based position of the player in the match.
    pub fn new(
        read_fd: BorrowedFd<'m>,
        write_fd: BorrowedFd<'m>,
        error_log: File,
        program_name: String,
        index: usize,
    ) -> Player<'m> {
        Player {
            program_name,
            index,
            stream: PlayerStream::duplex(read_fd, write_fd),
            error_log,
        }
    }

    /// The program path as given to the referee.
    pub fn program_name(&self) -> &str {
        &self.program_name
    }

    /// Position of the player in the slice given to the rules engine.
    pub fn index(&self) -> usize {
        self.index
    }

    /// The stream connected to the program's stdout and stdin.
    pub fn stream(&mut self) -> &mut PlayerStream<'m> {
        &mut self.stream
    }

    /// The file collecting the program's stderr.
    pub fn error_log(&mut self) -> &mut File {
        &mut self.error_log
    }

    /// Append a referee note to the player's error log.
    pub fn log(&mut self, message: impl Display) {
        if let Err(e) = writeln!(self.error_log, "[referee] {message}") {
            warn!(player = self.index, "could not write to error log: {e}");
        }
    }
}
