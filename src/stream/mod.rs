//! Buffered, timed byte streams over a player's pipes.
//!
//! A [`PlayerStream`] wraps the referee's ends of the two pipes connected to a player
//! (the player's stdout and stdin). Reads are buffered and can be bounded by a timeout;
//! writes are buffered and flushed when the buffer fills or on demand.
//!
//! # Timeouts
//!
//! [`PlayerStream::set_timeout`] gives a budget that only the *waiting* consumes: bytes that
//! are already buffered are returned immediately. The budget persists across reads until it
//! is changed, cleared, or used up. Once used up, every read reports
//! [`StreamError::TimedOut`] and returns end-of-stream until the timeout is set again.
//!
//! # Error modes
//!
//! Exactly one [`ErrorMode`] is active at a time:
//! - [`ErrorMode::Silent`]: errors only update [`PlayerStream::last_error`]; reads return
//!   end-of-stream.
//! - [`ErrorMode::Callback`]: the callback is invoked with the stream and the error, then
//!   reads return end-of-stream.
//! - [`ErrorMode::Raise`]: read errors are returned as `Err(StreamError)`.
//!
//! Write failures never go through `Raise`: they are returned as a status by
//! [`write_bytes`](PlayerStream::write_bytes) / [`flush_buffer`](PlayerStream::flush_buffer)
//! and leave the output degraded (see [`PlayerStream::output_failed`]) until a flush succeeds.
//!
//! A player closing its output is a normal end-of-stream and is never reported as an error.
//!
//! The stream borrows its descriptors and never closes them.

mod error;
mod sys;

use std::fmt;
use std::io::{self, BufRead, Read, Write};
use std::mem;
use std::os::fd::BorrowedFd;
use std::time::{Duration, Instant};

use nix::errno::Errno;
use tracing::{debug, trace};

pub use error::StreamError;
pub use sys::ignore_sigpipe;

/// Size of the read buffer and of the write buffer.
pub const BUF_SIZE: usize = 1024;

/// Callback invoked on stream errors when [`ErrorMode::Callback`] is active.
pub type ErrorCallback = Box<dyn FnMut(&PlayerStream<'_>, &StreamError) + Send>;

/// How a [`PlayerStream`] reports errors. See the [module documentation](self).
#[derive(Default)]
pub enum ErrorMode {
    /// Only record the error.
    #[default]
    Silent,
    /// Record the error and call the function.
    Callback(ErrorCallback),
    /// Record the error and return it from read operations.
    Raise,
}

impl fmt::Debug for ErrorMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorMode::Silent => f.write_str("Silent"),
            ErrorMode::Callback(_) => f.write_str("Callback(..)"),
            ErrorMode::Raise => f.write_str("Raise"),
        }
    }
}

struct Input<'fd> {
    fd: BorrowedFd<'fd>,
    buf: Box<[u8]>,
    pos: usize,
    len: usize,
}

impl Input<'_> {
    fn buffered(&self) -> &[u8] {
        &self.buf[self.pos..self.len]
    }

    /// Wait for the descriptor within `timeout`, then fill the buffer with one `read`.
    fn fetch(&mut self, timeout: &mut Option<Duration>) -> Result<(), StreamError> {
        wait_readable(self.fd, timeout)?;
        let n = sys::read(self.fd, &mut self.buf).map_err(|errno| StreamError::Os {
            op: "read",
            errno,
        })?;
        trace!(bytes = n, "read from player");
        self.pos = 0;
        self.len = n;
        Ok(())
    }
}

fn wait_readable(fd: BorrowedFd<'_>, timeout: &mut Option<Duration>) -> Result<(), StreamError> {
    loop {
        if *timeout == Some(Duration::ZERO) {
            return Err(StreamError::TimedOut);
        }
        let started = Instant::now();
        let ready = sys::poll_readable(fd, *timeout);
        if let Some(remaining) = timeout.as_mut() {
            *remaining = remaining.saturating_sub(started.elapsed());
        }
        match ready {
            Ok(true) => return Ok(()),
            Ok(false) => {
                // poll may wake up marginally early by our clock; the budget is spent anyway
                *timeout = Some(Duration::ZERO);
                return Err(StreamError::TimedOut);
            }
            Err(Errno::EINTR) => continue,
            Err(errno) => return Err(StreamError::Os { op: "poll", errno }),
        }
    }
}

struct Output<'fd> {
    fd: BorrowedFd<'fd>,
    buf: Vec<u8>,
    failed: bool,
}

impl Output<'_> {
    /// Write the whole buffer, keeping whatever could not be sent.
    fn drain(&mut self) -> Result<(), StreamError> {
        let mut sent = 0;
        let result = loop {
            if sent == self.buf.len() {
                break Ok(());
            }
            match sys::write(self.fd, &self.buf[sent..]) {
                Ok(0) => {
                    break Err(StreamError::Os {
                        op: "write",
                        errno: Errno::EIO,
                    })
                }
                Ok(n) => sent += n,
                Err(errno) => break Err(StreamError::Os { op: "write", errno }),
            }
        };
        trace!(bytes = sent, "wrote to player");
        self.buf.drain(..sent);
        self.failed = result.is_err();
        result
    }
}

/// A buffered duplex byte stream over borrowed pipe descriptors, with read timeouts.
///
/// Implements [`Read`], [`BufRead`] and [`Write`], so line-oriented helpers such as
/// [`BufRead::read_line`] and [`writeln!`] work directly on it.
pub struct PlayerStream<'fd> {
    input: Option<Input<'fd>>,
    output: Option<Output<'fd>>,
    timeout: Option<Duration>,
    error_mode: ErrorMode,
    last_error: Option<StreamError>,
}

impl<'fd> PlayerStream<'fd> {
    /// Create a stream reading from `input` and writing to `output`.
    ///
    /// A missing side gets no buffer; operations on it fail with
    /// [`StreamError::MissingEndpoint`]. No timeout is set and errors are silent.
    pub fn new(input: Option<BorrowedFd<'fd>>, output: Option<BorrowedFd<'fd>>) -> Self {
        PlayerStream {
            input: input.map(|fd| Input {
                fd,
                buf: vec![0; BUF_SIZE].into_boxed_slice(),
                pos: 0,
                len: 0,
            }),
            output: output.map(|fd| Output {
                fd,
                buf: Vec::with_capacity(BUF_SIZE),
                failed: false,
            }),
            timeout: None,
            error_mode: ErrorMode::Silent,
            last_error: None,
        }
    }

    /// A stream with both sides.
    pub fn duplex(input: BorrowedFd<'fd>, output: BorrowedFd<'fd>) -> Self {
        Self::new(Some(input), Some(output))
    }

    /// A read-only stream.
    pub fn input_only(input: BorrowedFd<'fd>) -> Self {
        Self::new(Some(input), None)
    }

    /// A write-only stream.
    pub fn output_only(output: BorrowedFd<'fd>) -> Self {
        Self::new(None, Some(output))
    }

    /// Set (`Some`) or clear (`None`) the read timeout.
    ///
    /// Setting a timeout also resets a budget that was used up. `Some(Duration::ZERO)` behaves
    /// like an already elapsed timeout: only buffered bytes can still be read.
    pub fn set_timeout(&mut self, timeout: Option<Duration>) {
        self.timeout = timeout;
    }

    /// What is left of the read timeout.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Replace the active error mode, detaching the previous one.
    pub fn set_error_mode(&mut self, mode: ErrorMode) {
        self.error_mode = mode;
    }

    /// Report errors only through [`last_error`](Self::last_error).
    pub fn on_error_no_op(&mut self) {
        self.set_error_mode(ErrorMode::Silent);
    }

    /// Call `callback` on every error.
    pub fn on_error_call<F>(&mut self, callback: F)
    where
        F: FnMut(&PlayerStream<'_>, &StreamError) + Send + 'static,
    {
        self.set_error_mode(ErrorMode::Callback(Box::new(callback)));
    }

    /// Return read errors as `Err`.
    pub fn on_error_raise(&mut self) {
        self.set_error_mode(ErrorMode::Raise);
    }

    /// The active error mode.
    pub fn error_mode(&self) -> &ErrorMode {
        &self.error_mode
    }

    /// The OS error number of the most recent error, 0 if there was none.
    ///
    /// A plain end-of-stream leaves this untouched.
    pub fn last_error(&self) -> i32 {
        self.last_error.map_or(0, |e| e.code())
    }

    /// `"EOF"`, followed by the description of the last error if there was one.
    pub fn last_strerror(&self) -> String {
        match &self.last_error {
            None => "EOF".to_owned(),
            Some(err) => format!("EOF: {err}"),
        }
    }

    /// True after a failed write or flush, until a flush succeeds.
    pub fn output_failed(&self) -> bool {
        self.output.as_ref().is_some_and(|o| o.failed)
    }

    /// Read one byte. `Ok(None)` is the end of the stream.
    pub fn read_byte(&mut self) -> Result<Option<u8>, StreamError> {
        self.refill()?;
        let byte = self.buffered().first().copied();
        if byte.is_some() {
            self.consume(1);
        }
        Ok(byte)
    }

    /// Buffer `bytes`, sending the buffer to the player each time it fills up.
    ///
    /// On failure the unsent bytes are kept, the output is marked as failed, and the error is
    /// recorded and passed to the callback if one is set. Later writes first retry the
    /// pending bytes and keep failing until that succeeds.
    pub fn write_bytes(&mut self, mut bytes: &[u8]) -> Result<(), StreamError> {
        if self.output_failed() {
            self.flush_buffer()?;
        }
        while !bytes.is_empty() {
            let Some(output) = self.output.as_mut() else {
                return self.fail_write(StreamError::MissingEndpoint("output"));
            };
            if output.buf.len() >= BUF_SIZE {
                self.flush_buffer()?;
                continue;
            }
            let take = (BUF_SIZE - output.buf.len()).min(bytes.len());
            output.buf.extend_from_slice(&bytes[..take]);
            bytes = &bytes[take..];
        }
        Ok(())
    }

    /// Send every buffered byte to the player now.
    pub fn flush_buffer(&mut self) -> Result<(), StreamError> {
        let result = match self.output.as_mut() {
            Some(output) => output.drain(),
            None => Err(StreamError::MissingEndpoint("output")),
        };
        match result {
            Ok(()) => Ok(()),
            Err(err) => self.fail_write(err),
        }
    }

    fn buffered(&self) -> &[u8] {
        self.input.as_ref().map_or(&[][..], Input::buffered)
    }

    /// Make sure some input is buffered, unless the stream ended or failed.
    fn refill(&mut self) -> Result<(), StreamError> {
        let fetched = match self.input.as_mut() {
            Some(input) if !input.buffered().is_empty() => return Ok(()),
            Some(input) => input.fetch(&mut self.timeout),
            None => Err(StreamError::MissingEndpoint("input")),
        };
        match fetched {
            Ok(()) => Ok(()),
            Err(err) => self.fail_read(err),
        }
    }

    fn fail_read(&mut self, err: StreamError) -> Result<(), StreamError> {
        self.record(err);
        match self.error_mode {
            ErrorMode::Silent => Ok(()),
            ErrorMode::Callback(_) => {
                self.invoke_callback(&err);
                Ok(())
            }
            ErrorMode::Raise => Err(err),
        }
    }

    fn fail_write(&mut self, err: StreamError) -> Result<(), StreamError> {
        self.record(err);
        if let ErrorMode::Callback(_) = self.error_mode {
            self.invoke_callback(&err);
        }
        Err(err)
    }

    fn record(&mut self, err: StreamError) {
        debug!(error = %err, mode = ?self.error_mode, "player stream error");
        self.last_error = Some(err);
    }

    fn invoke_callback(&mut self, err: &StreamError) {
        let mut mode = mem::take(&mut self.error_mode);
        if let ErrorMode::Callback(callback) = &mut mode {
            callback(self, err);
        }
        self.error_mode = mode;
    }
}

impl fmt::Debug for PlayerStream<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlayerStream")
            .field("input", &self.input.as_ref().map(|i| i.fd))
            .field("output", &self.output.as_ref().map(|o| o.fd))
            .field("buffered", &self.buffered().len())
            .field("timeout", &self.timeout)
            .field("error_mode", &self.error_mode)
            .field("last_error", &self.last_error)
            .finish()
    }
}

impl Read for PlayerStream<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        // nothing asked, nothing waited for
        if buf.is_empty() {
            return Ok(0);
        }
        let available = self.fill_buf()?;
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.consume(n);
        Ok(n)
    }
}

impl BufRead for PlayerStream<'_> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        self.refill()?;
        Ok(self.buffered())
    }

    fn consume(&mut self, amt: usize) {
        if let Some(input) = self.input.as_mut() {
            input.pos = (input.pos + amt).min(input.len);
        }
    }
}

impl Write for PlayerStream<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_bytes(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(self.flush_buffer()?)
    }
}
