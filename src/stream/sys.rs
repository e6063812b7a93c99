//! Raw descriptor operations behind [`PlayerStream`](super::PlayerStream).

use std::os::fd::{AsRawFd, BorrowedFd};
use std::sync::Once;
use std::time::Duration;

use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, Signal};
use nix::unistd;
use tracing::{debug, warn};

/// Block until `fd` is readable, or until `timeout` elapses.
///
/// Returns `Ok(false)` on timeout. `None` waits forever. A hung-up pipe counts as readable:
/// the following `read` reports the end of stream.
pub(crate) fn poll_readable(fd: BorrowedFd<'_>, timeout: Option<Duration>) -> Result<bool, Errno> {
    let timeout = match timeout {
        None => PollTimeout::NONE,
        Some(timeout) => {
            PollTimeout::try_from(timeout_millis(timeout)).map_err(|_| Errno::EINVAL)?
        }
    };
    let mut fds = [PollFd::new(fd, PollFlags::POLLIN)];
    let ready = poll(&mut fds, timeout)?;
    Ok(ready > 0)
}

/// Rounds up so that a wait never ends before the requested duration.
fn timeout_millis(timeout: Duration) -> i32 {
    let millis = timeout.as_micros().div_ceil(1000);
    millis.min(i32::MAX as u128) as i32
}

/// `read(2)` retried on `EINTR`. `Ok(0)` is the end of stream.
pub(crate) fn read(fd: BorrowedFd<'_>, buf: &mut [u8]) -> Result<usize, Errno> {
    loop {
        match unistd::read(fd.as_raw_fd(), buf) {
            Err(Errno::EINTR) => continue,
            result => return result,
        }
    }
}

/// `write(2)` retried on `EINTR`. May write fewer bytes than given.
pub(crate) fn write(fd: BorrowedFd<'_>, buf: &[u8]) -> Result<usize, Errno> {
    loop {
        match unistd::write(fd, buf) {
            Err(Errno::EINTR) => continue,
            result => return result,
        }
    }
}

static IGNORE_SIGPIPE: Once = Once::new();

/// Ignore `SIGPIPE` for the rest of the process lifetime.
///
/// Writing to a player that already exited then fails with `EPIPE` instead of killing the
/// referee. This is process-wide state and is never reverted. Calling it again is a no-op.
pub fn ignore_sigpipe() {
    IGNORE_SIGPIPE.call_once(|| {
        let action = SigAction::new(SigHandler::SigIgn, SaFlags::empty(), SigSet::empty());
        // SAFETY: SIG_IGN runs no handler code.
        match unsafe { signal::sigaction(Signal::SIGPIPE, &action) } {
            Ok(_) => debug!("SIGPIPE ignored"),
            Err(e) => warn!("could not ignore SIGPIPE: {e}"),
        }
    });
}
