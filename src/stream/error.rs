use std::io;

use nix::errno::Errno;
use thiserror::Error;

/// An error observed by a [`PlayerStream`](super::PlayerStream).
///
/// Ordinary end-of-stream (the player closed its output) is never an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StreamError {
    /// The read timeout elapsed while waiting for the player to produce data.
    #[error("{}: no data from player before the read timeout", Errno::ETIME)]
    TimedOut,
    /// A system call on one of the stream's endpoints failed.
    #[error("{op} failed: {errno}")]
    Os {
        /// The failing operation (`poll`, `read`, `write`).
        op: &'static str,
        /// The OS error number.
        errno: Errno,
    },
    /// The stream was built without the endpoint this operation needs.
    #[error("{}: stream has no {0} endpoint", Errno::EBADF)]
    MissingEndpoint(&'static str),
}

impl StreamError {
    /// The OS error number carried by this error (`ETIME` for timeouts).
    pub fn code(&self) -> i32 {
        self.errno() as i32
    }

    /// Same as [`code`](Self::code) as a typed [`Errno`].
    pub fn errno(&self) -> Errno {
        match self {
            StreamError::TimedOut => Errno::ETIME,
            StreamError::Os { errno, .. } => *errno,
            StreamError::MissingEndpoint(_) => Errno::EBADF,
        }
    }
}

impl From<StreamError> for io::Error {
    fn from(err: StreamError) -> Self {
        let kind = match err {
            StreamError::TimedOut => io::ErrorKind::TimedOut,
            other => io::Error::from_raw_os_error(other.code()).kind(),
        };
        io::Error::new(kind, err)
    }
}
