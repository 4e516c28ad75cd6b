//! Error types for the blocklog crate.

use std::fmt;
use std::io;

/// The result type used throughout blocklog.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type for log operations.
///
/// Note that most on-disk damage is *not* surfaced through this type: the
/// reader reports corrupted spans to its [`CorruptionReporter`] and keeps
/// going. `Error` is reserved for failures that must stop the caller, such
/// as sink/source I/O errors or misuse of the writer API.
///
/// [`CorruptionReporter`]: crate::reader::CorruptionReporter
#[derive(Debug)]
pub enum Error {
    /// An I/O error occurred.
    Io(io::Error),

    /// The file is not a recognizable log, or its header is damaged.
    Corruption(String),

    /// An invalid argument was provided.
    InvalidArgument(String),

    /// An operation was called in the wrong order (e.g. `add_record`
    /// before `init`).
    InvalidState(String),
}

impl Error {
    /// Creates a new corruption error.
    pub fn corruption(msg: impl Into<String>) -> Self {
        Error::Corruption(msg.into())
    }

    /// Creates a new invalid argument error.
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }

    /// Creates a new invalid state error.
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Error::InvalidState(msg.into())
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "IO error: {}", e),
            Error::Corruption(msg) => write!(f, "Data corruption: {}", msg),
            Error::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
            Error::InvalidState(msg) => write!(f, "Invalid state: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}
