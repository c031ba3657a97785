//! Library-wide error and result types.

use std::io;

use thiserror::Error;

/// Result alias used throughout ctrkit.
pub type Result<T> = std::result::Result<T, Error>;

/// All errors the library can produce.
///
/// Error messages are kept intentionally terse; callers that need richer
/// context should wrap `Error` in their own type. Use [`Error::kind`] to
/// branch on the broad failure class.
#[derive(Debug, Error)]
pub enum Error {
    /// A magic/signature field did not match the expected value.
    #[error("bad magic value")]
    BadMagic,
    /// A format type id or version is present but not supported.
    #[error("unsupported version: {0:#x}")]
    UnsupportedVersion(u32),
    /// Header geometry is inconsistent (message describes which part).
    #[error("structural error: {0}")]
    Structural(String),
    /// A data block did not match its stored hash.
    #[error("hash mismatch at level {level}, block {block}")]
    Integrity { level: usize, block: u64 },
    /// An offset or size lies outside the valid region.
    #[error("invalid offset or size")]
    InvalidRange,
    /// The stream was disposed and can no longer be used.
    #[error("stream has been disposed")]
    Disposed,
    /// The shared base stream is borrowed by another reader mid-call.
    #[error("base stream is already in use")]
    Busy,
    /// The operation is not available on a read-only stream.
    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),
    /// An underlying I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[source] io::Error),
}

/// Broad failure classes of [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed header or geometry, detected at construction.
    Structural,
    /// Verified data did not match its hash.
    Integrity,
    /// Use after dispose, contention on the base stream, or I/O failure.
    Resource,
    /// Write-style operation on a read-only stream.
    Unsupported,
    /// Caller supplied an out-of-range position.
    InvalidInput,
}

impl Error {
    pub(crate) fn structural(msg: impl Into<String>) -> Self {
        Error::Structural(msg.into())
    }

    /// The failure class this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::BadMagic | Error::UnsupportedVersion(_) | Error::Structural(_) => {
                ErrorKind::Structural
            }
            Error::Integrity { .. } => ErrorKind::Integrity,
            Error::Disposed | Error::Busy | Error::Io(_) => ErrorKind::Resource,
            Error::Unsupported(_) => ErrorKind::Unsupported,
            Error::InvalidRange => ErrorKind::InvalidInput,
        }
    }
}

impl From<io::Error> for Error {
    /// Recovers an [`Error`] that a stacked stream tunnelled through
    /// [`io::Error`]; anything else becomes [`Error::Io`].
    fn from(e: io::Error) -> Self {
        if !e.get_ref().is_some_and(|inner| inner.is::<Error>()) {
            return Error::Io(e);
        }
        match e.into_inner().map(|inner| inner.downcast::<Error>()) {
            Some(Ok(inner)) => *inner,
            Some(Err(other)) => Error::Io(io::Error::other(other)),
            None => Error::Io(io::Error::other("nested stream error")),
        }
    }
}

impl From<Error> for io::Error {
    fn from(e: Error) -> Self {
        let kind = match &e {
            Error::Io(inner) => inner.kind(),
            Error::Integrity { .. } | Error::BadMagic | Error::Structural(_) => {
                io::ErrorKind::InvalidData
            }
            Error::UnsupportedVersion(_) | Error::Unsupported(_) => io::ErrorKind::Unsupported,
            Error::InvalidRange => io::ErrorKind::InvalidInput,
            Error::Disposed | Error::Busy => io::ErrorKind::Other,
        };
        io::Error::new(kind, e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_error_survives_io_round_trip() {
        let tunnelled: io::Error = Error::Integrity { level: 2, block: 6 }.into();
        assert_eq!(tunnelled.kind(), io::ErrorKind::InvalidData);

        match Error::from(tunnelled) {
            Error::Integrity { level, block } => assert_eq!((level, block), (2, 6)),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn plain_io_error_is_resource() {
        let err = Error::from(io::Error::from(io::ErrorKind::UnexpectedEof));
        assert!(matches!(err, Error::Io(_)));
        assert_eq!(err.kind(), ErrorKind::Resource);
    }
}
