//! Error types for the direct-I/O block cache.

use std::fmt;
use std::io;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the cache, the I/O facade and the platform layer.
#[derive(Debug)]
pub enum Error {
    /// The underlying file could not be opened.
    OpenFailed(io::Error),
    /// A handle passed to close/read/write/seek/sync is not registered.
    InvalidHandle,
    /// seek would produce a negative offset, or whence/config is unrecognized.
    InvalidArgument(&'static str),
    /// An aligned buffer allocation failed.
    AllocationFailed,
    /// A positioned read, positioned write or sync against the underlying
    /// storage returned an error or an impermissible short count.
    IoFailure(io::Error),
    /// Clock swept its full budget without finding an evictable slot.
    EvictionExhausted,
    /// `advice` is not implemented.
    UnsupportedOperation,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::OpenFailed(e) => write!(f, "failed to open underlying file: {e}"),
            Error::InvalidHandle => write!(f, "handle is not registered with this cache"),
            Error::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
            Error::AllocationFailed => write!(f, "failed to allocate an aligned block buffer"),
            Error::IoFailure(e) => write!(f, "underlying storage I/O failed: {e}"),
            Error::EvictionExhausted => {
                write!(f, "clock swept the full slot pool without finding a victim")
            }
            Error::UnsupportedOperation => write!(f, "operation is not supported"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::OpenFailed(e) | Error::IoFailure(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::IoFailure(e)
    }
}
