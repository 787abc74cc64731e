//! System-wide error taxonomy
//!
//! This module defines the error kinds shared by the capability tables, the
//! DTU driver, and the VPE-level operations built on them. The numeric
//! discriminants double as the wire encoding: the DTU reports a command's
//! outcome through a status byte, and remote faults arrive as one of these
//! codes.

use core::fmt;

/// Errors returned by kernel-core operations.
///
/// All fallible operations return [`Result<T>`](Result) with this type.
/// Logic errors (destroying an entity with live handles, waking a VPE that
/// is not waiting) are kernel bugs and assert instead of returning a value
/// of this type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[must_use = "kernel errors must be handled"]
#[repr(u8)]
pub enum Error {
    /// The operation referenced a non-existent or wrongly-typed endpoint.
    InvalidEndpoint = 1,

    /// A malformed request: duplicate selector, bad exchange shape,
    /// out-of-range argument.
    InvalidArgument = 2,

    /// Selector (or record) lookup missed.
    NotFound = 3,

    /// A send was attempted against an endpoint whose credit budget is
    /// exhausted.
    ///
    /// Credits are replenished when the receiver's reply returns; callers
    /// queue the message and retry on the reply event.
    NoCredits = 4,

    /// The entity is not in the state the operation requires.
    ///
    /// Returned, for example, by `resume` when the VPE has no active
    /// application, or by `migrate` on a VPE that is not suspended.
    NotReady = 5,

    /// The remote core reported a fault through the status register.
    ///
    /// Also used for status codes this kernel does not recognise; the
    /// remote side may be newer than we are.
    PeerError = 6,

    /// The request is shaped in a way the handler does not implement.
    NotSupported = 7,

    /// The memory collaborator could not satisfy an allocation.
    NoSpace = 8,
}

impl Error {
    /// Get a short description of the error.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidEndpoint => "invalid endpoint",
            Self::InvalidArgument => "invalid argument",
            Self::NotFound => "not found",
            Self::NoCredits => "no credits left",
            Self::NotReady => "not ready",
            Self::PeerError => "peer reported an error",
            Self::NotSupported => "not supported",
            Self::NoSpace => "out of space",
        }
    }

    /// Get the wire encoding of this error (the DTU status byte).
    #[inline]
    #[must_use]
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Decode a DTU status byte.
    ///
    /// Returns `None` for 0 (success). Unknown non-zero codes map to
    /// [`Error::PeerError`]: they were produced by a remote core and carry
    /// no more meaning locally than "the peer failed".
    #[must_use]
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => None,
            1 => Some(Self::InvalidEndpoint),
            2 => Some(Self::InvalidArgument),
            3 => Some(Self::NotFound),
            4 => Some(Self::NoCredits),
            5 => Some(Self::NotReady),
            6 => Some(Self::PeerError),
            7 => Some(Self::NotSupported),
            8 => Some(Self::NoSpace),
            _ => Some(Self::PeerError),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Result type for kernel-core operations.
pub type Result<T> = core::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_roundtrip() {
        for err in [
            Error::InvalidEndpoint,
            Error::InvalidArgument,
            Error::NotFound,
            Error::NoCredits,
            Error::NotReady,
            Error::PeerError,
            Error::NotSupported,
            Error::NoSpace,
        ] {
            assert_eq!(Error::from_code(err.code()), Some(err));
        }
    }

    #[test]
    fn test_code_zero_is_success() {
        assert_eq!(Error::from_code(0), None);
    }

    #[test]
    fn test_unknown_code_is_peer_error() {
        assert_eq!(Error::from_code(0x7F), Some(Error::PeerError));
        assert_eq!(Error::from_code(0xFF), Some(Error::PeerError));
    }
}
