//! Status codes and structural errors for the transport crate.
//!
//! Every primitive reports failure as an [`Errno`], the numeric status a
//! native message-queue library hands back: success is `Ok(())` and every other
//! value names a reason. [`Errno::EAGAIN`] is the would-block code; callers use
//! [`Errno::is_would_block`] to tell backpressure apart from real failures.
//!
//! [`TransportError`] covers the structural failures of region allocation and
//! converts into the matching status code at the primitive boundary.

use std::fmt;

use thiserror::Error;

/// Convenience result alias for fallible region helpers.
pub type TransportResult<T, E = TransportError> = Result<T, E>;

/// Outcome of a native primitive: `Ok(())` is status zero.
pub type Status = Result<(), Errno>;

/// Base offset for codes that have no POSIX counterpart.
const HAUSNUMERO: i32 = 156_384_712;

/// Numeric status code reported by the transport primitives.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Errno(i32);

impl Errno {
    /// Resource temporarily unavailable; the non-blocking call would block.
    pub const EAGAIN: Errno = Errno(11);
    /// Not enough memory to complete the request.
    pub const ENOMEM: Errno = Errno(12);
    /// The descriptor is closed or otherwise unusable.
    pub const EFAULT: Errno = Errno(14);
    /// Invalid argument.
    pub const EINVAL: Errno = Errno(22);
    /// The handle does not refer to an open socket.
    pub const ENOTSOCK: Errno = Errno(88);
    /// Message exceeds the context's maximum message size.
    pub const EMSGSIZE: Errno = Errno(90);
    /// The endpoint names an unsupported transport.
    pub const EPROTONOSUPPORT: Errno = Errno(93);
    /// The operation is not supported by this socket kind.
    pub const ENOTSUP: Errno = Errno(95);
    /// The endpoint is already bound.
    pub const EADDRINUSE: Errno = Errno(98);
    /// Nothing is bound at the endpoint.
    pub const ECONNREFUSED: Errno = Errno(111);
    /// The owning context was terminated.
    pub const ETERM: Errno = Errno(HAUSNUMERO + 53);

    /// Wraps a raw status value.
    pub const fn from_raw(code: i32) -> Self {
        Self(code)
    }

    /// Returns the raw status value.
    pub const fn code(self) -> i32 {
        self.0
    }

    /// True for the would-block code exported by this transport.
    pub fn is_would_block(self) -> bool {
        self == Self::EAGAIN
    }

    /// Symbolic name of the code, if it is one the transport emits.
    pub fn name(self) -> Option<&'static str> {
        let name = match self {
            Self::EAGAIN => "EAGAIN",
            Self::ENOMEM => "ENOMEM",
            Self::EFAULT => "EFAULT",
            Self::EINVAL => "EINVAL",
            Self::ENOTSOCK => "ENOTSOCK",
            Self::EMSGSIZE => "EMSGSIZE",
            Self::EPROTONOSUPPORT => "EPROTONOSUPPORT",
            Self::ENOTSUP => "ENOTSUP",
            Self::EADDRINUSE => "EADDRINUSE",
            Self::ECONNREFUSED => "ECONNREFUSED",
            Self::ETERM => "ETERM",
            _ => return None,
        };
        Some(name)
    }

    /// Human readable description, in the spirit of `strerror`.
    pub fn message(self) -> &'static str {
        match self {
            Self::EAGAIN => "resource temporarily unavailable",
            Self::ENOMEM => "cannot allocate memory",
            Self::EFAULT => "bad message descriptor",
            Self::EINVAL => "invalid argument",
            Self::ENOTSOCK => "not a socket",
            Self::EMSGSIZE => "message too long",
            Self::EPROTONOSUPPORT => "protocol not supported",
            Self::ENOTSUP => "operation not supported",
            Self::EADDRINUSE => "address already in use",
            Self::ECONNREFUSED => "connection refused",
            Self::ETERM => "context was terminated",
            _ => "unknown error",
        }
    }
}

impl fmt::Debug for Errno {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "Errno({name})"),
            None => write!(f, "Errno({})", self.0),
        }
    }
}

impl fmt::Display for Errno {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (errno {})", self.message(), self.0)
    }
}

impl std::error::Error for Errno {}

/// Errors surfaced by the region allocator.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Requested length cannot be described by an allocation layout.
    #[error("region of {requested} bytes exceeds the {maximum}-byte limit")]
    InvalidCapacity { requested: usize, maximum: usize },
    /// The allocator or the anonymous mapping refused the request.
    #[error("failed to allocate region of {size} bytes aligned to {alignment}")]
    AllocationFailed { size: usize, alignment: usize },
}

impl From<TransportError> for Errno {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::InvalidCapacity { .. } => Errno::EINVAL,
            TransportError::AllocationFailed { .. } => Errno::ENOMEM,
        }
    }
}
