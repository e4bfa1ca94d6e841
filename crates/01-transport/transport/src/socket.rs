//! Socket identifiers, kinds, flags, and endpoint parsing.

use std::fmt;

use crate::error::Errno;

/// Opaque handle naming a socket inside a [`Context`](crate::Context).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SocketHandle(u32);

impl SocketHandle {
    /// Wraps a raw handle value; it is only meaningful to the context that issued it.
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Returns the raw handle value.
    pub const fn as_raw(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for SocketHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SocketHandle({})", self.0)
    }
}

/// Messaging pattern implemented by a socket.
#[repr(i32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SocketKind {
    /// Bidirectional pair.
    Pair = 0,
    /// Pipeline sink.
    Pull = 7,
    /// Pipeline source, round-robins across peers.
    Push = 8,
}

impl SocketKind {
    /// Parses the native numeric socket type.
    pub fn from_raw(value: i32) -> Option<Self> {
        Some(match value {
            0 => SocketKind::Pair,
            7 => SocketKind::Pull,
            8 => SocketKind::Push,
            _ => return None,
        })
    }

    /// Native numeric socket type.
    pub const fn as_raw(self) -> i32 {
        self as i32
    }

    /// Whether two kinds may be connected to each other.
    pub fn is_compatible(self, peer: SocketKind) -> bool {
        use SocketKind::*;
        matches!((self, peer), (Pair, Pair) | (Push, Pull) | (Pull, Push))
    }

    /// Whether the kind is allowed to send.
    pub fn can_send(self) -> bool {
        self != SocketKind::Pull
    }

    /// Whether the kind is allowed to receive.
    pub fn can_recv(self) -> bool {
        self != SocketKind::Push
    }
}

/// Flags accepted by send and receive. The empty set selects blocking mode.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Flags(u32);

impl Flags {
    /// Blocking operation.
    pub const NONE: Flags = Flags(0);
    /// Fail with [`Errno::EAGAIN`] instead of blocking.
    pub const DONTWAIT: Flags = Flags(1);

    /// Returns the raw flag bits.
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// True when the non-blocking bit is set.
    pub const fn is_nonblocking(self) -> bool {
        self.0 & Self::DONTWAIT.0 != 0
    }
}

/// Extracts the endpoint name from an `inproc://name` address.
pub(crate) fn parse_endpoint(address: &str) -> Result<&str, Errno> {
    let (scheme, name) = address.split_once("://").ok_or(Errno::EINVAL)?;
    if scheme != "inproc" {
        return Err(Errno::EPROTONOSUPPORT);
    }
    if name.is_empty() {
        return Err(Errno::EINVAL);
    }
    Ok(name)
}
