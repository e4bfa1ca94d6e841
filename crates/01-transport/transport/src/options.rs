//! Socket option names and their wire encodings.
//!
//! Options travel across the primitive boundary as byte strings, the way a
//! native `setsockopt` receives a pointer and a length. Each [`OptionName`]
//! fixes the [`OptionKind`] used to interpret those bytes: numeric options are
//! exactly eight little-endian bytes, byte-string options are taken verbatim
//! with their length carried alongside.

use crate::error::Errno;
use crate::socket::SocketKind;

/// Longest identity a socket accepts.
pub const MAX_IDENTITY_LEN: usize = 255;

/// Native option identifiers.
#[repr(i32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OptionName {
    /// Queue high-water mark in messages; `0` means unbounded.
    Hwm = 1,
    /// Socket identity.
    Identity = 5,
    /// Socket kind (read only).
    Type = 16,
}

/// Encoding attached to an option name.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OptionKind {
    /// Signed 64-bit integer, eight little-endian bytes.
    Int64,
    /// Unsigned 64-bit integer, eight little-endian bytes.
    UInt64,
    /// Arbitrary byte string.
    Bytes,
}

impl OptionName {
    /// Parses a native option identifier.
    pub fn from_raw(value: i32) -> Option<Self> {
        Some(match value {
            1 => OptionName::Hwm,
            5 => OptionName::Identity,
            16 => OptionName::Type,
            _ => return None,
        })
    }

    /// Native option identifier.
    pub const fn as_raw(self) -> i32 {
        self as i32
    }

    /// Encoding used for this option's value.
    pub const fn kind(self) -> OptionKind {
        match self {
            OptionName::Hwm => OptionKind::UInt64,
            OptionName::Identity => OptionKind::Bytes,
            OptionName::Type => OptionKind::Int64,
        }
    }

    /// Whether the option can be written.
    pub const fn is_writable(self) -> bool {
        !matches!(self, OptionName::Type)
    }
}

/// Decoded option value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OptionValue {
    /// Value of an [`OptionKind::Int64`] option.
    Int64(i64),
    /// Value of an [`OptionKind::UInt64`] option.
    UInt64(u64),
    /// Value of an [`OptionKind::Bytes`] option.
    Bytes(Vec<u8>),
}

impl OptionValue {
    /// Encoding this value belongs to.
    pub fn kind(&self) -> OptionKind {
        match self {
            OptionValue::Int64(_) => OptionKind::Int64,
            OptionValue::UInt64(_) => OptionKind::UInt64,
            OptionValue::Bytes(_) => OptionKind::Bytes,
        }
    }

    /// Wire encoding of the value.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            OptionValue::Int64(value) => value.to_le_bytes().to_vec(),
            OptionValue::UInt64(value) => value.to_le_bytes().to_vec(),
            OptionValue::Bytes(bytes) => bytes.clone(),
        }
    }

    /// Interprets `raw` according to `kind`.
    pub fn decode(kind: OptionKind, raw: &[u8]) -> Result<Self, Errno> {
        match kind {
            OptionKind::Int64 => Ok(OptionValue::Int64(i64::from_le_bytes(fixed_width(raw)?))),
            OptionKind::UInt64 => Ok(OptionValue::UInt64(u64::from_le_bytes(fixed_width(raw)?))),
            OptionKind::Bytes => Ok(OptionValue::Bytes(raw.to_vec())),
        }
    }
}

fn fixed_width(raw: &[u8]) -> Result<[u8; 8], Errno> {
    raw.try_into().map_err(|_| Errno::EINVAL)
}

/// Per-socket option state.
#[derive(Clone, Debug)]
pub(crate) struct SocketOptions {
    pub(crate) hwm: u64,
    identity: Vec<u8>,
}

impl SocketOptions {
    pub(crate) fn new(hwm: u64) -> Self {
        Self {
            hwm,
            identity: Vec::new(),
        }
    }

    pub(crate) fn set(&mut self, name: OptionName, raw: &[u8]) -> Result<(), Errno> {
        if !name.is_writable() {
            return Err(Errno::EINVAL);
        }
        match OptionValue::decode(name.kind(), raw)? {
            OptionValue::UInt64(hwm) => self.hwm = hwm,
            OptionValue::Bytes(identity) => {
                if identity.is_empty() || identity.len() > MAX_IDENTITY_LEN {
                    return Err(Errno::EINVAL);
                }
                self.identity = identity;
            }
            OptionValue::Int64(_) => return Err(Errno::EINVAL),
        }
        Ok(())
    }

    pub(crate) fn get(&self, kind: SocketKind, name: OptionName) -> OptionValue {
        match name {
            OptionName::Hwm => OptionValue::UInt64(self.hwm),
            OptionName::Identity => OptionValue::Bytes(self.identity.clone()),
            OptionName::Type => OptionValue::Int64(i64::from(kind.as_raw())),
        }
    }
}
