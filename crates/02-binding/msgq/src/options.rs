//! Typed socket options.
//!
//! Each variant fixes both the option name and the value encoding, so a
//! mismatched name/value pair cannot be built.

use transport::{OptionKind, OptionName, OptionValue};

/// A writable socket option together with its value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SocketOption {
    /// Queue high-water mark in messages; `0` means unbounded.
    Hwm(u64),
    /// Socket identity, 1 to 255 bytes.
    Identity(Vec<u8>),
}

impl SocketOption {
    /// Native option name.
    pub fn name(&self) -> OptionName {
        match self {
            SocketOption::Hwm(_) => OptionName::Hwm,
            SocketOption::Identity(_) => OptionName::Identity,
        }
    }

    /// Value in the encoding the option name expects.
    pub fn value(&self) -> OptionValue {
        match self {
            SocketOption::Hwm(hwm) => OptionValue::UInt64(*hwm),
            SocketOption::Identity(bytes) => OptionValue::Bytes(bytes.clone()),
        }
    }

    /// Encoding attached to this option.
    pub fn kind(&self) -> OptionKind {
        self.name().kind()
    }

    /// Wire bytes handed to the transport.
    pub fn encode(&self) -> Vec<u8> {
        self.value().encode()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_encoding_matches_name() {
        for option in [SocketOption::Hwm(1), SocketOption::Identity(b"id".to_vec())] {
            assert_eq!(option.value().kind(), option.kind(), "{option:?}");
        }
    }

    #[test]
    fn encodings() {
        assert_eq!(SocketOption::Hwm(0x0102).encode(), vec![2, 1, 0, 0, 0, 0, 0, 0]);
        assert_eq!(SocketOption::Identity(b"node".to_vec()).encode(), b"node");
    }
}
