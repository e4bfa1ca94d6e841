use thiserror::Error;
use transport::{Errno, OptionName};

/// Result alias used throughout the binding.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Failures surfaced by buffers and channels.
///
/// Would-block outcomes are never errors; they are reported as `false` or
/// `None` by the channel operations.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum Error {
    /// A buffer initialiser got a nonzero status from the transport.
    #[error("failed to initialise message buffer: {code}")]
    Init { code: Errno },
    /// Copying or moving content between buffers failed.
    #[error("failed to transfer message content: {code}")]
    Copy { code: Errno },
    /// A socket call failed for a reason other than would-block.
    #[error("transport call failed: {code}")]
    Transport { code: Errno },
    /// The buffer was explicitly released and can no longer be used.
    #[error("message buffer used after release")]
    UseAfterRelease,
    /// The transport rejected a socket option.
    #[error("socket option {name:?} rejected: {code}")]
    InvalidOption { name: OptionName, code: Errno },
}

impl Error {
    /// Native status code behind the error, if there is one.
    pub fn code(&self) -> Option<Errno> {
        match self {
            Error::Init { code }
            | Error::Copy { code }
            | Error::Transport { code }
            | Error::InvalidOption { code, .. } => Some(*code),
            Error::UseAfterRelease => None,
        }
    }
}
