//! Message buffers and channels over the in-process transport.
//!
//! * [`Buffer`] / [`ManagedBuffer`] – native message buffers released
//!   explicitly or at scope end, both usable through [`MessageBuffer`].
//! * [`Channel`] – a socket that sends and receives buffers in blocking or
//!   non-blocking mode, reporting would-block as `false` rather than an error.
//! * [`SocketOption`] / [`ChannelConfig`] – typed socket configuration.

mod buffer;
mod channel;
mod config;
mod error;
mod options;

pub use buffer::{Buffer, ManagedBuffer, MessageBuffer, Ownership};
pub use channel::Channel;
pub use config::ChannelConfig;
pub use error::{Error, Result};
pub use options::SocketOption;
pub use transport::{
    Context, ContextConfig, Errno, OptionName, OptionValue, SocketHandle, SocketKind,
};
