//! In-process message-queue transport.
//!
//! The crate provides the native capability that message buffers and channels
//! are built on:
//! * [`RawMsg`] and the `msg_*` primitives – fixed-size descriptors over
//!   reference-counted content, released exactly once.
//! * [`Region`] – aligned native allocations backing message content.
//! * [`Context`] – a socket table with `inproc://` endpoints, queue limits, and
//!   blocking or non-blocking send/receive.
//! * [`Errno`] – numeric status codes; [`Errno::EAGAIN`] is the would-block code.

mod context;
mod error;
mod msg;
mod options;
mod region;
mod socket;

pub use context::{Context, ContextConfig};
pub use error::{Errno, Status, TransportError, TransportResult};
pub use msg::{
    msg_close, msg_copy, msg_data, msg_init, msg_init_data, msg_init_size, msg_move, msg_size,
    FreeFn, RawMsg, RAW_MSG_SIZE,
};
pub use options::{OptionKind, OptionName, OptionValue, MAX_IDENTITY_LEN};
pub use region::{Region, MMAP_THRESHOLD, REGION_ALIGNMENT};
pub use socket::{Flags, SocketHandle, SocketKind};

/// Version of the transport as `(major, minor, patch)`.
pub fn version() -> (u32, u32, u32) {
    let parse = |part: &str| part.parse().unwrap_or(0);
    (
        parse(env!("CARGO_PKG_VERSION_MAJOR")),
        parse(env!("CARGO_PKG_VERSION_MINOR")),
        parse(env!("CARGO_PKG_VERSION_PATCH")),
    )
}
