//! Sockets that move message buffers.
//!
//! A [`Channel`] owns one native socket. Sending and receiving operate on the
//! caller's buffer in place and never change its ownership or release it; the
//! caller stays responsible for the buffer on success and on failure alike.

use std::cell::Cell;
use std::marker::PhantomData;

use log::{debug, trace};
use transport::{Context, Errno, Flags, OptionName, OptionValue, SocketHandle, SocketKind, Status};

use crate::buffer::{Buffer, ManagedBuffer, MessageBuffer, Ownership};
use crate::config::ChannelConfig;
use crate::options::SocketOption;
use crate::{Error, Result};

/// Maps a native status onto the channel contract: `true` on success, `false`
/// on would-block, an error for everything else.
fn classify(status: Status, op: &str) -> Result<bool> {
    match status {
        Ok(()) => Ok(true),
        Err(code) if code.is_would_block() => {
            debug!("{op} would block");
            Ok(false)
        }
        Err(code) => Err(Error::Transport { code }),
    }
}

fn flags(nonblocking: bool) -> Flags {
    if nonblocking {
        Flags::DONTWAIT
    } else {
        Flags::NONE
    }
}

/// Wrapper over a native socket handle.
///
/// `Channel` is `Send` but not `Sync`: a socket may move between threads but is
/// only ever driven from one at a time.
pub struct Channel {
    context: Context,
    handle: SocketHandle,
    kind: SocketKind,
    ownership: Ownership,
    closed: bool,
    _not_sync: PhantomData<Cell<()>>,
}

impl Channel {
    /// Opens a socket of `kind` whose text helpers use `ownership` buffers.
    pub fn new(context: &Context, kind: SocketKind, ownership: Ownership) -> Result<Self> {
        let handle = context
            .socket(kind)
            .map_err(|code| Error::Transport { code })?;
        Ok(Self {
            context: context.clone(),
            handle,
            kind,
            ownership,
            closed: false,
            _not_sync: PhantomData,
        })
    }

    /// Opens a socket and applies `config` to it.
    pub fn with_config(
        context: &Context,
        kind: SocketKind,
        config: &ChannelConfig,
    ) -> Result<Self> {
        let channel = Self::new(context, kind, config.ownership)?;
        for option in config.options() {
            channel.set_option(&option)?;
        }
        Ok(channel)
    }

    pub fn handle(&self) -> SocketHandle {
        self.handle
    }

    pub fn kind(&self) -> SocketKind {
        self.kind
    }

    /// Ownership mode used for the buffers behind the text helpers.
    pub fn ownership(&self) -> Ownership {
        self.ownership
    }

    pub fn bind(&self, endpoint: &str) -> Result<()> {
        self.context
            .bind(self.handle, endpoint)
            .map_err(|code| Error::Transport { code })
    }

    pub fn connect(&self, endpoint: &str) -> Result<()> {
        self.context
            .connect(self.handle, endpoint)
            .map_err(|code| Error::Transport { code })
    }

    /// Hands `buffer`'s content to the transport.
    ///
    /// Returns `false` when `nonblocking` is set and the message cannot be
    /// queued right now. The buffer is left untouched either way.
    pub fn send<B>(&self, buffer: &B, nonblocking: bool) -> Result<bool>
    where
        B: MessageBuffer,
    {
        let raw = buffer.address()?;
        let sent = classify(
            self.context.send(self.handle, raw, flags(nonblocking)),
            "send",
        )?;
        if sent {
            trace!("channel {:?} sent {} bytes", self.handle, buffer.size()?);
        }
        Ok(sent)
    }

    /// Replaces `buffer`'s content with the next inbound message.
    ///
    /// Returns `false` when `nonblocking` is set and nothing is pending. On
    /// failure the buffer keeps its previous content and can still be released.
    pub fn receive<B>(&self, buffer: &mut B, nonblocking: bool) -> Result<bool>
    where
        B: MessageBuffer,
    {
        let raw = buffer.address_mut()?;
        let received = classify(
            self.context.recv(self.handle, raw, flags(nonblocking)),
            "receive",
        )?;
        if received {
            trace!("channel {:?} received {} bytes", self.handle, buffer.size()?);
        }
        Ok(received)
    }

    /// Sends `text` through a transient buffer of the channel's ownership mode.
    ///
    /// The transient buffer is released whether or not the send succeeds.
    pub fn send_text(&self, text: impl AsRef<[u8]>, nonblocking: bool) -> Result<bool> {
        match self.ownership {
            Ownership::Unmanaged => self.send_transient::<Buffer>(text.as_ref(), nonblocking),
            Ownership::Managed => self.send_transient::<ManagedBuffer>(text.as_ref(), nonblocking),
        }
    }

    /// Receives the next message as bytes; `None` on would-block.
    pub fn receive_text(&self, nonblocking: bool) -> Result<Option<Vec<u8>>> {
        match self.ownership {
            Ownership::Unmanaged => self.receive_transient::<Buffer>(nonblocking),
            Ownership::Managed => self.receive_transient::<ManagedBuffer>(nonblocking),
        }
    }

    fn send_transient<B: MessageBuffer>(&self, bytes: &[u8], nonblocking: bool) -> Result<bool> {
        let mut buffer = B::from_bytes(bytes)?;
        let sent = self.send(&buffer, nonblocking);
        let released = buffer.release();
        let sent = sent?;
        released?;
        Ok(sent)
    }

    fn receive_transient<B: MessageBuffer>(&self, nonblocking: bool) -> Result<Option<Vec<u8>>> {
        let mut buffer = B::empty()?;
        let received = self
            .receive(&mut buffer, nonblocking)
            .and_then(|received| received.then(|| buffer.to_vec()).transpose());
        let released = buffer.release();
        let received = received?;
        released?;
        Ok(received)
    }

    /// Applies a typed option.
    pub fn set_option(&self, option: &SocketOption) -> Result<()> {
        let name = option.name();
        self.context
            .setsockopt(self.handle, name.as_raw(), &option.encode())
            .map_err(|code| option_error(name, code))
    }

    /// Reads an option back.
    pub fn option(&self, name: OptionName) -> Result<OptionValue> {
        self.context
            .option(self.handle, name)
            .map_err(|code| option_error(name, code))
    }

    /// Closes the socket. Later calls fail with a transport error.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.context
            .close(self.handle)
            .map_err(|code| Error::Transport { code })
    }
}

fn option_error(name: OptionName, code: Errno) -> Error {
    if code == Errno::EINVAL {
        Error::InvalidOption { name, code }
    } else {
        Error::Transport { code }
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            debug!("ignoring failure while closing channel {:?}: {err}", self.handle);
        }
    }
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("handle", &self.handle)
            .field("kind", &self.kind)
            .field("ownership", &self.ownership)
            .field("closed", &self.closed)
            .finish()
    }
}
