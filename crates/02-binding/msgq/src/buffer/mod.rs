//! Message buffers over native descriptors.
//!
//! A buffer pairs a fixed-size native descriptor with the data region it refers
//! to. Two reclamation disciplines are offered behind one trait:
//!
//! * [`Buffer`] – unmanaged; the caller calls [`MessageBuffer::release`]
//!   exactly once, after which every operation fails with
//!   [`Error::UseAfterRelease`].
//! * [`ManagedBuffer`] – the descriptor is closed when the value is dropped;
//!   `release` is a no-op.
//!
//! Content only ever changes wholesale, through copy, move, or a receive.

mod descriptor;
mod managed;
mod unmanaged;

use std::mem::MaybeUninit;
use std::ptr::NonNull;

use serde::{Deserialize, Serialize};
use transport::{
    msg_copy, msg_data, msg_init, msg_init_data, msg_move, msg_size, Errno, FreeFn, RawMsg,
    Region,
};

use crate::{Error, Result};

pub use descriptor::Descriptor;
pub use managed::ManagedBuffer;
pub use unmanaged::Buffer;

/// How a buffer's native resources are reclaimed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Ownership {
    /// The caller releases explicitly.
    Unmanaged,
    /// Released automatically when the value goes out of scope.
    #[default]
    Managed,
}

pub(crate) mod sealed {
    use super::Descriptor;

    pub trait Sealed {
        fn from_descriptor(descriptor: Descriptor) -> Self
        where
            Self: Sized;
    }
}

/// Registers `bytes` with the transport under a callback that frees them.
///
/// # Safety
///
/// `data` must stay valid and unmodified for `len` bytes until `free` runs.
unsafe fn register(
    slot: &mut MaybeUninit<RawMsg>,
    data: NonNull<u8>,
    len: usize,
    free: FreeFn,
) -> std::result::Result<(), Errno> {
    log::trace!("registering {len} byte data region");
    msg_init_data(slot, data, len, free)
}

/// Heap-pinned owner of caller bytes, held as a raw pointer.
///
/// Freed when the guard is dropped: normally inside the transport's free
/// callback, or directly when registration fails.
struct OwnerBox<T>(NonNull<T>);

// SAFETY: the guard owns its `T` exclusively and only exposes `&T`, so it is as
// thread-safe as `T` itself.
unsafe impl<T: Send + Sync> Send for OwnerBox<T> {}

impl<T: AsRef<[u8]>> OwnerBox<T> {
    fn new(owner: T) -> Self {
        Self(NonNull::from(Box::leak(Box::new(owner))))
    }

    fn bytes(&self) -> &[u8] {
        // SAFETY: the pointer came from a leaked box and stays valid until
        // `drop` rebuilds the box.
        unsafe { self.0.as_ref() }.as_ref()
    }
}

impl<T> Drop for OwnerBox<T> {
    fn drop(&mut self) {
        // SAFETY: the pointer came from a leaked box and is released once.
        drop(unsafe { Box::from_raw(self.0.as_ptr()) });
    }
}

/// Operations shared by both ownership disciplines.
///
/// Channels accept any `MessageBuffer`; the trait is sealed so the descriptor
/// contract cannot be implemented outside this crate.
pub trait MessageBuffer: sealed::Sealed {
    /// Ownership discipline of this buffer.
    fn ownership(&self) -> Ownership;

    /// Native descriptor for transport calls. No ownership is transferred.
    fn address(&self) -> Result<&RawMsg>;

    /// Mutable native descriptor, used when a receive replaces the content.
    fn address_mut(&mut self) -> Result<&mut RawMsg>;

    /// Releases the native resources. A no-op for managed buffers.
    fn release(&mut self) -> Result<()>;

    /// Empty buffer, ready to receive.
    fn empty() -> Result<Self>
    where
        Self: Sized,
    {
        let descriptor = Descriptor::init(msg_init).map_err(|code| Error::Init { code })?;
        Ok(Self::from_descriptor(descriptor))
    }

    /// Buffer holding a native copy of `content`.
    ///
    /// The copy lives in a transport region handed over with a free callback;
    /// the transport invokes it once, possibly on another thread.
    fn from_bytes(content: &[u8]) -> Result<Self>
    where
        Self: Sized,
    {
        let region = Region::copy_from_slice(content).map_err(|err| Error::Init {
            code: Errno::from(err),
        })?;
        let data = region.as_non_null();
        let len = region.len();
        let free: FreeFn = Box::new(move |_, _| drop(region));
        let descriptor = Descriptor::init(|slot| {
            // SAFETY: the region is moved into `free` and lives until the
            // transport invokes it; nothing writes to it after the copy.
            unsafe { register(slot, data, len, free) }
        })
        .map_err(|code| Error::Init { code })?;
        Ok(Self::from_descriptor(descriptor))
    }

    /// Buffer over `owner`'s bytes without copying them.
    ///
    /// `owner` is kept alive by the transport until the last reference to the
    /// content is closed, then dropped on that thread.
    fn from_owned<T>(owner: T) -> Result<Self>
    where
        Self: Sized,
        T: AsRef<[u8]> + Send + Sync + 'static,
    {
        let owner = OwnerBox::new(owner);
        let bytes = owner.bytes();
        let data = NonNull::new(bytes.as_ptr().cast_mut()).unwrap_or(NonNull::dangling());
        let len = bytes.len();
        let free: FreeFn = Box::new(move |_, _| drop(owner));
        let descriptor = Descriptor::init(|slot| {
            // SAFETY: the owner sits behind a raw pointer that moving `OwnerBox`
            // does not retag; it is only freed when `free` drops the guard, and
            // `as_ref` hands out a shared view that is never mutated.
            unsafe { register(slot, data, len, free) }
        })
        .map_err(|code| Error::Init { code })?;
        Ok(Self::from_descriptor(descriptor))
    }

    /// New buffer sharing a copy of `source`'s content.
    fn copy_of<B>(source: &B) -> Result<Self>
    where
        Self: Sized,
        B: MessageBuffer,
    {
        let mut buffer = Self::empty()?;
        buffer.copy_from(source)?;
        Ok(buffer)
    }

    /// New buffer taking `source`'s content; `source` is left empty.
    fn moved_from<B>(source: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: MessageBuffer,
    {
        let mut buffer = Self::empty()?;
        buffer.move_from(source)?;
        Ok(buffer)
    }

    /// Replaces this buffer's content with a copy of `source`'s.
    fn copy_from<B>(&mut self, source: &B) -> Result<()>
    where
        B: MessageBuffer,
    {
        let src = source.address()?;
        let dst = self.address_mut()?;
        msg_copy(dst, src).map_err(|code| Error::Copy { code })
    }

    /// Takes `source`'s content, leaving `source` valid but empty.
    fn move_from<B>(&mut self, source: &mut B) -> Result<()>
    where
        B: MessageBuffer,
    {
        let src = source.address_mut()?;
        let dst = self.address_mut()?;
        msg_move(dst, src).map_err(|code| Error::Copy { code })
    }

    /// Bytes in the data region.
    fn size(&self) -> Result<usize> {
        Ok(msg_size(self.address()?))
    }

    /// Start of the data region; only valid while the buffer lives and its
    /// content is not replaced.
    fn data(&self) -> Result<NonNull<u8>> {
        Ok(msg_data(self.address()?))
    }

    /// The data region as a byte slice.
    fn as_bytes(&self) -> Result<&[u8]> {
        let raw = self.address()?;
        let len = msg_size(raw);
        // SAFETY: the transport guarantees `msg_data` is valid for `msg_size`
        // bytes while the descriptor is open; the borrow of `self` keeps the
        // descriptor open and its content unchanged.
        Ok(unsafe { std::slice::from_raw_parts(msg_data(raw).as_ptr(), len) })
    }

    /// Owned copy of the data region.
    fn to_vec(&self) -> Result<Vec<u8>> {
        self.as_bytes().map(<[u8]>::to_vec)
    }

    /// True when the data region holds no bytes.
    fn is_empty(&self) -> Result<bool> {
        self.size().map(|size| size == 0)
    }
}
