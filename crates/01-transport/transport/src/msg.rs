//! Message descriptors and the primitives that manage them.
//!
//! A [`RawMsg`] is a fixed-size, opaque descriptor ([`RAW_MSG_SIZE`] bytes).
//! Callers own the storage for the descriptor itself and initialise it in place
//! through one of the `msg_init*` primitives; the descriptor then refers to a
//! content block holding the data region.
//!
//! Content blocks are reference counted. [`msg_copy`] makes a second descriptor
//! share the same content, [`msg_move`] hands it over and leaves the source
//! empty, and [`msg_close`] drops one reference. The data region is released
//! when the last reference goes away, on whichever thread that happens:
//! transport-allocated regions are dropped, caller-supplied regions are handed
//! back through the [`FreeFn`] registered at initialisation.

use std::fmt;
use std::mem::{self, MaybeUninit};
use std::ptr::NonNull;
use std::sync::Arc;

use log::trace;

use crate::error::{Errno, Status};
use crate::region::Region;

/// Size in bytes of a message descriptor.
pub const RAW_MSG_SIZE: usize = mem::size_of::<RawMsg>();

const MSG_ACTIVE: u32 = 0x4D53_4741; // "MSGA"
const MSG_CLOSED: u32 = 0x4D53_4743; // "MSGC"

/// Deallocation callback for caller-supplied data regions.
///
/// Receives the pointer and length given to [`msg_init_data`]. The transport
/// invokes it exactly once, when the last descriptor sharing the content is
/// closed, and that may happen on a thread other than the one that created it.
pub type FreeFn = Box<dyn FnOnce(NonNull<u8>, usize) + Send + 'static>;

enum Release {
    /// Keeps a transport-allocated region alive until the content drops.
    Owned { _region: Region },
    Callback(FreeFn),
}

pub(crate) struct Content {
    data: NonNull<u8>,
    len: usize,
    release: Option<Release>,
}

// SAFETY: `data` is either owned by `release` or kept alive until the free
// callback runs, and it is never written after initialisation. The callback is
// only reached from `Drop`, which has exclusive access.
unsafe impl Send for Content {}
// SAFETY: see above; shared access is read-only.
unsafe impl Sync for Content {}

impl Content {
    fn owned(region: Region) -> Self {
        Self {
            data: region.as_non_null(),
            len: region.len(),
            release: Some(Release::Owned { _region: region }),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn as_slice(&self) -> &[u8] {
        // SAFETY: owned regions live as long as `self`; caller-supplied regions
        // are guaranteed valid for `len` bytes until the free callback runs,
        // which happens only in `Drop`.
        unsafe { std::slice::from_raw_parts(self.data.as_ptr(), self.len) }
    }
}

impl Drop for Content {
    fn drop(&mut self) {
        if let Some(Release::Callback(free)) = self.release.take() {
            trace!("returning {} caller bytes through free callback", self.len);
            free(self.data, self.len);
        }
    }
}

/// Content reference carried by descriptors and queued messages.
pub(crate) type Payload = Option<Arc<Content>>;

pub(crate) fn payload_bytes(payload: &Payload) -> &[u8] {
    match payload {
        Some(content) => content.as_slice(),
        None => &[],
    }
}

/// Fixed-size native message descriptor.
///
/// The layout is private to the transport; callers only hold storage for it
/// and pass it to the `msg_*` primitives and to socket send/receive.
#[repr(C)]
pub struct RawMsg {
    state: u32,
    _reserved: u32,
    content: Payload,
    _pad: [usize; 2],
}

impl RawMsg {
    fn active(content: Payload) -> Self {
        Self {
            state: MSG_ACTIVE,
            _reserved: 0,
            content,
            _pad: [0; 2],
        }
    }

    /// True once [`msg_close`] succeeded on this descriptor.
    pub fn is_closed(&self) -> bool {
        self.state != MSG_ACTIVE
    }

    fn ensure_open(&self) -> Status {
        if self.is_closed() {
            Err(Errno::EFAULT)
        } else {
            Ok(())
        }
    }

    pub(crate) fn share(&self) -> Result<Payload, Errno> {
        self.ensure_open()?;
        Ok(self.content.clone())
    }

    /// Swaps in new content and hands back the previous reference so the
    /// caller controls where it is dropped.
    pub(crate) fn replace(&mut self, content: Payload) -> Result<Payload, Errno> {
        self.ensure_open()?;
        Ok(mem::replace(&mut self.content, content))
    }
}

impl fmt::Debug for RawMsg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawMsg")
            .field("closed", &self.is_closed())
            .field("size", &msg_size(self))
            .finish()
    }
}

/// Initialises an empty descriptor, ready to receive.
pub fn msg_init(msg: &mut MaybeUninit<RawMsg>) -> Status {
    msg.write(RawMsg::active(None));
    Ok(())
}

/// Initialises a descriptor with a zero-filled, transport-owned region.
pub fn msg_init_size(msg: &mut MaybeUninit<RawMsg>, len: usize) -> Status {
    let region = Region::zeroed(len)?;
    msg.write(RawMsg::active(Some(Arc::new(Content::owned(region)))));
    Ok(())
}

/// Initialises a descriptor over a caller-supplied data region.
///
/// On success the transport owns the right to release the region and calls
/// `free` exactly once when the last reference to the content is closed. On
/// failure `free` is dropped without being called.
///
/// # Safety
///
/// `data` must be valid for reads of `len` bytes, and the bytes must not be
/// written, until `free` is invoked.
pub unsafe fn msg_init_data(
    msg: &mut MaybeUninit<RawMsg>,
    data: NonNull<u8>,
    len: usize,
    free: FreeFn,
) -> Status {
    if len > isize::MAX as usize {
        return Err(Errno::EINVAL);
    }
    let content = Content {
        data,
        len,
        release: Some(Release::Callback(free)),
    };
    msg.write(RawMsg::active(Some(Arc::new(content))));
    Ok(())
}

/// Makes `dst` share the content of `src`; `dst`'s previous content is dropped.
pub fn msg_copy(dst: &mut RawMsg, src: &RawMsg) -> Status {
    let shared = src.share()?;
    let previous = dst.replace(shared)?;
    drop(previous);
    Ok(())
}

/// Transfers the content of `src` into `dst`, leaving `src` empty.
pub fn msg_move(dst: &mut RawMsg, src: &mut RawMsg) -> Status {
    src.ensure_open()?;
    dst.ensure_open()?;
    let taken = src.content.take();
    let previous = mem::replace(&mut dst.content, taken);
    drop(previous);
    Ok(())
}

/// Drops this descriptor's content reference and marks it closed.
pub fn msg_close(msg: &mut RawMsg) -> Status {
    msg.ensure_open()?;
    msg.state = MSG_CLOSED;
    let content = msg.content.take();
    drop(content);
    Ok(())
}

/// Size of the data region in bytes; zero for empty or closed descriptors.
pub fn msg_size(msg: &RawMsg) -> usize {
    msg.content.as_deref().map_or(0, Content::len)
}

/// Start of the data region. Dangling but non-null when the size is zero.
pub fn msg_data(msg: &RawMsg) -> NonNull<u8> {
    msg.content
        .as_deref()
        .map_or(NonNull::dangling(), |content| content.data)
}
