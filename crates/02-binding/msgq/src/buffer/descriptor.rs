use std::fmt;
use std::mem::MaybeUninit;

use transport::{msg_close, Errno, RawMsg, Status};

/// Heap-backed storage for one native message descriptor.
///
/// The descriptor lives in its own allocation so its address stays fixed while
/// the owning buffer value moves around.
pub struct Descriptor {
    raw: Box<RawMsg>,
}

impl Descriptor {
    /// Allocates descriptor storage and runs `init` on it.
    ///
    /// On failure the storage is freed without the descriptor ever having been
    /// considered initialised.
    pub(crate) fn init<F>(init: F) -> Result<Self, Errno>
    where
        F: FnOnce(&mut MaybeUninit<RawMsg>) -> Status,
    {
        let mut slot: Box<MaybeUninit<RawMsg>> = Box::new(MaybeUninit::uninit());
        init(&mut *slot)?;
        // SAFETY: `init` reported success, so every `msg_init*` primitive has
        // written a valid descriptor into the slot. `MaybeUninit<T>` has the
        // same layout as `T`, so the allocation can be reinterpreted.
        let raw = unsafe { Box::from_raw(Box::into_raw(slot).cast::<RawMsg>()) };
        Ok(Self { raw })
    }

    pub(crate) fn raw(&self) -> &RawMsg {
        &self.raw
    }

    pub(crate) fn raw_mut(&mut self) -> &mut RawMsg {
        &mut self.raw
    }

    /// Closes the native descriptor. Must be called at most once.
    pub(crate) fn close(&mut self) -> Status {
        msg_close(&mut self.raw)
    }

    #[cfg(test)]
    pub(crate) fn is_closed(&self) -> bool {
        self.raw.is_closed()
    }
}

impl fmt::Debug for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.raw, f)
    }
}
