use std::fmt;

use log::{trace, warn};
use transport::{msg_size, RawMsg};

use super::sealed::Sealed;
use super::{Descriptor, MessageBuffer, Ownership};
use crate::{Error, Result};

/// Buffer whose native resources are released explicitly.
///
/// [`MessageBuffer::release`] closes the descriptor and frees its storage;
/// afterwards every operation fails with [`Error::UseAfterRelease`]. A buffer
/// dropped without being released is reclaimed anyway and logged as a leak of
/// the explicit-release contract.
pub struct Buffer {
    descriptor: Option<Descriptor>,
}

impl Buffer {
    /// True once [`MessageBuffer::release`] has succeeded.
    pub fn is_released(&self) -> bool {
        self.descriptor.is_none()
    }

    fn descriptor(&self) -> Result<&Descriptor> {
        self.descriptor.as_ref().ok_or(Error::UseAfterRelease)
    }
}

impl Sealed for Buffer {
    fn from_descriptor(descriptor: Descriptor) -> Self {
        Self {
            descriptor: Some(descriptor),
        }
    }
}

impl MessageBuffer for Buffer {
    fn ownership(&self) -> Ownership {
        Ownership::Unmanaged
    }

    fn address(&self) -> Result<&RawMsg> {
        self.descriptor().map(Descriptor::raw)
    }

    fn address_mut(&mut self) -> Result<&mut RawMsg> {
        self.descriptor
            .as_mut()
            .map(Descriptor::raw_mut)
            .ok_or(Error::UseAfterRelease)
    }

    fn release(&mut self) -> Result<()> {
        let mut descriptor = self.descriptor.take().ok_or(Error::UseAfterRelease)?;
        trace!("releasing {} byte buffer", msg_size(descriptor.raw()));
        descriptor
            .close()
            .map_err(|code| Error::Transport { code })
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        if let Some(mut descriptor) = self.descriptor.take() {
            warn!(
                "unmanaged buffer of {} bytes dropped without release; reclaiming",
                msg_size(descriptor.raw())
            );
            if let Err(code) = descriptor.close() {
                warn!("reclaiming dropped buffer failed: {code}");
            }
        }
    }
}

impl fmt::Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.descriptor {
            Some(descriptor) => f
                .debug_struct("Buffer")
                .field("size", &msg_size(descriptor.raw()))
                .finish(),
            None => f.debug_struct("Buffer").field("released", &true).finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn release_is_single_shot() {
        let mut buffer = Buffer::from_bytes(b"once").expect("buffer");
        assert!(!buffer.is_released());
        buffer.release().expect("first release");
        assert!(buffer.is_released());
        assert_eq!(buffer.release(), Err(Error::UseAfterRelease));
        assert_eq!(buffer.size(), Err(Error::UseAfterRelease));
        assert_eq!(buffer.as_bytes().map(<[u8]>::len), Err(Error::UseAfterRelease));
    }

    #[test]
    fn debug_shows_state() {
        let mut buffer = Buffer::from_bytes(b"abc").expect("buffer");
        assert_eq!(format!("{buffer:?}"), "Buffer { size: 3 }");
        buffer.release().expect("release");
        assert_eq!(format!("{buffer:?}"), "Buffer { released: true }");
    }

    #[test]
    fn dropping_unreleased_buffer_reclaims() {
        let _ = env_logger::builder().is_test(true).try_init();
        let buffer = Buffer::from_bytes(b"forgotten").expect("buffer");
        drop(buffer);
    }
}
