use std::fmt;

use log::debug;
use transport::{msg_size, RawMsg};

use super::sealed::Sealed;
use super::{Descriptor, MessageBuffer, Ownership};
use crate::Result;

/// Buffer whose native resources are released when the value is dropped.
///
/// Failures while closing on drop are swallowed and only logged at `debug`
/// level. [`MessageBuffer::release`] is a no-op.
pub struct ManagedBuffer {
    descriptor: Descriptor,
}

impl Sealed for ManagedBuffer {
    fn from_descriptor(descriptor: Descriptor) -> Self {
        Self { descriptor }
    }
}

impl MessageBuffer for ManagedBuffer {
    fn ownership(&self) -> Ownership {
        Ownership::Managed
    }

    fn address(&self) -> Result<&RawMsg> {
        Ok(self.descriptor.raw())
    }

    fn address_mut(&mut self) -> Result<&mut RawMsg> {
        Ok(self.descriptor.raw_mut())
    }

    fn release(&mut self) -> Result<()> {
        Ok(())
    }
}

impl Drop for ManagedBuffer {
    fn drop(&mut self) {
        if let Err(code) = self.descriptor.close() {
            debug!("ignoring failure while reclaiming managed buffer: {code}");
        }
    }
}

impl fmt::Debug for ManagedBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagedBuffer")
            .field("size", &msg_size(self.descriptor.raw()))
            .finish()
    }
}
