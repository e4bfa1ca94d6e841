//! Native allocations backing message content.
//!
//! A [`Region`] is an exclusively owned, aligned byte range. Small regions come
//! from the global allocator; regions of at least [`MMAP_THRESHOLD`] bytes are
//! served by anonymous mappings on native targets so their pages go straight
//! back to the OS once the region is dropped. Zero-length regions never
//! allocate.
//!
//! Regions are `Send`: message content may be freed on whichever thread closes
//! the last descriptor referring to it.

use crate::{TransportError, TransportResult};
use std::alloc::{alloc, alloc_zeroed, dealloc, Layout};
use std::fmt;
use std::ptr::{self, NonNull};

/// Alignment honoured by heap-backed regions.
pub const REGION_ALIGNMENT: usize = 16;

/// Regions at or above this size are backed by an anonymous mapping.
pub const MMAP_THRESHOLD: usize = 128 * 1024;

#[cfg(not(target_arch = "wasm32"))]
type NativeMap = memmap2::MmapMut;

enum Backing {
    Empty,
    #[cfg(not(target_arch = "wasm32"))]
    Mapped(NativeMap),
    Heap {
        ptr: NonNull<u8>,
        layout: Layout,
    },
}

impl Backing {
    fn as_ptr(&self) -> NonNull<u8> {
        match self {
            Backing::Empty => NonNull::dangling(),
            #[cfg(not(target_arch = "wasm32"))]
            Backing::Mapped(map) => {
                NonNull::new(map.as_ptr() as *mut u8).unwrap_or(NonNull::dangling())
            }
            Backing::Heap { ptr, .. } => *ptr,
        }
    }

    fn as_mut_ptr(&mut self) -> *mut u8 {
        match self {
            Backing::Empty => NonNull::dangling().as_ptr(),
            #[cfg(not(target_arch = "wasm32"))]
            Backing::Mapped(map) => map.as_mut_ptr(),
            Backing::Heap { ptr, .. } => ptr.as_ptr(),
        }
    }
}

/// Exclusively owned native allocation.
pub struct Region {
    len: usize,
    backing: Backing,
}

// SAFETY: a region owns its allocation outright; nothing in it is tied to the
// allocating thread, so it may be dropped from any thread.
unsafe impl Send for Region {}
// SAFETY: shared references only expose the bytes immutably.
unsafe impl Sync for Region {}

impl Region {
    /// Allocates `len` zeroed bytes.
    pub fn zeroed(len: usize) -> TransportResult<Self> {
        Self::allocate(len, true)
    }

    /// Allocates a region sized to `bytes` and copies them in.
    pub fn copy_from_slice(bytes: &[u8]) -> TransportResult<Self> {
        let mut region = Self::allocate(bytes.len(), false)?;
        if !bytes.is_empty() {
            let dst = region.backing.as_mut_ptr();
            unsafe {
                // SAFETY: the region was just allocated with exactly `bytes.len()`
                // bytes and cannot overlap the borrowed source slice.
                ptr::copy_nonoverlapping(bytes.as_ptr(), dst, bytes.len());
            }
        }
        Ok(region)
    }

    fn allocate(len: usize, zeroed: bool) -> TransportResult<Self> {
        if len == 0 {
            return Ok(Self {
                len,
                backing: Backing::Empty,
            });
        }

        #[cfg(not(target_arch = "wasm32"))]
        {
            if len >= MMAP_THRESHOLD {
                if let Some(map) = Self::mapped(len) {
                    return Ok(Self {
                        len,
                        backing: Backing::Mapped(map),
                    });
                }
                log::debug!("anonymous mapping of {len} bytes failed; using the heap");
            }
        }

        Self::heap_backed(len, zeroed)
    }

    fn heap_backed(len: usize, zeroed: bool) -> TransportResult<Self> {
        let layout = Layout::from_size_align(len, REGION_ALIGNMENT).map_err(|_| {
            TransportError::InvalidCapacity {
                requested: len,
                maximum: isize::MAX as usize - (REGION_ALIGNMENT - 1),
            }
        })?;

        let ptr = unsafe {
            // SAFETY: `layout` has a non-zero size; zero-length regions return early.
            if zeroed {
                alloc_zeroed(layout)
            } else {
                alloc(layout)
            }
        };

        let ptr = NonNull::new(ptr).ok_or(TransportError::AllocationFailed {
            size: len,
            alignment: REGION_ALIGNMENT,
        })?;
        Ok(Self {
            len,
            backing: Backing::Heap { ptr, layout },
        })
    }

    #[cfg(not(target_arch = "wasm32"))]
    fn mapped(len: usize) -> Option<NativeMap> {
        // Anonymous mappings are page aligned and zero filled by the OS.
        memmap2::MmapOptions::new().len(len).map_anon().ok()
    }

    /// Total number of bytes in the region.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true when the region has zero length.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// True when the region is served by an anonymous mapping.
    pub fn is_mapped(&self) -> bool {
        match self.backing {
            #[cfg(not(target_arch = "wasm32"))]
            Backing::Mapped(_) => true,
            _ => false,
        }
    }

    /// Start of the region; dangling (but well aligned) when empty.
    pub fn as_non_null(&self) -> NonNull<u8> {
        self.backing.as_ptr()
    }

    /// View the region as an immutable slice.
    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: the backing stays alive for `'self` and holds `len` bytes, all
        // of which were either zeroed or copied in at construction.
        unsafe { std::slice::from_raw_parts(self.as_non_null().as_ptr(), self.len) }
    }
}

impl fmt::Debug for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Region")
            .field("len", &self.len)
            .field("mapped", &self.is_mapped())
            .finish()
    }
}

impl Drop for Region {
    fn drop(&mut self) {
        if let Backing::Heap { ptr, layout } = &self.backing {
            unsafe {
                // SAFETY: `ptr` was returned by `alloc`/`alloc_zeroed` with `layout`.
                dealloc(ptr.as_ptr(), *layout);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copy_preserves_bytes_and_alignment() {
        let region = Region::copy_from_slice(b"native bytes").expect("region");
        assert_eq!(region.as_slice(), b"native bytes");
        assert_eq!(region.len(), 12);
        assert_eq!(region.as_non_null().as_ptr() as usize % REGION_ALIGNMENT, 0);
        assert!(!region.is_mapped());
    }

    #[test]
    fn empty_region_does_not_allocate() {
        let region = Region::copy_from_slice(&[]).expect("region");
        assert!(region.is_empty());
        assert!(region.as_slice().is_empty());
    }

    #[test]
    fn zeroed_region_is_zero_filled() {
        let region = Region::zeroed(257).expect("region");
        assert!(region.as_slice().iter().all(|b| *b == 0));
    }

    #[cfg(not(target_arch = "wasm32"))]
    #[test]
    fn large_regions_use_anonymous_mappings() {
        let payload = vec![0x5A; MMAP_THRESHOLD + 3];
        let region = Region::copy_from_slice(&payload).expect("region");
        assert!(region.is_mapped());
        assert_eq!(region.as_slice(), payload.as_slice());
    }

    #[test]
    fn oversized_request_is_rejected() {
        let err = Region::zeroed(usize::MAX).expect_err("layout overflow");
        assert!(matches!(err, TransportError::InvalidCapacity { .. }));
    }

    #[test]
    fn region_can_be_dropped_on_another_thread() {
        let region = Region::copy_from_slice(&[1, 2, 3]).expect("region");
        std::thread::spawn(move || drop(region))
            .join()
            .expect("drop thread");
    }
}
