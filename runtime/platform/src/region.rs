//! Shared-memory region handle
//!
//! A [`SharedRegion`] is the only way the stack touches memory that the
//! other core can see. Offsets are `u32` byte offsets from the region base,
//! which is exactly what gets written into shared descriptors, so both cores
//! resolve the same offset to the same byte regardless of where each maps
//! the pool.
//!
//! Field accesses go through relaxed atomics of the field's natural width.
//! Ordering between cores comes from [`crate::memory_barrier`], never from
//! the access itself, which keeps the protocol valid on cores that only
//! offer plain loads/stores plus a fence.

use core::fmt;
use core::mem::{align_of, size_of};
use core::ptr::NonNull;
use core::sync::atomic::{AtomicU16, AtomicU32, AtomicU8, Ordering};

#[cfg(feature = "alloc")]
use alloc::boxed::Box;
#[cfg(feature = "alloc")]
use core::cell::UnsafeCell;

/// Required alignment of a region base address
pub const REGION_ALIGN: usize = 8;

/// Region access errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RegionError {
    #[error("access [{offset:#x}, +{len}) outside region of {size} bytes")]
    OutOfBounds { offset: u32, len: usize, size: usize },

    #[error("region base {addr:#x} is not {align}-byte aligned")]
    Misaligned { addr: usize, align: usize },
}

pub type Result<T> = core::result::Result<T, RegionError>;

/// Handle over one shared-memory pool
///
/// On target the region wraps a fixed link-time address. On the host it owns
/// a zeroed arena with the same offset arithmetic, so tests exercise the
/// exact layout the firmware uses.
pub struct SharedRegion {
    base: NonNull<u8>,
    len: usize,
    #[cfg(feature = "alloc")]
    _arena: Option<Box<[UnsafeCell<u64>]>>,
}

// SAFETY: the region is memory shared between two cores by construction.
// All field accesses are atomic; bulk byte access is gated by the ownership
// protocol of the layers above (a buffer belongs to exactly one side).
unsafe impl Send for SharedRegion {}
unsafe impl Sync for SharedRegion {}

impl SharedRegion {
    /// Wrap an existing shared-memory pool
    ///
    /// # Safety
    /// `base` must point to `len` bytes of memory that stays valid and
    /// mapped for the lifetime of the handle, and that nothing outside the
    /// messaging stack writes to.
    ///
    /// # Errors
    /// Returns [`RegionError::Misaligned`] if `base` is null or not
    /// [`REGION_ALIGN`]-aligned, and [`RegionError::OutOfBounds`] if `len`
    /// cannot be addressed by a 32-bit offset.
    pub unsafe fn from_raw_parts(base: *mut u8, len: usize) -> Result<Self> {
        let addr = base as usize;
        let base = NonNull::new(base).ok_or(RegionError::Misaligned {
            addr,
            align: REGION_ALIGN,
        })?;
        if addr % REGION_ALIGN != 0 {
            return Err(RegionError::Misaligned {
                addr,
                align: REGION_ALIGN,
            });
        }
        if len > u32::MAX as usize {
            return Err(RegionError::OutOfBounds {
                offset: 0,
                len,
                size: u32::MAX as usize,
            });
        }

        Ok(Self {
            base,
            len,
            #[cfg(feature = "alloc")]
            _arena: None,
        })
    }

    /// Allocate a zeroed host arena of `len` bytes
    ///
    /// `len` is clamped to the 32-bit offset domain.
    #[cfg(feature = "alloc")]
    pub fn arena(len: usize) -> Self {
        let len = len.min(u32::MAX as usize);
        let words = len.div_ceil(size_of::<u64>());
        let arena: Box<[UnsafeCell<u64>]> = (0..words).map(|_| UnsafeCell::new(0)).collect();
        let base = NonNull::from(&*arena).cast::<u8>();

        Self {
            base,
            len,
            _arena: Some(arena),
        }
    }

    /// Size of the region in bytes
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Base address, for diagnostics and handing to firmware loaders
    pub fn as_ptr(&self) -> *mut u8 {
        self.base.as_ptr()
    }

    /// Verify that `[offset, offset + len)` lies inside the region
    pub fn check(&self, offset: u32, len: usize) -> Result<()> {
        let end = (offset as usize).checked_add(len);
        match end {
            Some(end) if end <= self.len => Ok(()),
            _ => Err(RegionError::OutOfBounds {
                offset,
                len,
                size: self.len,
            }),
        }
    }

    pub fn load_u8(&self, offset: u32) -> u8 {
        self.field::<AtomicU8>(offset).load(Ordering::Relaxed)
    }

    pub fn store_u8(&self, offset: u32, value: u8) {
        self.field::<AtomicU8>(offset).store(value, Ordering::Relaxed)
    }

    pub fn load_u16(&self, offset: u32) -> u16 {
        self.field::<AtomicU16>(offset).load(Ordering::Relaxed)
    }

    pub fn store_u16(&self, offset: u32, value: u16) {
        self.field::<AtomicU16>(offset).store(value, Ordering::Relaxed)
    }

    pub fn load_u32(&self, offset: u32) -> u32 {
        self.field::<AtomicU32>(offset).load(Ordering::Relaxed)
    }

    pub fn store_u32(&self, offset: u32, value: u32) {
        self.field::<AtomicU32>(offset).store(value, Ordering::Relaxed)
    }

    /// Copy bytes out of the region
    pub fn read_bytes(&self, offset: u32, dst: &mut [u8]) -> Result<()> {
        self.check(offset, dst.len())?;
        // SAFETY: bounds checked above; caller owns the range by protocol.
        unsafe {
            core::ptr::copy_nonoverlapping(self.ptr_at(offset), dst.as_mut_ptr(), dst.len());
        }
        Ok(())
    }

    /// Copy bytes into the region
    pub fn write_bytes(&self, offset: u32, src: &[u8]) -> Result<()> {
        self.check(offset, src.len())?;
        // SAFETY: bounds checked above; caller owns the range by protocol.
        unsafe {
            core::ptr::copy_nonoverlapping(src.as_ptr(), self.ptr_at(offset), src.len());
        }
        Ok(())
    }

    /// Fill `[offset, offset + len)` with `byte`
    pub fn fill(&self, offset: u32, len: usize, byte: u8) -> Result<()> {
        self.check(offset, len)?;
        // SAFETY: bounds checked above.
        unsafe {
            core::ptr::write_bytes(self.ptr_at(offset), byte, len);
        }
        Ok(())
    }

    fn ptr_at(&self, offset: u32) -> *mut u8 {
        // SAFETY: callers bounds-check `offset` first.
        unsafe { self.base.as_ptr().add(offset as usize) }
    }

    fn field<T>(&self, offset: u32) -> &T {
        let in_bounds = self.check(offset, size_of::<T>()).is_ok();
        assert!(
            in_bounds && offset as usize % align_of::<T>() == 0,
            "shared field at {:#x} (width {}) invalid for region of {} bytes",
            offset,
            size_of::<T>(),
            self.len
        );
        // SAFETY: in bounds and aligned (base is REGION_ALIGN-aligned);
        // atomics have the same in-memory representation as the integer.
        unsafe { &*(self.ptr_at(offset) as *const T) }
    }
}

impl fmt::Debug for SharedRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedRegion")
            .field("base", &self.base)
            .field("len", &self.len)
            .finish()
    }
}
