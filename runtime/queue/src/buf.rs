//! Buffer ownership tokens

use core::fmt;
use core::ops::{Deref, DerefMut};

use duet_platform::SharedRegion;

/// A data buffer owned by the holder
///
/// Returned by `alloc_try` (master) and `recv_try` (remote) and consumed by
/// `send_try` / `free_try`, so a buffer can only be handed back once. The
/// token derefs to the `len` bytes it was allocated or received with.
pub struct QueueBuf<'a> {
    region: &'a SharedRegion,
    offset: u32,
    len: u16,
    capacity: u16,
}

impl<'a> QueueBuf<'a> {
    /// Caller has bounds-checked `[offset, offset + capacity)` and owns it
    pub(crate) fn new(region: &'a SharedRegion, offset: u32, len: u16, capacity: u16) -> Self {
        debug_assert!(len <= capacity);
        debug_assert!(region.check(offset, capacity as usize).is_ok());
        Self {
            region,
            offset,
            len,
            capacity,
        }
    }

    /// Offset of the buffer within the data pool, as written to descriptors
    pub fn offset(&self) -> u32 {
        self.offset
    }

    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Bytes the buffer can hold (the queue's item size)
    pub fn capacity(&self) -> usize {
        self.capacity as usize
    }
}

impl Deref for QueueBuf<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        // SAFETY: the range was validated at construction and the token
        // grants exclusive ownership of it.
        unsafe { core::slice::from_raw_parts(self.region.as_ptr().add(self.offset as usize), self.len()) }
    }
}

impl DerefMut for QueueBuf<'_> {
    fn deref_mut(&mut self) -> &mut [u8] {
        // SAFETY: as for `deref`; `&mut self` makes the borrow unique.
        unsafe {
            core::slice::from_raw_parts_mut(self.region.as_ptr().add(self.offset as usize), self.len())
        }
    }
}

impl fmt::Debug for QueueBuf<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueBuf")
            .field("offset", &self.offset)
            .field("len", &self.len)
            .field("capacity", &self.capacity)
            .finish()
    }
}
