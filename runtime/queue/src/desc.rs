//! Shared layout of the queue configuration block and descriptors

use bitflags::bitflags;
use static_assertions::const_assert_eq;

/// Bytes per descriptor
pub const DESC_SIZE: u32 = 8;

pub(crate) const DESC_ADDR: u32 = 0;
pub(crate) const DESC_LEN: u32 = 4;
pub(crate) const DESC_FLAGS: u32 = 6;

const_assert_eq!(DESC_FLAGS + 2, DESC_SIZE);

/// Bytes of the configuration block at the head of the HP allocation
pub const CONF_SIZE: u32 = 16;

pub(crate) const CONF_LEN: u32 = 0;
pub(crate) const CONF_ITEM_SIZE: u32 = 2;
pub(crate) const CONF_DESC_OFFSET: u32 = 4;
pub(crate) const CONF_DATA_OFFSET: u32 = 8;
pub(crate) const CONF_DESC_POOL: u32 = 12;

const_assert_eq!(CONF_DESC_POOL + 4, CONF_SIZE);

bitflags! {
    /// Descriptor flag bits
    ///
    /// Neither bit means anything alone. A slot's state is the relation of
    /// both bits to the flip counter of the traversal that reads it:
    ///
    /// | state     | AVAILABLE | USED     | set by                 |
    /// |-----------|-----------|----------|------------------------|
    /// | used      | `!flip`   | `!flip`  | init, remote `free_try`|
    /// | available | `flip`    | `!flip`  | master `send_try`      |
    ///
    /// Each publish XORs exactly one bit, and the flip counter toggles once
    /// per lap, so the relation from the previous lap can never be mistaken
    /// for the current one.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DescFlags: u16 {
        const AVAILABLE = 1 << 0;
        const USED = 1 << 1;
    }
}

impl DescFlags {
    /// Slot holds a free buffer the master may allocate or refill
    pub fn is_used(self, flip: bool) -> bool {
        self.contains(DescFlags::AVAILABLE) != flip && self.contains(DescFlags::USED) != flip
    }

    /// Slot holds a filled buffer the remote may receive or release
    pub fn is_available(self, flip: bool) -> bool {
        self.contains(DescFlags::AVAILABLE) == flip && self.contains(DescFlags::USED) != flip
    }
}
