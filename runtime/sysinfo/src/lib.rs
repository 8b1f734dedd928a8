//! # Sys-Info Store
//!
//! Named, discoverable sub-regions of the shared-memory pools.
//!
//! # Purpose
//! The main core carves each pool into entries keyed by a 16-bit ID. The
//! sub core never allocates; it finds the same entries by ID with [`SysInfo::get`],
//! in whatever order the two cores happen to boot.
//!
//! # Integration Points
//! - Depends on: `duet-platform` (shared regions, barrier)
//! - Provides to: `duet-queue` (queue placement), `duet-rpmsg` (vqueue IDs)
//!
//! # Architecture
//! Each pool starts with a sentinel header and grows as an append-only,
//! singly linked list of `{ id: u16, size: u16, next: u32 }` headers, each
//! followed by its payload rounded up to a 4-byte word:
//!
//! ```text
//! +----------+----------+---------+----------+---------+---
//! | sentinel | header A | data A  | header B | data B  | ...
//! +----------+----------+---------+----------+---------+---
//!     next ------^          next ----^
//! ```
//!
//! Entries are never removed or resized. A new entry's fields are written
//! and fenced before the link that publishes it, so a concurrent `get` on
//! the other core sees either the old tail or a complete entry.
//!
//! # Testing Strategy
//! - Unit tests: allocation placement, duplicates, exhaustion, discovery
//! - Integration tests: main/sub discovery across threads

#![no_std]

#[cfg(test)]
extern crate std;

pub mod pm;

pub use pm::{SkipSleepGuard, SleepMonitor};

use duet_platform::{memory_barrier, RegionError, SharedRegion};
use static_assertions::const_assert_eq;

/// Size of an entry header in bytes
pub const HEADER_SIZE: u32 = 8;

/// Payloads are rounded up to this many bytes
pub const WORD_SIZE: u32 = 4;

const ID_OFFSET: u32 = 0;
const SIZE_OFFSET: u32 = 2;
const NEXT_OFFSET: u32 = 4;

const_assert_eq!(NEXT_OFFSET + 4, HEADER_SIZE);
const_assert_eq!(HEADER_SIZE % WORD_SIZE, 0);

/// IDs reserved by the stack itself
pub mod reserved {
    /// Sentinel entry at the head of every pool
    pub const SENTINEL: u16 = 0xFFFF;
    /// Main → sub virtqueue of the endpoint transport
    pub const VQUEUE_MAIN: u16 = 0xFF00;
    /// Sub → main virtqueue of the endpoint transport
    pub const VQUEUE_SUB: u16 = 0xFF01;
    /// Skip-light-sleep counter
    pub const PM: u16 = 0xFF02;

    /// First ID of the reserved range
    pub const FIRST: u16 = 0xFF00;

    pub const fn is_reserved(id: u16) -> bool {
        id >= FIRST
    }
}

/// Shared-memory pool selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Pool {
    /// Plain pool, unclocked while the main core is in light sleep
    Hp = 0,
    /// Retention pool, reachable by the sub core at all times
    Rtc = 1,
}

impl Pool {
    pub fn from_raw(raw: u16) -> Option<Self> {
        match raw {
            0 => Some(Pool::Hp),
            1 => Some(Pool::Rtc),
            _ => None,
        }
    }
}

/// Sys-info store errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SysInfoError {
    #[error("no space in {pool:?} pool for {requested} bytes")]
    NoSpace { pool: Pool, requested: u16 },

    #[error("id {id:#06x} already allocated in {pool:?} pool")]
    AlreadyExists { pool: Pool, id: u16 },

    #[error("id {id:#06x} not found in {pool:?} pool")]
    NotFound { pool: Pool, id: u16 },

    #[error("{0:?} pool not provided")]
    PoolUnavailable(Pool),

    #[error("{0:?} pool not initialized")]
    Uninitialized(Pool),

    #[error("{pool:?} pool list corrupted at {offset:#x}")]
    Corrupted { pool: Pool, offset: u32 },

    #[error("region error: {0}")]
    Region(#[from] RegionError),
}

impl SysInfoError {
    /// Whether retrying later can succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, SysInfoError::NotFound { .. })
    }
}

pub type Result<T> = core::result::Result<T, SysInfoError>;

/// A published entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Allocation {
    pub id: u16,
    pub pool: Pool,
    /// Offset of the payload (just past the header) within the pool region
    pub offset: u32,
    /// Requested payload size
    pub size: u16,
}

/// Handle over the pools of one core pair
#[derive(Debug, Clone, Copy)]
pub struct SysInfo<'a> {
    hp: &'a SharedRegion,
    rtc: Option<&'a SharedRegion>,
}

impl<'a> SysInfo<'a> {
    /// Build a store over the HP pool and, on retention-capable parts, the
    /// RTC pool
    pub fn new(hp: &'a SharedRegion, rtc: Option<&'a SharedRegion>) -> Self {
        Self { hp, rtc }
    }

    /// Region backing `pool`
    pub fn region(&self, pool: Pool) -> Result<&'a SharedRegion> {
        match pool {
            Pool::Hp => Ok(self.hp),
            Pool::Rtc => self.rtc.ok_or(SysInfoError::PoolUnavailable(Pool::Rtc)),
        }
    }

    pub fn has_pool(&self, pool: Pool) -> bool {
        self.region(pool).is_ok()
    }

    /// Reset `pool` to an empty list
    ///
    /// Main core only, once, before any [`alloc`](Self::alloc).
    pub fn init(&self, pool: Pool) -> Result<()> {
        let region = self.region(pool)?;
        region.check(0, HEADER_SIZE as usize)?;
        region.store_u16(ID_OFFSET, reserved::SENTINEL);
        region.store_u16(SIZE_OFFSET, 0);
        region.store_u32(NEXT_OFFSET, 0);
        memory_barrier();
        log::debug!("sysinfo: {:?} pool initialized ({} bytes)", pool, region.len());
        Ok(())
    }

    /// Initialize every pool this store was built with
    pub fn init_all(&self) -> Result<()> {
        self.init(Pool::Hp)?;
        if self.has_pool(Pool::Rtc) {
            self.init(Pool::Rtc)?;
        }
        Ok(())
    }

    /// Append an entry of `size` bytes under `id`
    ///
    /// Main core only.
    ///
    /// # Errors
    /// - [`SysInfoError::AlreadyExists`] if `id` is taken (the sentinel ID
    ///   always is)
    /// - [`SysInfoError::NoSpace`] if the entry would pass the pool end
    pub fn alloc(&self, id: u16, size: u16, pool: Pool) -> Result<Allocation> {
        let region = self.region(pool)?;
        if !is_initialized(region) {
            return Err(SysInfoError::Uninitialized(pool));
        }
        if id == reserved::SENTINEL {
            return Err(SysInfoError::AlreadyExists { pool, id });
        }

        let mut tail = 0;
        let mut walker = Walker::new(region, pool);
        while let Some(entry) = walker.next_entry()? {
            if entry.id == id {
                return Err(SysInfoError::AlreadyExists { pool, id });
            }
            tail = entry.header;
        }

        let tail_size = region.load_u16(tail + SIZE_OFFSET);
        let start = tail as u64 + HEADER_SIZE as u64 + word_align(tail_size) as u64;
        let end = start + HEADER_SIZE as u64 + word_align(size) as u64;
        if end > region.len() as u64 {
            log::warn!(
                "sysinfo: {:?} pool exhausted allocating id {:#06x} ({} bytes)",
                pool,
                id,
                size
            );
            return Err(SysInfoError::NoSpace {
                pool,
                requested: size,
            });
        }
        let start = start as u32;

        region.store_u16(start + ID_OFFSET, id);
        region.store_u16(start + SIZE_OFFSET, size);
        region.store_u32(start + NEXT_OFFSET, 0);
        memory_barrier();
        region.store_u32(tail + NEXT_OFFSET, start);
        memory_barrier();

        log::debug!(
            "sysinfo: alloc id {:#06x} in {:?} pool at {:#x} ({} bytes)",
            id,
            pool,
            start + HEADER_SIZE,
            size
        );
        Ok(Allocation {
            id,
            pool,
            offset: start + HEADER_SIZE,
            size,
        })
    }

    /// Find the entry published under `id`
    ///
    /// Either core. Returns the same payload offset the `alloc` for `id`
    /// returned. An uninitialized pool reports `NotFound`, so the sub core
    /// can simply retry until the main core has provisioned it.
    pub fn get(&self, id: u16, pool: Pool) -> Result<Allocation> {
        let region = self.region(pool)?;
        if is_initialized(region) {
            let mut walker = Walker::new(region, pool);
            while let Some(entry) = walker.next_entry()? {
                if entry.id == id {
                    return Ok(entry.allocation(pool));
                }
            }
        }
        log::trace!("sysinfo: id {:#06x} not found in {:?} pool", id, pool);
        Err(SysInfoError::NotFound { pool, id })
    }

    /// Iterate the published entries of `pool` in allocation order
    pub fn entries(&self, pool: Pool) -> Result<Entries<'a>> {
        let region = self.region(pool)?;
        let walker = if is_initialized(region) {
            Some(Walker::new(region, pool))
        } else {
            None
        };
        Ok(Entries { pool, walker })
    }

    /// Log every entry of every pool
    pub fn dump(&self) {
        for pool in [Pool::Hp, Pool::Rtc] {
            let Ok(entries) = self.entries(pool) else {
                continue;
            };
            log::info!("sysinfo: {:?} pool", pool);
            for entry in entries {
                match entry {
                    Ok(a) => log::info!(
                        "  id {:#06x} offset {:#x} size {}",
                        a.id,
                        a.offset,
                        a.size
                    ),
                    Err(e) => {
                        log::error!("  {}", e);
                        break;
                    }
                }
            }
        }
    }
}

/// Iterator over the entries of one pool
pub struct Entries<'a> {
    pool: Pool,
    walker: Option<Walker<'a>>,
}

impl Iterator for Entries<'_> {
    type Item = Result<Allocation>;

    fn next(&mut self) -> Option<Self::Item> {
        let walker = self.walker.as_mut()?;
        match walker.next_entry() {
            Ok(Some(entry)) => Some(Ok(entry.allocation(self.pool))),
            Ok(None) => {
                self.walker = None;
                None
            }
            Err(e) => {
                self.walker = None;
                Some(Err(e))
            }
        }
    }
}

/// Round `size` up to a whole number of words
pub const fn word_align(size: u16) -> u32 {
    (size as u32).div_ceil(WORD_SIZE) * WORD_SIZE
}

fn is_initialized(region: &SharedRegion) -> bool {
    region.check(0, HEADER_SIZE as usize).is_ok() && region.load_u16(ID_OFFSET) == reserved::SENTINEL
}

#[derive(Debug, Clone, Copy)]
struct RawEntry {
    header: u32,
    id: u16,
    size: u16,
}

impl RawEntry {
    fn allocation(self, pool: Pool) -> Allocation {
        Allocation {
            id: self.id,
            pool,
            offset: self.header + HEADER_SIZE,
            size: self.size,
        }
    }
}

/// Follows `next` links past the sentinel, validating each hop
struct Walker<'a> {
    region: &'a SharedRegion,
    pool: Pool,
    cursor: u32,
}

impl<'a> Walker<'a> {
    fn new(region: &'a SharedRegion, pool: Pool) -> Self {
        Self {
            region,
            pool,
            cursor: 0,
        }
    }

    fn next_entry(&mut self) -> Result<Option<RawEntry>> {
        let next = self.region.load_u32(self.cursor + NEXT_OFFSET);
        if next == 0 {
            return Ok(None);
        }
        // Links only ever point forward to a full, word-aligned header
        if next <= self.cursor
            || next % WORD_SIZE != 0
            || self.region.check(next, HEADER_SIZE as usize).is_err()
        {
            return Err(SysInfoError::Corrupted {
                pool: self.pool,
                offset: self.cursor,
            });
        }
        memory_barrier();

        self.cursor = next;
        Ok(Some(RawEntry {
            header: next,
            id: self.region.load_u16(next + ID_OFFSET),
            size: self.region.load_u16(next + SIZE_OFFSET),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::vec::Vec;

    fn store(len: usize) -> (SharedRegion, SharedRegion) {
        (SharedRegion::arena(len), SharedRegion::arena(len))
    }

    #[test]
    fn test_alloc_places_entries_after_sentinel() {
        let (hp, _) = store(256);
        let sysinfo = SysInfo::new(&hp, None);
        sysinfo.init(Pool::Hp).unwrap();

        let a = sysinfo.alloc(1, 10, Pool::Hp).unwrap();
        assert_eq!(a.offset, HEADER_SIZE * 2);
        assert_eq!(a.size, 10);

        // 10 bytes round up to 12 before the next header
        let b = sysinfo.alloc(2, 4, Pool::Hp).unwrap();
        assert_eq!(b.offset, a.offset + 12 + HEADER_SIZE);
        assert_eq!(b.offset % WORD_SIZE, 0);
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let (hp, _) = store(256);
        let sysinfo = SysInfo::new(&hp, None);
        sysinfo.init(Pool::Hp).unwrap();

        sysinfo.alloc(5, 16, Pool::Hp).unwrap();
        assert_eq!(
            sysinfo.alloc(5, 16, Pool::Hp),
            Err(SysInfoError::AlreadyExists { pool: Pool::Hp, id: 5 })
        );
        assert!(matches!(
            sysinfo.alloc(reserved::SENTINEL, 4, Pool::Hp),
            Err(SysInfoError::AlreadyExists { .. })
        ));
    }

    #[test]
    fn test_get_is_stable_across_later_allocs() {
        let (hp, _) = store(256);
        let sysinfo = SysInfo::new(&hp, None);
        sysinfo.init(Pool::Hp).unwrap();

        let first = sysinfo.alloc(5, 20, Pool::Hp).unwrap();
        let before = sysinfo.get(5, Pool::Hp).unwrap();
        sysinfo.alloc(6, 8, Pool::Hp).unwrap();
        sysinfo.alloc(7, 1, Pool::Hp).unwrap();
        let after = sysinfo.get(5, Pool::Hp).unwrap();

        assert_eq!(first, before);
        assert_eq!(before, after);
    }

    #[test]
    fn test_get_missing_and_uninitialized() {
        let (hp, _) = store(64);
        let sysinfo = SysInfo::new(&hp, None);
        let err = sysinfo.get(3, Pool::Hp).unwrap_err();
        assert!(err.is_transient());
        assert_eq!(sysinfo.alloc(3, 4, Pool::Hp), Err(SysInfoError::Uninitialized(Pool::Hp)));

        sysinfo.init(Pool::Hp).unwrap();
        assert_eq!(
            sysinfo.get(3, Pool::Hp),
            Err(SysInfoError::NotFound { pool: Pool::Hp, id: 3 })
        );
    }

    #[test]
    fn test_pool_exhaustion() {
        let (hp, _) = store(64);
        let sysinfo = SysInfo::new(&hp, None);
        sysinfo.init(Pool::Hp).unwrap();

        // sentinel(8) + header(8) + 48 = 64 exactly fills the pool
        sysinfo.alloc(1, 48, Pool::Hp).unwrap();
        assert_eq!(
            sysinfo.alloc(2, 0, Pool::Hp),
            Err(SysInfoError::NoSpace { pool: Pool::Hp, requested: 0 })
        );
        assert!(sysinfo.get(2, Pool::Hp).is_err());
    }

    #[test]
    fn test_exhaustion_counts_rounded_size() {
        let (hp, _) = store(64);
        let sysinfo = SysInfo::new(&hp, None);
        sysinfo.init(Pool::Hp).unwrap();

        // 45 rounds to 48 and still fits; 49 rounds to 52 and does not
        assert!(sysinfo.alloc(1, 49, Pool::Hp).is_err());
        assert!(sysinfo.alloc(1, 45, Pool::Hp).is_ok());
    }

    #[test]
    fn test_pools_are_independent() {
        let (hp, rtc) = store(128);
        let sysinfo = SysInfo::new(&hp, Some(&rtc));
        sysinfo.init_all().unwrap();

        let in_hp = sysinfo.alloc(9, 8, Pool::Hp).unwrap();
        let in_rtc = sysinfo.alloc(9, 8, Pool::Rtc).unwrap();
        assert_eq!(in_hp.offset, in_rtc.offset);
        assert_eq!(in_rtc.pool, Pool::Rtc);
        assert!(sysinfo.get(10, Pool::Rtc).is_err());
    }

    #[test]
    fn test_missing_rtc_pool() {
        let (hp, _) = store(64);
        let sysinfo = SysInfo::new(&hp, None);
        sysinfo.init_all().unwrap();
        assert_eq!(
            sysinfo.alloc(1, 4, Pool::Rtc),
            Err(SysInfoError::PoolUnavailable(Pool::Rtc))
        );
    }

    #[test]
    fn test_entries_in_allocation_order() {
        let (hp, _) = store(256);
        let sysinfo = SysInfo::new(&hp, None);
        sysinfo.init(Pool::Hp).unwrap();
        for id in [30, 10, 20] {
            sysinfo.alloc(id, id, Pool::Hp).unwrap();
        }

        let ids: Vec<u16> = sysinfo
            .entries(Pool::Hp)
            .unwrap()
            .map(|e| e.unwrap().id)
            .collect();
        assert_eq!(ids, [30, 10, 20]);
        sysinfo.dump();
    }

    #[test]
    fn test_corrupted_link_detected() {
        let (hp, _) = store(64);
        let sysinfo = SysInfo::new(&hp, None);
        sysinfo.init(Pool::Hp).unwrap();
        let a = sysinfo.alloc(1, 4, Pool::Hp).unwrap();

        // Point the entry back at the sentinel
        hp.store_u32(a.offset - HEADER_SIZE + NEXT_OFFSET, 0x4);
        assert!(matches!(
            sysinfo.get(2, Pool::Hp),
            Err(SysInfoError::Corrupted { pool: Pool::Hp, .. })
        ));
    }

    #[test]
    fn test_reinit_forgets_entries() {
        let (hp, _) = store(64);
        let sysinfo = SysInfo::new(&hp, None);
        sysinfo.init(Pool::Hp).unwrap();
        sysinfo.alloc(1, 4, Pool::Hp).unwrap();
        sysinfo.init(Pool::Hp).unwrap();
        assert!(sysinfo.get(1, Pool::Hp).is_err());
        assert!(sysinfo.alloc(1, 4, Pool::Hp).is_ok());
    }

    #[test]
    fn test_word_align() {
        assert_eq!(word_align(0), 0);
        assert_eq!(word_align(1), 4);
        assert_eq!(word_align(4), 4);
        assert_eq!(word_align(u16::MAX), 65536);
    }
}
