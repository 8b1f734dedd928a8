//! Skip-light-sleep counter
//!
//! A 16-bit counter in the retention pool under [`reserved::PM`]. The sub
//! core bumps it around every access to the HP pool; the main core's sleep
//! path refuses to enter light sleep while it is non-zero. Only the sub core
//! writes the counter, so masking its local interrupts is enough to keep the
//! read-modify-write whole.
//!
//! The 0 → 1 transition also raises the wake notification, which pulls the
//! main core out of a light sleep it entered just before the count moved.

use duet_platform::{critical, memory_barrier, InterruptMask, Notify, SharedRegion, SleepGuard};

use crate::{reserved, Pool, Result, SysInfo};

const COUNTER_SIZE: u16 = 2;

/// Main-core view: decides whether light sleep must be skipped
#[derive(Debug)]
pub struct SleepMonitor<'a> {
    region: &'a SharedRegion,
    offset: u32,
}

impl<'a> SleepMonitor<'a> {
    /// Allocate and clear the counter
    pub fn main_init(sysinfo: &SysInfo<'a>) -> Result<Self> {
        let entry = sysinfo.alloc(reserved::PM, COUNTER_SIZE, Pool::Rtc)?;
        let region = sysinfo.region(Pool::Rtc)?;
        region.store_u16(entry.offset, 0);
        memory_barrier();
        log::info!("pm: skip-sleep counter at rtc+{:#x}", entry.offset);
        Ok(Self {
            region,
            offset: entry.offset,
        })
    }

    /// Number of sub-core accesses currently in flight
    pub fn count(&self) -> u16 {
        memory_barrier();
        self.region.load_u16(self.offset)
    }

    /// Sleep hook: `true` while the sub core is inside an HP access
    pub fn should_skip_sleep(&self) -> bool {
        self.count() > 0
    }
}

/// Sub-core view: the [`SleepGuard`] handed to queues
pub struct SkipSleepGuard<'a> {
    region: &'a SharedRegion,
    offset: u32,
    mask: &'a dyn InterruptMask,
    wake: &'a dyn Notify,
}

impl<'a> SkipSleepGuard<'a> {
    /// Find the counter the main core allocated
    pub fn sub_init(
        sysinfo: &SysInfo<'a>,
        mask: &'a dyn InterruptMask,
        wake: &'a dyn Notify,
    ) -> Result<Self> {
        let entry = sysinfo.get(reserved::PM, Pool::Rtc)?;
        Ok(Self {
            region: sysinfo.region(Pool::Rtc)?,
            offset: entry.offset,
            mask,
            wake,
        })
    }

    pub fn count(&self) -> u16 {
        self.region.load_u16(self.offset)
    }
}

impl SleepGuard for SkipSleepGuard<'_> {
    fn enter(&self) {
        let first = critical(self.mask, || {
            let count = self.region.load_u16(self.offset);
            self.region.store_u16(self.offset, count.saturating_add(1));
            count == 0
        });
        memory_barrier();
        if first {
            self.wake.notify();
        }
    }

    fn exit(&self) {
        critical(self.mask, || {
            let count = self.region.load_u16(self.offset);
            if count == 0 {
                log::error!("pm: skip-sleep counter underflow");
            } else {
                self.region.store_u16(self.offset, count - 1);
            }
        });
        memory_barrier();
    }
}
