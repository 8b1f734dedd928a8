//! Ring state and the four try operations

use core::fmt;

use duet_platform::{memory_barrier, NoSleepGuard, Notify, SharedRegion, SleepGuard, SwIntrHandlers, SwIntrId};
use duet_sysinfo::{Pool, SysInfo, SysInfoError};

use crate::buf::QueueBuf;
use crate::desc::*;
use crate::{aligned_size, power_len, QueueConfig, QueueError, Result, Role};

/// Side-effect hooks of one queue end
#[derive(Clone, Copy)]
pub struct QueueHooks<'a> {
    notify: Option<&'a dyn Notify>,
    pm: &'a dyn SleepGuard,
}

impl Default for QueueHooks<'_> {
    fn default() -> Self {
        Self {
            notify: None,
            pm: &NoSleepGuard,
        }
    }
}

impl<'a> QueueHooks<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called by the master after every successful `send_try`
    pub fn notify(mut self, notify: &'a dyn Notify) -> Self {
        self.notify = Some(notify);
        self
    }

    /// Bracket for accesses the main core must stay awake for
    pub fn sleep_guard(mut self, pm: &'a dyn SleepGuard) -> Self {
        self.pm = pm;
        self
    }

    /// Same sleep guard, no notify (for the receiving end of a pair)
    pub fn without_notify(mut self) -> Self {
        self.notify = None;
        self
    }
}

/// Where a queue's descriptors and buffers live
#[derive(Debug, Clone, Copy)]
pub struct QueueLayout<'a> {
    pub desc: &'a SharedRegion,
    pub desc_offset: u32,
    pub data: &'a SharedRegion,
    pub data_offset: u32,
    /// Descriptor count, a power of two
    pub len: u16,
    /// Bytes per buffer, a multiple of 4
    pub item_size: u16,
}

impl QueueLayout<'_> {
    fn validate(&self) -> Result<()> {
        if self.len == 0 || !self.len.is_power_of_two() {
            return Err(QueueError::InvalidArg("queue length must be a power of two"));
        }
        if self.item_size == 0 || self.item_size % 4 != 0 {
            return Err(QueueError::InvalidArg("item size must be a non-zero word multiple"));
        }
        if self.desc_offset % 4 != 0 || self.data_offset % 4 != 0 {
            return Err(QueueError::InvalidArg("queue memory must be word aligned"));
        }
        let desc_bytes = self.len as usize * DESC_SIZE as usize;
        let data_bytes = self.len as usize * self.item_size as usize;
        if self.desc.check(self.desc_offset, desc_bytes).is_err()
            || self.data.check(self.data_offset, data_bytes).is_err()
        {
            return Err(QueueError::InvalidArg("queue memory outside its pool"));
        }
        Ok(())
    }
}

/// One end of a descriptor ring
pub struct Queue<'a> {
    desc: &'a SharedRegion,
    desc_offset: u32,
    data: &'a SharedRegion,
    data_offset: u32,
    size: u16,
    max_item_size: u16,
    free_index: u16,
    used_index: u16,
    free_flip: bool,
    used_flip: bool,
    role: Role,
    notify: Option<&'a dyn Notify>,
    pm: &'a dyn SleepGuard,
}

impl<'a> Queue<'a> {
    /// Point every descriptor at its home buffer and mark it free
    ///
    /// Main core, once, before either side calls [`create`](Self::create).
    pub fn init_buffer(layout: &QueueLayout<'a>, pm: &dyn SleepGuard) -> Result<()> {
        layout.validate()?;
        pm.enter();
        for i in 0..layout.len as u32 {
            let desc = layout.desc_offset + i * DESC_SIZE;
            layout
                .desc
                .store_u32(desc + DESC_ADDR, layout.data_offset + i * layout.item_size as u32);
            layout.desc.store_u16(desc + DESC_LEN, layout.item_size);
            layout.desc.store_u16(desc + DESC_FLAGS, DescFlags::empty().bits());
        }
        memory_barrier();
        pm.exit();
        Ok(())
    }

    /// Attach to an initialized ring as `role`
    pub fn create(layout: &QueueLayout<'a>, role: Role, hooks: QueueHooks<'a>) -> Result<Self> {
        layout.validate()?;
        hooks.pm.enter();
        let queue = Self {
            desc: layout.desc,
            desc_offset: layout.desc_offset,
            data: layout.data,
            data_offset: layout.data_offset,
            size: layout.len,
            max_item_size: layout.item_size,
            free_index: 0,
            used_index: 0,
            free_flip: true,
            used_flip: true,
            role,
            notify: hooks.notify,
            pm: hooks.pm,
        };
        hooks.pm.exit();
        Ok(queue)
    }

    /// Allocate, lay out and publish a queue under `cfg.sysinfo_id`
    ///
    /// Main core. `cfg.len` is rounded up to a power of two and
    /// `cfg.item_size` to a word.
    ///
    /// # Errors
    /// - [`QueueError::InvalidArg`] if either parameter rounds to zero, the
    ///   queue does not fit a single sys-info entry, or descriptors are
    ///   placed in [`Pool::Rtc`] for a queue the main core does not master
    /// - [`QueueError::SysInfo`] if the pool is full or the ID is taken
    pub fn main_init(sysinfo: &SysInfo<'a>, cfg: &QueueConfig, hooks: QueueHooks<'a>) -> Result<Self> {
        let len = power_len(cfg.len);
        let item_size = aligned_size(cfg.item_size);
        if len == 0 || item_size == 0 {
            return Err(QueueError::InvalidArg("queue length and item size must be non-zero"));
        }
        if cfg.desc_pool == Pool::Rtc && cfg.role != Role::Master {
            return Err(QueueError::InvalidArg("retention pool descriptors need a master main core"));
        }

        let desc_bytes = len as u32 * DESC_SIZE;
        let data_bytes = len as u32 * item_size as u32;
        let hp = sysinfo.region(Pool::Hp)?;

        let (desc, desc_offset, conf, data_offset) = match cfg.desc_pool {
            Pool::Hp => {
                let size = entry_size(CONF_SIZE + desc_bytes + data_bytes)?;
                let entry = sysinfo.alloc(cfg.sysinfo_id, size, Pool::Hp)?;
                let conf = entry.offset;
                (hp, conf + CONF_SIZE, conf, conf + CONF_SIZE + desc_bytes)
            }
            Pool::Rtc => {
                let size = entry_size(CONF_SIZE + data_bytes)?;
                let entry = sysinfo.alloc(cfg.sysinfo_id, size, Pool::Hp)?;
                let descs = sysinfo.alloc(cfg.sysinfo_id, entry_size(desc_bytes)?, Pool::Rtc)?;
                let rtc = sysinfo.region(Pool::Rtc)?;
                (rtc, descs.offset, entry.offset, entry.offset + CONF_SIZE)
            }
        };

        let layout = QueueLayout {
            desc,
            desc_offset,
            data: hp,
            data_offset,
            len,
            item_size,
        };
        Self::init_buffer(&layout, hooks.pm)?;

        // `len` goes last: the sub core treats a zero length as "not ready"
        hp.store_u16(conf + CONF_ITEM_SIZE, item_size);
        hp.store_u32(conf + CONF_DESC_OFFSET, desc_offset);
        hp.store_u32(conf + CONF_DATA_OFFSET, data_offset);
        hp.store_u16(conf + CONF_DESC_POOL, cfg.desc_pool as u16);
        memory_barrier();
        hp.store_u16(conf + CONF_LEN, len);
        memory_barrier();

        log::info!(
            "queue {:#06x}: {} x {} bytes, main core is {:?}, descriptors in {:?}",
            cfg.sysinfo_id,
            len,
            item_size,
            cfg.role,
            cfg.desc_pool
        );
        Self::create(&layout, cfg.role, hooks)
    }

    /// Attach to the queue the main core published under `sysinfo_id`
    ///
    /// # Errors
    /// [`QueueError::NotFound`] until the main core has finished
    /// [`main_init`](Self::main_init); retry later.
    pub fn sub_init(sysinfo: &SysInfo<'a>, sysinfo_id: u16, role: Role, hooks: QueueHooks<'a>) -> Result<Self> {
        let entry = sysinfo.get(sysinfo_id, Pool::Hp).map_err(|e| match e {
            SysInfoError::NotFound { .. } => QueueError::NotFound,
            other => QueueError::SysInfo(other),
        })?;
        let hp = sysinfo.region(Pool::Hp)?;
        let conf = entry.offset;
        if hp.check(conf, CONF_SIZE as usize).is_err() {
            return Err(QueueError::InvalidArg("queue configuration outside its pool"));
        }

        let len = hp.load_u16(conf + CONF_LEN);
        if len == 0 {
            return Err(QueueError::NotFound);
        }
        memory_barrier();

        let desc_pool = Pool::from_raw(hp.load_u16(conf + CONF_DESC_POOL))
            .ok_or(QueueError::InvalidArg("unknown descriptor pool"))?;
        let layout = QueueLayout {
            desc: sysinfo.region(desc_pool)?,
            desc_offset: hp.load_u32(conf + CONF_DESC_OFFSET),
            data: hp,
            data_offset: hp.load_u32(conf + CONF_DATA_OFFSET),
            len,
            item_size: hp.load_u16(conf + CONF_ITEM_SIZE),
        };

        log::info!(
            "queue {:#06x}: attached {} x {} bytes as {:?}",
            sysinfo_id,
            len,
            layout.item_size,
            role
        );
        Self::create(&layout, role, hooks)
    }

    /// Take a free buffer of `size` bytes
    ///
    /// # Errors
    /// - [`QueueError::NotSupported`] on the remote side
    /// - [`QueueError::NoMem`] if `size` exceeds the item size
    /// - [`QueueError::NotFound`] if the ring is exhausted (transient)
    pub fn alloc_try(&mut self, size: u16) -> Result<QueueBuf<'a>> {
        self.pm.enter();
        let result = self.take_free(size);
        if result.is_err() {
            self.pm.exit();
        }
        result
    }

    fn take_free(&mut self, size: u16) -> Result<QueueBuf<'a>> {
        self.require(Role::Master)?;
        if size > self.max_item_size {
            return Err(QueueError::NoMem {
                requested: size,
                max: self.max_item_size,
            });
        }

        let slot = self.slot(self.free_index);
        if !self.flags(slot).is_used(self.free_flip) {
            return Err(QueueError::NotFound);
        }
        memory_barrier();

        let addr = self.desc.load_u32(self.desc_at(slot) + DESC_ADDR);
        self.check_buffer(addr, size)?;

        self.free_index = self.free_index.wrapping_add(1);
        if slot == self.size - 1 {
            self.free_flip = !self.free_flip;
        }
        Ok(QueueBuf::new(self.data, addr, size, self.max_item_size))
    }

    /// Publish `size` bytes of `buf` to the remote side
    ///
    /// `buf` must be the oldest buffer taken with [`alloc_try`](Self::alloc_try)
    /// and not yet sent. The notify hook runs after the descriptor is
    /// published.
    pub fn send_try(&mut self, buf: QueueBuf<'a>, size: u16) -> Result<()> {
        let result = self.publish(buf, size);
        self.pm.exit();
        result
    }

    fn publish(&mut self, buf: QueueBuf<'a>, size: u16) -> Result<()> {
        self.require(Role::Master)?;
        if self.used_index == self.free_index {
            return Err(QueueError::NotAllowed("send without a pending allocation"));
        }
        if size > self.max_item_size {
            return Err(QueueError::NoMem {
                requested: size,
                max: self.max_item_size,
            });
        }

        let slot = self.slot(self.used_index);
        let flags = self.flags(slot);
        if !flags.is_used(self.used_flip) {
            return Err(QueueError::NotAllowed("send slot not free"));
        }
        self.check_buffer(buf.offset(), size)?;

        let desc = self.desc_at(slot);
        self.desc.store_u32(desc + DESC_ADDR, buf.offset());
        self.desc.store_u16(desc + DESC_LEN, size);
        memory_barrier();

        self.used_index = self.used_index.wrapping_add(1);
        self.desc
            .store_u16(desc + DESC_FLAGS, (flags ^ DescFlags::AVAILABLE).bits());
        if slot == self.size - 1 {
            self.used_flip = !self.used_flip;
        }
        memory_barrier();

        if let Some(notify) = self.notify {
            notify.notify();
        }
        Ok(())
    }

    /// Take the oldest filled buffer
    ///
    /// # Errors
    /// - [`QueueError::NotSupported`] on the master side
    /// - [`QueueError::NotFound`] if nothing is pending (transient)
    /// - [`QueueError::NotAllowed`] if the peer wrote a corrupt descriptor
    pub fn recv_try(&mut self) -> Result<QueueBuf<'a>> {
        self.require(Role::Remote)?;

        let slot = self.slot(self.free_index);
        if !self.flags(slot).is_available(self.free_flip) {
            return Err(QueueError::NotFound);
        }
        memory_barrier();

        let desc = self.desc_at(slot);
        let addr = self.desc.load_u32(desc + DESC_ADDR);
        let len = self.desc.load_u16(desc + DESC_LEN);
        self.check_buffer(addr, len)?;

        self.free_index = self.free_index.wrapping_add(1);
        if slot == self.size - 1 {
            self.free_flip = !self.free_flip;
        }
        self.pm.enter();
        Ok(QueueBuf::new(self.data, addr, len, self.max_item_size))
    }

    /// Give a received buffer back to the master
    ///
    /// Buffers are returned in the order they were received.
    pub fn free_try(&mut self, buf: QueueBuf<'a>) -> Result<()> {
        let result = self.release(buf);
        self.pm.exit();
        result
    }

    fn release(&mut self, buf: QueueBuf<'a>) -> Result<()> {
        self.require(Role::Remote)?;
        if self.used_index == self.free_index {
            return Err(QueueError::NotAllowed("free without a pending receive"));
        }

        let slot = self.slot(self.used_index);
        let flags = self.flags(slot);
        if !flags.is_available(self.used_flip) {
            return Err(QueueError::NotAllowed("free slot not filled"));
        }
        self.check_buffer(buf.offset(), 0)?;

        let desc = self.desc_at(slot);
        self.desc.store_u32(desc + DESC_ADDR, buf.offset());
        self.desc.store_u16(desc + DESC_LEN, self.max_item_size);
        memory_barrier();

        self.used_index = self.used_index.wrapping_add(1);
        self.desc.store_u16(desc + DESC_FLAGS, (flags ^ DescFlags::USED).bits());
        if slot == self.size - 1 {
            self.used_flip = !self.used_flip;
        }
        memory_barrier();
        Ok(())
    }

    /// Run `handler` each time the master's notify raises `line` here
    ///
    /// Remote side only. The handler usually drains the queue with
    /// [`recv_try`](Self::recv_try) or wakes the task that does.
    ///
    /// # Errors
    /// - [`QueueError::NotSupported`] on the master side
    /// - [`QueueError::Signal`] if `line` already has a handler
    pub fn intr_enable<'h>(
        &self,
        intr: &dyn SwIntrHandlers<'h>,
        line: SwIntrId,
        handler: &'h dyn Fn(),
    ) -> Result<()> {
        self.pm.enter();
        let result = self
            .require(Role::Remote)
            .and_then(|()| intr.bind_handler(line, handler).map_err(QueueError::from));
        self.pm.exit();
        if result.is_ok() {
            log::debug!("queue: receive interrupt on {:?}", line);
        }
        result
    }

    /// Number of descriptors
    pub fn capacity(&self) -> u16 {
        self.size
    }

    /// Bytes per buffer
    pub fn max_item_size(&self) -> u16 {
        self.max_item_size
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Buffers taken but not yet handed back by this side
    pub fn outstanding(&self) -> u16 {
        self.free_index.wrapping_sub(self.used_index)
    }

    fn require(&self, role: Role) -> Result<()> {
        if self.role == role {
            Ok(())
        } else {
            Err(QueueError::NotSupported(self.role))
        }
    }

    fn slot(&self, index: u16) -> u16 {
        index & (self.size - 1)
    }

    fn desc_at(&self, slot: u16) -> u32 {
        self.desc_offset + slot as u32 * DESC_SIZE
    }

    fn flags(&self, slot: u16) -> DescFlags {
        DescFlags::from_bits_retain(self.desc.load_u16(self.desc_at(slot) + DESC_FLAGS))
    }

    /// A descriptor must name one of this ring's home buffers
    fn check_buffer(&self, addr: u32, len: u16) -> Result<()> {
        let item = self.max_item_size as u32;
        let end = self.data_offset + self.size as u32 * item;
        if len > self.max_item_size || addr < self.data_offset || addr >= end || (addr - self.data_offset) % item != 0 {
            log::error!(
                "queue: corrupt descriptor addr {:#x} len {} (data {:#x}..{:#x})",
                addr,
                len,
                self.data_offset,
                end
            );
            return Err(QueueError::NotAllowed("descriptor outside ring buffers"));
        }
        Ok(())
    }
}

fn entry_size(bytes: u32) -> Result<u16> {
    u16::try_from(bytes).map_err(|_| QueueError::InvalidArg("queue does not fit one sysinfo entry"))
}

impl fmt::Debug for Queue<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Queue")
            .field("role", &self.role)
            .field("size", &self.size)
            .field("max_item_size", &self.max_item_size)
            .field("free_index", &self.free_index)
            .field("used_index", &self.used_index)
            .field("free_flip", &self.free_flip)
            .field("used_flip", &self.used_flip)
            .finish()
    }
}
