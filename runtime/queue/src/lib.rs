//! # Duet Queue - lock-free descriptor ring
//!
//! # Purpose
//! Hands fixed-size buffers from one core to the other through shared
//! memory, without locks and without atomic read-modify-write instructions.
//! Two of these rings, one per direction, form a channel.
//!
//! # Integration Points
//! - Depends on: `duet-platform` (regions, barrier, notify, sleep guard,
//!   interrupt lines),
//!   `duet-sysinfo` (placement and discovery)
//! - Provides to: `duet-rpmsg`
//!
//! # Architecture
//! The ring is `capacity` descriptors `{ addr: u32, len: u16, flags: u16 }`
//! plus `capacity` data buffers of `max_item_size` bytes. Each side keeps
//! its own cursors and flip counters in local memory; only descriptors and
//! buffers are shared.
//!
//! ```text
//!   Master (producer)                         Remote (consumer)
//!   alloc_try ── free slot ──┐       ┌──> recv_try ── filled slot
//!   send_try  ── publish ────┼─ring──┤
//!                            └───────┴──< free_try ── give it back
//! ```
//!
//! A slot's state is never stored directly: it is derived by comparing two
//! flag bits against the flip counter of the current traversal (see
//! [`DescFlags`]). The writer stores `addr`/`len`, fences, then flips one
//! bit; the flip is the only field both sides race on.
//!
//! # Design
//! - Try-style operations only; callers retry transient errors
//!   ([`QueueError::is_transient`])
//! - Buffers are handed out as [`QueueBuf`] tokens: exactly one side owns a
//!   buffer's bytes at any time
//! - Descriptors read from the peer are bounds-checked before use

#![no_std]

#[cfg(test)]
extern crate std;

mod buf;
mod desc;
mod queue;

pub use buf::QueueBuf;
pub use desc::{DescFlags, CONF_SIZE, DESC_SIZE};
pub use queue::{Queue, QueueHooks, QueueLayout};

use duet_platform::SignalError;
use duet_sysinfo::{Pool, SysInfoError};

/// Which half of the ring a side drives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Allocates free buffers and sends them filled
    Master,
    /// Receives filled buffers and frees them back
    Remote,
}

/// Queue errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    #[error("operation not supported on the {0:?} side")]
    NotSupported(Role),

    #[error("{requested} bytes exceed the item size of {max}")]
    NoMem { requested: u16, max: u16 },

    #[error("no descriptor ready")]
    NotFound,

    #[error("protocol violation: {0}")]
    NotAllowed(&'static str),

    #[error("invalid argument: {0}")]
    InvalidArg(&'static str),

    #[error("sysinfo: {0}")]
    SysInfo(#[from] SysInfoError),

    #[error("signal: {0}")]
    Signal(#[from] SignalError),
}

impl QueueError {
    /// Whether retrying later can succeed
    pub fn is_transient(&self) -> bool {
        match self {
            QueueError::NotFound => true,
            QueueError::SysInfo(e) => e.is_transient(),
            _ => false,
        }
    }
}

pub type Result<T> = core::result::Result<T, QueueError>;

/// Parameters for [`Queue::main_init`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueConfig {
    /// Sys-info ID the queue is published under
    pub sysinfo_id: u16,
    /// Number of descriptors, rounded up to a power of two
    pub len: u16,
    /// Bytes per buffer, rounded up to a 4-byte word
    pub item_size: u16,
    /// Role of the main core on this queue
    pub role: Role,
    /// Pool holding the descriptor array
    ///
    /// [`Pool::Rtc`] keeps descriptors reachable while the main core is in
    /// light sleep; configuration and data buffers always live in HP. Only
    /// a queue the main core masters may use it.
    pub desc_pool: Pool,
}

impl QueueConfig {
    pub fn new(sysinfo_id: u16, len: u16, item_size: u16, role: Role) -> Self {
        Self {
            sysinfo_id,
            len,
            item_size,
            role,
            desc_pool: Pool::Hp,
        }
    }

    pub fn with_desc_pool(mut self, pool: Pool) -> Self {
        self.desc_pool = pool;
        self
    }
}

/// Round a queue length up to a power of two, `0` if impossible
pub const fn power_len(len: u16) -> u16 {
    if len == 0 {
        return 0;
    }
    match len.checked_next_power_of_two() {
        Some(len) => len,
        None => 0,
    }
}

/// Round an item size up to a 4-byte word, `0` if impossible
pub const fn aligned_size(size: u16) -> u16 {
    match size.checked_add(3) {
        Some(size) => size & !3,
        None => 0,
    }
}
