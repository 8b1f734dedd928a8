//! # Duet Rpmsg - endpoint transport
//!
//! **Many logical channels over one pair of descriptor rings.**
//!
//! # Purpose
//! Every ring buffer carries an envelope naming a source and destination
//! endpoint address, so independent services on the two cores share one
//! queue pair without knowing about each other.
//!
//! # Integration Points
//! - Depends on: `duet-queue` (rings), `duet-sysinfo` (reserved vqueue IDs),
//!   `duet-platform` (interrupt line binding)
//! - Provides to: `duet-rpc`, applications
//!
//! ## Architecture
//!
//! ```text
//! main core                               sub core
//! Rpmsg::tx (Master) ── VQUEUE_MAIN ──>  Rpmsg::rx (Remote)
//! Rpmsg::rx (Remote) <── VQUEUE_SUB ───  Rpmsg::tx (Master)
//!
//! buffer: [ src:u16 | dst:u16 | len:u16 | flags:u16 | payload ... ]
//! ```
//!
//! `poll` drains the receive ring and hands each message to the handler
//! bound at its destination address. Messages for unbound addresses are
//! released straight away so they cannot pin ring slots.
//!
//! # Design
//! - Zero copy: [`TxMessage`] is written in place and sent, [`RxMessage`]
//!   is read in place and released
//! - Handlers get an [`RpmsgIo`] and may reply from inside `poll`
//! - A handler either returns the message (released by the transport) or
//!   keeps it and calls [`Rpmsg::destroy`] later
//! - Receive may be driven from an interrupt handler bound to the
//!   notify line with [`Rpmsg::intr_enable`]; the transport itself never
//!   schedules anything

#![no_std]

#[cfg(test)]
extern crate std;

mod device;
mod endpoint;
mod message;

pub use device::{Rpmsg, RpmsgIo};
pub use endpoint::{Endpoint, EndpointHandler};
pub use message::{MessageFlags, RxMessage, TxMessage, HEADER_SIZE};

use duet_queue::QueueError;
use duet_sysinfo::Pool;

/// Endpoint slots per transport unless chosen otherwise
pub const DEFAULT_ENDPOINTS: usize = 8;

/// Transport errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RpmsgError {
    #[error("endpoint {0:#06x} already bound")]
    AlreadyBound(u16),

    #[error("endpoint table full ({0} entries)")]
    TableFull(usize),

    #[error("endpoint {0:#06x} not bound")]
    NotBound(u16),

    #[error("message of {requested} bytes exceeds {max}")]
    NoMem { requested: usize, max: u16 },

    #[error("invalid argument: {0}")]
    InvalidArg(&'static str),

    #[error("queue: {0}")]
    Queue(#[from] QueueError),
}

impl RpmsgError {
    /// Whether retrying later can succeed (ring exhausted, peer not up yet)
    pub fn is_transient(&self) -> bool {
        matches!(self, RpmsgError::Queue(e) if e.is_transient())
    }
}

pub type Result<T> = core::result::Result<T, RpmsgError>;

/// Parameters of the queue pair built by [`Rpmsg::main_init`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RpmsgConfig {
    /// Descriptors per direction
    pub queue_len: u16,
    /// Bytes per ring buffer, envelope included
    pub item_size: u16,
    /// Pool holding the descriptors of the main core's sending queue
    ///
    /// The receiving queue keeps its descriptors in HP.
    pub desc_pool: Pool,
}

impl RpmsgConfig {
    pub fn new(queue_len: u16, item_size: u16) -> Self {
        Self {
            queue_len,
            item_size,
            desc_pool: Pool::Hp,
        }
    }

    pub fn with_desc_pool(mut self, pool: Pool) -> Self {
        self.desc_pool = pool;
        self
    }
}

impl Default for RpmsgConfig {
    fn default() -> Self {
        Self::new(32, 64)
    }
}
