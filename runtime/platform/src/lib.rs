//! # Duet Platform Layer
//!
//! The thin collaborators the messaging stack is built on. Everything with
//! real invariants lives in the crates above this one; this crate only gives
//! them a uniform way to reach shared memory and the other core.
//!
//! # Purpose
//! - [`SharedRegion`]: handle over one statically partitioned shared-memory pool
//! - [`memory_barrier`]: the single fence used at every publish point
//! - [`signal`]: cross-core software interrupt lines and the notify capability
//! - [`pm`]: "skip light sleep" guard capability bracketing retention-pool access
//! - [`irq`]: local interrupt masking for short critical sections
//!
//! # Integration Points
//! - Depends on: nothing but `core` (and `std` in mock mode)
//! - Provides to: `duet-sysinfo`, `duet-queue`, `duet-rpmsg`, `duet-rpc`
//!
//! ## Build Modes
//!
//! ```bash
//! # Mock (default - host testing, two cores modelled as two threads)
//! cargo test
//!
//! # Bare target
//! cargo build --no-default-features
//! ```

#![no_std]

#[cfg(feature = "alloc")]
extern crate alloc;

#[cfg(any(test, feature = "mock"))]
extern crate std;

pub mod irq;
pub mod pm;
pub mod region;
pub mod signal;

#[cfg(feature = "mock")]
pub mod mock;

pub use irq::{critical, InterruptMask};
pub use pm::{NoSleepGuard, SleepGuard};
pub use region::{RegionError, SharedRegion, REGION_ALIGN};
pub use signal::{CoreId, Notify, SignalError, SwIntr, SwIntrHandlers, SwIntrId, SwIntrNotify};

use core::sync::atomic::{fence, Ordering};

/// Full memory barrier between the two cores.
///
/// Every write that publishes ownership of shared memory (descriptor flag
/// flips, allocator list links) is preceded by this call, and every read
/// that acquires ownership is followed by it.
#[inline(always)]
pub fn memory_barrier() {
    fence(Ordering::SeqCst);
}
