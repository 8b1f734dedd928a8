//! Host model of the two cores' software interrupt lines
//!
//! A [`MockLink`] stands for the interconnect between the cores: it keeps
//! one pending mask per core and wakes a core blocked in [`MockCore::wait`].
//! Each core (usually one host thread) takes a [`MockCore`] view that owns
//! its local handler table. Handlers run when that core calls
//! [`MockCore::dispatch`] or returns from [`MockCore::wait`], which models
//! an interrupt being taken at the next instruction boundary.

use core::cell::RefCell;
use core::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use core::time::Duration;

use std::boxed::Box;
use std::sync::{Condvar, Mutex, PoisonError};

use crate::irq::InterruptMask;
use crate::signal::{CoreId, SignalError, SwIntr, SwIntrHandlers, SwIntrId};

type Handler<'l> = Box<dyn FnMut() + 'l>;

/// Interconnect shared by both simulated cores
#[derive(Debug, Default)]
pub struct MockLink {
    pending: [AtomicU8; 2],
    raised: [AtomicUsize; 2],
    lock: Mutex<()>,
    wake: Condvar,
}

impl MockLink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the per-core view for `core`
    pub fn core(&self, core: CoreId) -> MockCore<'_> {
        MockCore {
            link: self,
            id: core,
            handlers: RefCell::new([None, None, None, None]),
        }
    }

    /// Lines currently pending on `core`
    pub fn pending(&self, core: CoreId) -> u8 {
        self.pending[core.index()].load(Ordering::Acquire)
    }

    /// Total interrupts ever raised towards `core`
    pub fn raised(&self, core: CoreId) -> usize {
        self.raised[core.index()].load(Ordering::Relaxed)
    }

    fn raise(&self, target: CoreId, id: SwIntrId) {
        self.pending[target.index()].fetch_or(id.mask(), Ordering::AcqRel);
        self.raised[target.index()].fetch_add(1, Ordering::Relaxed);
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.wake.notify_all();
    }
}

/// One core's view of the interconnect
pub struct MockCore<'l> {
    link: &'l MockLink,
    id: CoreId,
    handlers: RefCell<[Option<Handler<'l>>; SwIntrId::COUNT]>,
}

impl<'l> MockCore<'l> {
    pub fn id(&self) -> CoreId {
        self.id
    }

    /// Bind the handler that runs when the peer raises `line`
    ///
    /// # Errors
    /// Returns [`SignalError::AlreadyBound`] if the line has a handler.
    pub fn add_handler(&self, line: SwIntrId, handler: impl FnMut() + 'l) -> Result<(), SignalError> {
        let mut handlers = self.handlers.borrow_mut();
        let slot = &mut handlers[line.index()];
        if slot.is_some() {
            return Err(SignalError::AlreadyBound(line));
        }
        *slot = Some(Box::new(handler));
        log::debug!("{:?}: bound handler on {:?}", self.id, line);
        Ok(())
    }

    pub fn remove_handler(&self, line: SwIntrId) {
        self.handlers.borrow_mut()[line.index()] = None;
    }

    /// Run handlers for every pending line, returns how many lines fired
    ///
    /// A pending line without a handler is acknowledged and dropped, which
    /// is what the interrupt controller does with an unclaimed line.
    pub fn dispatch(&self) -> usize {
        let bits = self.link.pending[self.id.index()].swap(0, Ordering::AcqRel);
        let mut fired = 0;
        for line in SwIntrId::ALL {
            if bits & line.mask() == 0 {
                continue;
            }
            // Take the handler out so it may rebind lines while it runs
            let handler = self.handlers.borrow_mut()[line.index()].take();
            match handler {
                Some(mut handler) => {
                    handler();
                    fired += 1;
                    let mut handlers = self.handlers.borrow_mut();
                    if handlers[line.index()].is_none() {
                        handlers[line.index()] = Some(handler);
                    }
                }
                None => log::warn!("{:?}: unclaimed interrupt on {:?}", self.id, line),
            }
        }
        fired
    }

    /// Block until an interrupt is pending or `timeout` elapses
    ///
    /// Pending lines are dispatched before returning. Returns `false` on
    /// timeout.
    pub fn wait(&self, timeout: Duration) -> bool {
        let pending = &self.link.pending[self.id.index()];
        let guard = self.link.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let (guard, result) = self
            .link
            .wake
            .wait_timeout_while(guard, timeout, |_| pending.load(Ordering::Acquire) == 0)
            .unwrap_or_else(PoisonError::into_inner);
        drop(guard);

        if result.timed_out() && pending.load(Ordering::Acquire) == 0 {
            return false;
        }
        self.dispatch();
        true
    }

    /// Log the handler table
    pub fn handler_dump(&self) {
        let handlers = self.handlers.borrow();
        for line in SwIntrId::ALL {
            log::info!(
                "{:?}: {:?} -> {}",
                self.id,
                line,
                if handlers[line.index()].is_some() { "bound" } else { "unbound" }
            );
        }
    }
}

impl SwIntr for MockCore<'_> {
    fn trigger(&self, id: SwIntrId) {
        self.link.raise(self.id.peer(), id);
    }
}

impl<'l> SwIntrHandlers<'l> for MockCore<'l> {
    fn bind_handler(&self, line: SwIntrId, handler: &'l dyn Fn()) -> Result<(), SignalError> {
        self.add_handler(line, move || handler())
    }

    fn unbind_handler(&self, line: SwIntrId) {
        self.remove_handler(line);
    }
}

/// Interrupt mask backed by a host spin flag
#[derive(Debug, Default)]
pub struct MockInterruptMask {
    masked: AtomicBool,
}

impl MockInterruptMask {
    pub const fn new() -> Self {
        Self {
            masked: AtomicBool::new(false),
        }
    }

    pub fn is_masked(&self) -> bool {
        self.masked.load(Ordering::Acquire)
    }
}

impl InterruptMask for MockInterruptMask {
    fn enter_critical(&self) {
        while self
            .masked
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            core::hint::spin_loop();
        }
    }

    fn exit_critical(&self) {
        self.masked.store(false, Ordering::Release);
    }
}
