//! Light-sleep coordination capability
//!
//! The main core may enter light sleep, which stops the clock to the plain
//! HP pool. While the sub core is in the middle of a queue or allocator
//! operation it holds a [`SleepGuard`] so the main core stays awake.
//! `enter` and `exit` are not required to be paired within one call: the
//! queue enters in `alloc_try` and exits in `send_try`.

/// Skip-light-sleep bracket
pub trait SleepGuard {
    fn enter(&self);
    fn exit(&self);
}

/// Guard for builds without light-sleep support
#[derive(Debug, Default, Clone, Copy)]
pub struct NoSleepGuard;

impl SleepGuard for NoSleepGuard {
    #[inline(always)]
    fn enter(&self) {}

    #[inline(always)]
    fn exit(&self) {}
}

impl<T: SleepGuard + ?Sized> SleepGuard for &T {
    fn enter(&self) {
        (**self).enter()
    }

    fn exit(&self) {
        (**self).exit()
    }
}
