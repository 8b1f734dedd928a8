//! Local interrupt masking

/// Masks interrupts on the calling core
///
/// Critical sections are short and never nest.
pub trait InterruptMask {
    fn enter_critical(&self);
    fn exit_critical(&self);
}

/// Run `f` with local interrupts masked
pub fn critical<M, R>(mask: &M, f: impl FnOnce() -> R) -> R
where
    M: InterruptMask + ?Sized,
{
    mask.enter_critical();
    let result = f();
    mask.exit_critical();
    result
}
