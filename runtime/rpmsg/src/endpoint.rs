//! Endpoint handles and the binding table

use crate::device::RpmsgIo;
use crate::message::RxMessage;
use crate::{Result, RpmsgError};

/// A bound local address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Endpoint {
    addr: u16,
}

impl Endpoint {
    pub(crate) const fn new(addr: u16) -> Self {
        Self { addr }
    }

    pub fn addr(&self) -> u16 {
        self.addr
    }
}

/// Receives the messages addressed to one endpoint
pub trait EndpointHandler<'a> {
    /// Called from `poll` with a message for this endpoint
    ///
    /// Return the message to have it released immediately, or `None` after
    /// keeping it; a kept message must later go back through `destroy`.
    fn on_message(&self, io: &mut RpmsgIo<'_, 'a>, msg: RxMessage<'a>) -> Option<RxMessage<'a>>;
}

#[derive(Clone, Copy)]
struct Binding<'a> {
    addr: u16,
    handler: &'a dyn EndpointHandler<'a>,
}

/// Fixed-capacity address → handler table
pub(crate) struct EndpointTable<'a, const N: usize> {
    slots: [Option<Binding<'a>>; N],
}

impl<'a, const N: usize> EndpointTable<'a, N> {
    pub(crate) fn new() -> Self {
        Self { slots: [None; N] }
    }

    pub(crate) fn bind(&mut self, addr: u16, handler: &'a dyn EndpointHandler<'a>) -> Result<Endpoint> {
        if self.lookup(addr).is_some() {
            return Err(RpmsgError::AlreadyBound(addr));
        }
        let slot = self
            .slots
            .iter_mut()
            .find(|slot| slot.is_none())
            .ok_or(RpmsgError::TableFull(N))?;
        *slot = Some(Binding { addr, handler });
        Ok(Endpoint::new(addr))
    }

    pub(crate) fn unbind(&mut self, addr: u16) -> Result<()> {
        let slot = self
            .slots
            .iter_mut()
            .find(|slot| matches!(slot, Some(b) if b.addr == addr))
            .ok_or(RpmsgError::NotBound(addr))?;
        *slot = None;
        Ok(())
    }

    pub(crate) fn lookup(&self, addr: u16) -> Option<&'a dyn EndpointHandler<'a>> {
        self.slots
            .iter()
            .flatten()
            .find(|b| b.addr == addr)
            .map(|b| b.handler)
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.iter().flatten().count()
    }
}
