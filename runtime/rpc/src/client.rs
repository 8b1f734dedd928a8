//! RPC client

use core::cell::{Cell, RefCell};
use core::fmt;

use duet_rpmsg::{Endpoint, EndpointHandler, MessageFlags, Rpmsg, RpmsgIo, RxMessage};

use crate::packet::{PacketHeader, RpcStatus, HEADER_SIZE};
use crate::{Result, RpcError};

/// Addresses used by one client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RpcClientConfig {
    /// Local endpoint replies arrive at
    pub client_id: u16,
    /// Server endpoint on the peer core
    pub server_id: u16,
}

impl RpcClientConfig {
    pub fn new(client_id: u16, server_id: u16) -> Self {
        Self { client_id, server_id }
    }
}

/// Receives the reply to a command
pub trait RpcCompletion {
    /// `resp` is already truncated to the length the command asked for
    fn complete(&self, cmd_id: u16, status: RpcStatus, resp: &[u8]);
}

/// One command to execute
#[derive(Clone, Copy)]
pub struct RpcCmd<'c, 'a> {
    pub cmd_id: u16,
    pub req: &'c [u8],
    /// Most reply bytes the completion wants to see
    pub resp_len: u16,
    pub completion: Option<&'a dyn RpcCompletion>,
}

impl<'c, 'a> RpcCmd<'c, 'a> {
    pub fn new(cmd_id: u16, req: &'c [u8]) -> Self {
        Self {
            cmd_id,
            req,
            resp_len: 0,
            completion: None,
        }
    }

    pub fn with_response(mut self, resp_len: u16, completion: &'a dyn RpcCompletion) -> Self {
        self.resp_len = resp_len;
        self.completion = Some(completion);
        self
    }
}

#[derive(Clone, Copy)]
struct Pending<'a> {
    msg_id: u16,
    cmd_id: u16,
    resp_len: u16,
    completion: Option<&'a dyn RpcCompletion>,
}

/// Client storage
///
/// Bind it to a transport once with [`bind`](Self::bind); it must outlive
/// the transport's use of it.
pub struct RpcClient<'a> {
    cfg: RpcClientConfig,
    ept: Cell<Option<Endpoint>>,
    closed: Cell<bool>,
    last_msg_id: Cell<u16>,
    pending: Cell<Option<Pending<'a>>>,
}

impl<'a> RpcClient<'a> {
    pub fn new(cfg: RpcClientConfig) -> Self {
        Self {
            cfg,
            ept: Cell::new(None),
            closed: Cell::new(false),
            last_msg_id: Cell::new(0),
            pending: Cell::new(None),
        }
    }

    pub fn config(&self) -> &RpcClientConfig {
        &self.cfg
    }

    /// Bind the reply endpoint on `dev`
    ///
    /// # Errors
    /// - [`RpcError::InvalidState`] if already bound or deinitialized
    /// - [`RpcError::Transport`] if the address is taken
    pub fn bind<const N: usize>(&'a self, dev: &mut Rpmsg<'a, N>) -> Result<()> {
        if self.closed.get() || self.ept.get().is_some() {
            return Err(RpcError::InvalidState);
        }
        let ept = dev.create_endpoint(self.cfg.client_id, self)?;
        self.ept.set(Some(ept));
        log::info!(
            "rpc client {:#06x} bound, server {:#06x}",
            self.cfg.client_id,
            self.cfg.server_id
        );
        Ok(())
    }

    /// Release the endpoint; every later call fails [`RpcError::InvalidState`]
    pub fn deinit<const N: usize>(&self, dev: &mut Rpmsg<'a, N>) -> Result<()> {
        if self.closed.replace(true) {
            return Err(RpcError::InvalidState);
        }
        self.pending.set(None);
        if let Some(ept) = self.ept.take() {
            dev.delete_endpoint(ept)?;
        }
        Ok(())
    }

    /// Send `cmd` to the server and return without waiting
    ///
    /// The completion runs from `dev.poll()` when the matching reply
    /// arrives, or never if it is lost.
    ///
    /// # Errors
    /// - [`RpcError::InvalidState`] if not bound or deinitialized
    /// - [`RpcError::InvalidSize`] if the request cannot be described by
    ///   the 16-bit wire length; nothing is sent
    /// - [`RpcError::Transport`] if no send buffer is free (transient) or the
    ///   request exceeds the transport's payload size
    pub fn execute_cmd<const N: usize>(&self, dev: &mut Rpmsg<'a, N>, cmd: &RpcCmd<'_, 'a>) -> Result<()> {
        if self.closed.get() {
            return Err(RpcError::InvalidState);
        }
        let ept = self.ept.get().ok_or(RpcError::InvalidState)?;

        let total = HEADER_SIZE as usize + cmd.req.len();
        if total > u16::MAX as usize {
            return Err(RpcError::InvalidSize(cmd.req.len()));
        }
        let total = total as u16;

        let mut msg = dev.create_message(total, MessageFlags::empty())?;
        let msg_id = self.last_msg_id.get().wrapping_add(1);
        PacketHeader {
            msg_id,
            cmd_id: cmd.cmd_id,
            status: RpcStatus::Ok,
            len: total - HEADER_SIZE,
        }
        .encode(&mut msg);
        msg[HEADER_SIZE as usize..].copy_from_slice(cmd.req);

        let previous = self.pending.replace(Some(Pending {
            msg_id,
            cmd_id: cmd.cmd_id,
            resp_len: cmd.resp_len,
            completion: cmd.completion,
        }));
        if let Err(e) = dev.send_nocopy(&ept, self.cfg.server_id, msg, total) {
            self.pending.set(previous);
            return Err(e.into());
        }
        self.last_msg_id.set(msg_id);
        log::trace!("rpc: cmd {:#06x} sent as msg {}", cmd.cmd_id, msg_id);
        Ok(())
    }

    /// ID of the most recently sent request
    pub fn last_msg_id(&self) -> u16 {
        self.last_msg_id.get()
    }

    /// Whether a command is waiting for its reply
    pub fn is_pending(&self) -> bool {
        self.pending.get().is_some()
    }

    #[cfg(test)]
    pub(crate) fn force_last_msg_id(&self, msg_id: u16) {
        self.last_msg_id.set(msg_id);
    }

    fn complete(&self, header: &PacketHeader, payload: &[u8]) {
        let pending = match self.pending.get() {
            Some(p) if p.msg_id == header.msg_id && p.cmd_id == header.cmd_id => p,
            _ => {
                log::debug!(
                    "rpc: reply msg {} cmd {:#06x} not matched, dropped",
                    header.msg_id,
                    header.cmd_id
                );
                return;
            }
        };
        self.pending.set(None);

        let n = payload.len().min(pending.resp_len as usize);
        if let Some(completion) = pending.completion {
            completion.complete(header.cmd_id, header.status, &payload[..n]);
        }
    }
}

impl<'a> EndpointHandler<'a> for RpcClient<'a> {
    fn on_message(&self, _io: &mut RpmsgIo<'_, 'a>, msg: RxMessage<'a>) -> Option<RxMessage<'a>> {
        match PacketHeader::decode(&msg) {
            Some((header, payload)) => self.complete(&header, payload),
            None => log::warn!("rpc client {:#06x}: malformed reply from {:#06x}", self.cfg.client_id, msg.src()),
        }
        Some(msg)
    }
}

impl fmt::Debug for RpcClient<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RpcClient")
            .field("cfg", &self.cfg)
            .field("bound", &self.ept.get().is_some())
            .field("closed", &self.closed.get())
            .field("last_msg_id", &self.last_msg_id.get())
            .field("pending", &self.is_pending())
            .finish()
    }
}

/// Reply buffer of up to `N` bytes
///
/// Only the bytes the reply carries are written; the rest keep whatever
/// they held before.
pub struct RpcResponse<const N: usize> {
    data: RefCell<[u8; N]>,
    len: Cell<usize>,
    status: Cell<Option<RpcStatus>>,
}

impl<const N: usize> RpcResponse<N> {
    pub fn new() -> Self {
        Self::filled(0)
    }

    /// Buffer with every byte preset to `byte`
    pub fn filled(byte: u8) -> Self {
        Self {
            data: RefCell::new([byte; N]),
            len: Cell::new(0),
            status: Cell::new(None),
        }
    }

    pub fn is_done(&self) -> bool {
        self.status.get().is_some()
    }

    /// Status of the reply, once it arrived
    pub fn status(&self) -> Option<RpcStatus> {
        self.status.get()
    }

    /// Bytes written by the reply
    pub fn len(&self) -> usize {
        self.len.get()
    }

    pub fn is_empty(&self) -> bool {
        self.len.get() == 0
    }

    /// Copy of the whole buffer
    pub fn bytes(&self) -> [u8; N] {
        *self.data.borrow()
    }

    /// Forget the last reply, keeping the buffer contents
    pub fn reset(&self) {
        self.len.set(0);
        self.status.set(None);
    }
}

impl<const N: usize> Default for RpcResponse<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> RpcCompletion for RpcResponse<N> {
    fn complete(&self, _cmd_id: u16, status: RpcStatus, resp: &[u8]) {
        let n = resp.len().min(N);
        self.data.borrow_mut()[..n].copy_from_slice(&resp[..n]);
        self.len.set(n);
        self.status.set(Some(status));
    }
}
