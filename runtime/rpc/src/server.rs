//! RPC server and its service table

use core::cell::{Cell, RefCell};
use core::fmt;

use duet_rpmsg::{Endpoint, EndpointHandler, MessageFlags, Rpmsg, RpmsgIo, RxMessage};

use crate::packet::{PacketHeader, RpcStatus, HEADER_SIZE};
use crate::{Result, RpcError};

/// Service slots per server unless chosen otherwise
pub const DEFAULT_SERVICES: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RpcServerConfig {
    /// Local endpoint requests arrive at
    pub server_id: u16,
    /// Largest response a service may produce
    pub resp_buf_len: u16,
}

impl RpcServerConfig {
    pub fn new(server_id: u16, resp_buf_len: u16) -> Self {
        Self {
            server_id,
            resp_buf_len,
        }
    }
}

/// The request a service is asked to handle, and room for its answer
pub struct RpcRequest<'r> {
    cmd_id: u16,
    req: &'r [u8],
    resp: &'r mut [u8],
    resp_len: usize,
    status: RpcStatus,
}

impl<'r> RpcRequest<'r> {
    pub fn cmd_id(&self) -> u16 {
        self.cmd_id
    }

    /// Request payload
    pub fn data(&self) -> &'r [u8] {
        self.req
    }

    /// Room available for the response
    pub fn capacity(&self) -> usize {
        self.resp.len()
    }

    /// The whole response buffer, for writing in place
    ///
    /// Pair with [`set_response_len`](Self::set_response_len).
    pub fn response_mut(&mut self) -> &mut [u8] {
        self.resp
    }

    /// Bytes of the response buffer to send, capped at the capacity
    pub fn set_response_len(&mut self, len: usize) {
        self.resp_len = len.min(self.resp.len());
    }

    pub fn response_len(&self) -> usize {
        self.resp_len
    }

    /// Copy `data` as the response, returning how much fit
    pub fn respond(&mut self, data: &[u8]) -> usize {
        let n = data.len().min(self.resp.len());
        self.resp[..n].copy_from_slice(&data[..n]);
        self.resp_len = n;
        n
    }

    /// Status sent back, [`RpcStatus::Ok`] unless changed
    pub fn set_status(&mut self, status: RpcStatus) {
        self.status = status;
    }

    pub fn status(&self) -> RpcStatus {
        self.status
    }
}

/// A registered command
///
/// Runs synchronously inside the server's `poll`.
pub trait RpcHandler {
    fn handle(&self, req: &mut RpcRequest<'_>);
}

impl<F> RpcHandler for F
where
    F: Fn(&mut RpcRequest<'_>),
{
    fn handle(&self, req: &mut RpcRequest<'_>) {
        self(req)
    }
}

#[derive(Clone, Copy)]
struct Service<'a> {
    cmd_id: u16,
    handler: &'a dyn RpcHandler,
}

/// Server storage with room for `S` services
pub struct RpcServer<'a, const S: usize = DEFAULT_SERVICES> {
    cfg: RpcServerConfig,
    ept: Cell<Option<Endpoint>>,
    closed: Cell<bool>,
    services: RefCell<[Option<Service<'a>>; S]>,
}

impl<'a, const S: usize> RpcServer<'a, S> {
    /// # Errors
    /// [`RpcError::InvalidArg`] for an empty service table or a zero
    /// response buffer.
    pub fn new(cfg: RpcServerConfig) -> Result<Self> {
        if S == 0 {
            return Err(RpcError::InvalidArg("service table must have room"));
        }
        if cfg.resp_buf_len == 0 {
            return Err(RpcError::InvalidArg("response buffer length must be non-zero"));
        }
        Ok(Self {
            cfg,
            ept: Cell::new(None),
            closed: Cell::new(false),
            services: RefCell::new([None; S]),
        })
    }

    pub fn config(&self) -> &RpcServerConfig {
        &self.cfg
    }

    /// Bind the request endpoint on `dev`
    pub fn bind<const N: usize>(&'a self, dev: &mut Rpmsg<'a, N>) -> Result<()> {
        if self.closed.get() || self.ept.get().is_some() {
            return Err(RpcError::InvalidState);
        }
        let ept = dev.create_endpoint(self.cfg.server_id, self)?;
        self.ept.set(Some(ept));
        log::info!("rpc server {:#06x} bound", self.cfg.server_id);
        Ok(())
    }

    pub fn deinit<const N: usize>(&self, dev: &mut Rpmsg<'a, N>) -> Result<()> {
        if self.closed.replace(true) {
            return Err(RpcError::InvalidState);
        }
        if let Some(ept) = self.ept.take() {
            dev.delete_endpoint(ept)?;
        }
        Ok(())
    }

    /// Register `handler` for `cmd_id`
    ///
    /// # Errors
    /// - [`RpcError::Exist`] if `cmd_id` already has a service
    /// - [`RpcError::NoMem`] if all `S` slots are taken
    pub fn add_service(&self, cmd_id: u16, handler: &'a dyn RpcHandler) -> Result<()> {
        let mut services = self.services.borrow_mut();
        if services.iter().flatten().any(|s| s.cmd_id == cmd_id) {
            return Err(RpcError::Exist(cmd_id));
        }
        let slot = services
            .iter_mut()
            .find(|slot| slot.is_none())
            .ok_or(RpcError::NoMem(S))?;
        *slot = Some(Service { cmd_id, handler });
        log::debug!("rpc server {:#06x}: cmd {:#06x} registered", self.cfg.server_id, cmd_id);
        Ok(())
    }

    pub fn del_service(&self, cmd_id: u16) -> Result<()> {
        let mut services = self.services.borrow_mut();
        let slot = services
            .iter_mut()
            .find(|slot| matches!(slot, Some(s) if s.cmd_id == cmd_id))
            .ok_or(RpcError::NotFound(cmd_id))?;
        *slot = None;
        Ok(())
    }

    fn lookup(&self, cmd_id: u16) -> Option<&'a dyn RpcHandler> {
        self.services
            .borrow()
            .iter()
            .flatten()
            .find(|s| s.cmd_id == cmd_id)
            .map(|s| s.handler)
    }

    fn serve(&self, io: &mut RpmsgIo<'_, 'a>, msg: &RxMessage<'a>) {
        let Some((header, payload)) = PacketHeader::decode(msg) else {
            log::warn!("rpc server {:#06x}: malformed request from {:#06x}", self.cfg.server_id, msg.src());
            return;
        };

        let capacity = self
            .cfg
            .resp_buf_len
            .min(io.max_payload_size().saturating_sub(HEADER_SIZE));
        let mut reply = match io.create_message(HEADER_SIZE + capacity, MessageFlags::empty()) {
            Ok(reply) => reply,
            Err(e) => {
                log::error!(
                    "rpc server {:#06x}: no buffer to answer msg {}: {}",
                    self.cfg.server_id,
                    header.msg_id,
                    e
                );
                return;
            }
        };

        let (status, len) = match self.lookup(header.cmd_id) {
            Some(handler) => {
                let (_, resp) = reply.split_at_mut(HEADER_SIZE as usize);
                let mut req = RpcRequest {
                    cmd_id: header.cmd_id,
                    req: payload,
                    resp,
                    resp_len: 0,
                    status: RpcStatus::Ok,
                };
                handler.handle(&mut req);
                (req.status, req.resp_len as u16)
            }
            None => {
                log::warn!("rpc server {:#06x}: unknown cmd {:#06x}", self.cfg.server_id, header.cmd_id);
                (RpcStatus::InvalidCmd, 0)
            }
        };

        PacketHeader {
            msg_id: header.msg_id,
            cmd_id: header.cmd_id,
            status,
            len,
        }
        .encode(&mut reply);
        if let Err(e) = io.send_nocopy(&msg.endpoint(), msg.src(), reply, HEADER_SIZE + len) {
            log::error!("rpc server {:#06x}: reply to msg {} failed: {}", self.cfg.server_id, header.msg_id, e);
        }
    }
}

impl<'a, const S: usize> EndpointHandler<'a> for RpcServer<'a, S> {
    fn on_message(&self, io: &mut RpmsgIo<'_, 'a>, msg: RxMessage<'a>) -> Option<RxMessage<'a>> {
        self.serve(io, &msg);
        Some(msg)
    }
}

impl<const S: usize> fmt::Debug for RpcServer<'_, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RpcServer")
            .field("cfg", &self.cfg)
            .field("bound", &self.ept.get().is_some())
            .field("closed", &self.closed.get())
            .field("services", &self.services.borrow().iter().flatten().count())
            .finish()
    }
}
