//! # Duet RPC - commands over rpmsg endpoints
//!
//! **Numbered commands with a single status + payload reply.**
//!
//! # Purpose
//! A client on one core asks a server on the other core to run a command
//! and gets back a status and up to `resp_len` bytes. Calls are
//! asynchronous: [`RpcClient::execute_cmd`] returns once the request is on
//! the ring, and the reply is delivered to an [`RpcCompletion`] from the
//! client's `poll`.
//!
//! # Integration Points
//! - Depends on: `duet-rpmsg` (endpoints, zero-copy messages)
//! - Provides to: applications on either core
//!
//! ## Wire format
//!
//! ```text
//! [ msg_id:u16 | cmd_id:u16 | status:u16 | len:u16 | payload (len bytes) ]
//! ```
//!
//! All fields little-endian. A reply carries the `msg_id` and `cmd_id` of
//! the request it answers.
//!
//! ## Command lifecycle
//!
//! ```text
//! client:  Idle ──execute_cmd──> Dispatched ──reply──> Completed(status)
//!                                    │ └─stale reply──> NotMatched (dropped)
//!                                    └─caller gives up─> TimedOut
//! server:  Idle ──poll──> Receiving ──> Dispatching ──> Replied | Dropped
//! ```
//!
//! # Design
//! - Client and server are caller-owned storage bound to a transport; no
//!   allocation after init
//! - One pending command per client: a new `execute_cmd` replaces the
//!   previous one and its late reply is discarded
//! - Replies are truncated to the length the client asked for; bytes past
//!   what the server produced are left untouched in the client's buffer
//! - No timeouts or retries: callers time out with the platform's blocking
//!   wait

#![no_std]

#[cfg(test)]
extern crate std;

mod client;
mod packet;
mod server;


pub use client::{RpcClient, RpcClientConfig, RpcCmd, RpcCompletion, RpcResponse};
pub use packet::{PacketHeader, RpcStatus, HEADER_SIZE};
pub use server::{RpcHandler, RpcRequest, RpcServer, RpcServerConfig, DEFAULT_SERVICES};

use duet_rpmsg::RpmsgError;

/// RPC API errors
///
/// These describe why a call could not be made; the outcome of a command
/// that reached the server is an [`RpcStatus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RpcError {
    #[error("invalid argument: {0}")]
    InvalidArg(&'static str),

    #[error("not bound or already deinitialized")]
    InvalidState,

    #[error("request of {0} bytes does not fit the wire length")]
    InvalidSize(usize),

    #[error("command {0:#06x} already registered")]
    Exist(u16),

    #[error("command {0:#06x} not registered")]
    NotFound(u16),

    #[error("service table full ({0} entries)")]
    NoMem(usize),

    #[error("transport: {0}")]
    Transport(#[from] RpmsgError),
}

impl RpcError {
    /// Whether retrying later can succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, RpcError::Transport(e) if e.is_transient())
    }
}

pub type Result<T> = core::result::Result<T, RpcError>;
