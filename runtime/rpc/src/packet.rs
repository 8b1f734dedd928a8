//! RPC packet header

use static_assertions::const_assert_eq;

/// Bytes in front of every request and reply payload
pub const HEADER_SIZE: u16 = 8;

const MSG_ID: usize = 0;
const CMD_ID: usize = 2;
const STATUS: usize = 4;
const LEN: usize = 6;

const_assert_eq!(LEN + 2, HEADER_SIZE as usize);

/// Outcome reported by the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RpcStatus {
    Ok,
    /// No service registered for the command
    InvalidCmd,
    BadPacket,
    /// The service ran and reported failure
    ExecFailed,
    /// A status this side does not know
    Unknown(u16),
}

impl RpcStatus {
    pub const fn from_raw(raw: u16) -> Self {
        match raw {
            0 => RpcStatus::Ok,
            1 => RpcStatus::InvalidCmd,
            2 => RpcStatus::BadPacket,
            3 => RpcStatus::ExecFailed,
            other => RpcStatus::Unknown(other),
        }
    }

    pub const fn to_raw(self) -> u16 {
        match self {
            RpcStatus::Ok => 0,
            RpcStatus::InvalidCmd => 1,
            RpcStatus::BadPacket => 2,
            RpcStatus::ExecFailed => 3,
            RpcStatus::Unknown(raw) => raw,
        }
    }

    pub const fn is_ok(self) -> bool {
        matches!(self, RpcStatus::Ok)
    }
}

/// Decoded packet header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub msg_id: u16,
    pub cmd_id: u16,
    pub status: RpcStatus,
    /// Payload bytes following the header
    pub len: u16,
}

impl PacketHeader {
    /// Write the header into the first [`HEADER_SIZE`] bytes of `out`
    ///
    /// # Panics
    /// If `out` is shorter than the header.
    pub fn encode(&self, out: &mut [u8]) {
        out[MSG_ID..MSG_ID + 2].copy_from_slice(&self.msg_id.to_le_bytes());
        out[CMD_ID..CMD_ID + 2].copy_from_slice(&self.cmd_id.to_le_bytes());
        out[STATUS..STATUS + 2].copy_from_slice(&self.status.to_raw().to_le_bytes());
        out[LEN..LEN + 2].copy_from_slice(&self.len.to_le_bytes());
    }

    /// Split a packet into its header and declared payload
    ///
    /// `None` if the packet is shorter than its header claims.
    pub fn decode(packet: &[u8]) -> Option<(Self, &[u8])> {
        let field = |at: usize| u16::from_le_bytes([packet[at], packet[at + 1]]);
        if packet.len() < HEADER_SIZE as usize {
            return None;
        }
        let header = Self {
            msg_id: field(MSG_ID),
            cmd_id: field(CMD_ID),
            status: RpcStatus::from_raw(field(STATUS)),
            len: field(LEN),
        };
        let payload = packet
            .get(HEADER_SIZE as usize..HEADER_SIZE as usize + header.len as usize)?;
        Some((header, payload))
    }
}
