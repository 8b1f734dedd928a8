//! Message envelope and buffer wrappers

use core::fmt;
use core::ops::{Deref, DerefMut};

use bitflags::bitflags;
use duet_queue::QueueBuf;
use static_assertions::const_assert;

use crate::endpoint::Endpoint;

/// Envelope bytes in front of every payload
pub const HEADER_SIZE: u16 = 8;

const SRC: usize = 0;
const DST: usize = 2;
const LEN: usize = 4;
const FLAGS: usize = 6;

const_assert!(FLAGS + 2 == HEADER_SIZE as usize);

bitflags! {
    /// Options for `create_message`
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct MessageFlags: u16 {
        /// Clear the payload before handing it out
        const ZERO_FILL = 1 << 0;
    }
}

fn read_u16(bytes: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([bytes[at], bytes[at + 1]])
}

fn write_u16(bytes: &mut [u8], at: usize, value: u16) {
    bytes[at..at + 2].copy_from_slice(&value.to_le_bytes());
}

/// Outbound message being filled in place
///
/// Derefs to the payload bytes requested from `create_message`.
pub struct TxMessage<'a> {
    buf: QueueBuf<'a>,
    flags: MessageFlags,
}

impl<'a> TxMessage<'a> {
    pub(crate) fn new(mut buf: QueueBuf<'a>, flags: MessageFlags) -> Self {
        if flags.contains(MessageFlags::ZERO_FILL) {
            buf.fill(0);
        }
        Self { buf, flags }
    }

    /// Payload bytes available
    pub fn capacity(&self) -> usize {
        self.buf.len() - HEADER_SIZE as usize
    }

    /// Write the envelope and give the buffer back for sending
    pub(crate) fn seal(mut self, src: u16, dst: u16, len: u16) -> QueueBuf<'a> {
        let flags = self.flags.bits();
        write_u16(&mut self.buf, SRC, src);
        write_u16(&mut self.buf, DST, dst);
        write_u16(&mut self.buf, LEN, len);
        write_u16(&mut self.buf, FLAGS, flags);
        self.buf
    }
}

impl Deref for TxMessage<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.buf[HEADER_SIZE as usize..]
    }
}

impl DerefMut for TxMessage<'_> {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.buf[HEADER_SIZE as usize..]
    }
}

impl fmt::Debug for TxMessage<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TxMessage")
            .field("offset", &self.buf.offset())
            .field("capacity", &self.capacity())
            .field("flags", &self.flags)
            .finish()
    }
}

/// Inbound message, owned until returned with `destroy`
///
/// Derefs to the payload the sender declared.
pub struct RxMessage<'a> {
    buf: QueueBuf<'a>,
    src: u16,
    dst: u16,
    len: u16,
}

impl<'a> RxMessage<'a> {
    /// Unwrap the envelope, handing the buffer back if it is malformed
    pub(crate) fn parse(buf: QueueBuf<'a>) -> core::result::Result<Self, QueueBuf<'a>> {
        if buf.len() < HEADER_SIZE as usize {
            return Err(buf);
        }
        let len = read_u16(&buf, LEN);
        if HEADER_SIZE as usize + len as usize > buf.len() {
            return Err(buf);
        }
        Ok(Self {
            src: read_u16(&buf, SRC),
            dst: read_u16(&buf, DST),
            len,
            buf,
        })
    }

    /// Address of the sending endpoint
    pub fn src(&self) -> u16 {
        self.src
    }

    /// Address of the receiving endpoint
    pub fn dst(&self) -> u16 {
        self.dst
    }

    /// The local endpoint this message was delivered to, for replies
    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new(self.dst)
    }

    pub(crate) fn into_buf(self) -> QueueBuf<'a> {
        self.buf
    }
}

impl Deref for RxMessage<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        let start = HEADER_SIZE as usize;
        &self.buf[start..start + self.len as usize]
    }
}

impl DerefMut for RxMessage<'_> {
    fn deref_mut(&mut self) -> &mut [u8] {
        let start = HEADER_SIZE as usize;
        &mut self.buf[start..start + self.len as usize]
    }
}

impl fmt::Debug for RxMessage<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RxMessage")
            .field("src", &self.src)
            .field("dst", &self.dst)
            .field("len", &self.len)
            .finish()
    }
}
