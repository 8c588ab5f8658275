//! Datagram framing for the UDP transport.
//!
//! Every datagram starts with a fixed [`FrameHeader`]. A DATA frame is
//! followed by a JSON-encoded [`Message`]; an ACK frame has no body and
//! echoes the sequence number of the DATA frame it acknowledges.
//!
//! The header is `#[repr(C, packed)]` with zerocopy derives. Multi-byte
//! fields are stored big-endian; use the accessors rather than the raw
//! fields.

use static_assertions::assert_eq_size;
use zerocopy::{AsBytes, FromBytes, FromZeroes};

use crate::message::{Message, MessageError};

/// "RMSH".
pub const FRAME_MAGIC: u32 = 0x524d_5348;

pub const FRAME_VERSION: u8 = 0x01;

pub const FLAG_DATA: u8 = 0x01;
pub const FLAG_ACK: u8 = 0x02;

/// Largest datagram the transport will build or accept.
pub const MAX_DATAGRAM: usize = 64 * 1024;

/// Wire size: 16 bytes.
#[derive(Debug, Clone, AsBytes, FromBytes, FromZeroes)]
#[repr(C, packed)]
pub struct FrameHeader {
    magic: u32,
    pub version: u8,
    /// Exactly one of FLAG_DATA / FLAG_ACK.
    pub flags: u8,
    /// Reserved, must be zero.
    pub reserved: u16,
    seq: u64,
}

assert_eq_size!(FrameHeader, [u8; 16]);

impl FrameHeader {
    pub fn new(flags: u8, seq: u64) -> Self {
        Self {
            magic: FRAME_MAGIC.to_be(),
            version: FRAME_VERSION,
            flags,
            reserved: 0,
            seq: seq.to_be(),
        }
    }

    pub fn magic(&self) -> u32 {
        u32::from_be(self.magic)
    }

    pub fn seq(&self) -> u64 {
        u64::from_be(self.seq)
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum WireError {
    #[error("datagram too short: {0} bytes")]
    TooShort(usize),
    #[error("datagram too large: {0} bytes")]
    TooLarge(usize),
    #[error("bad frame magic {0:#010x}")]
    BadMagic(u32),
    #[error("unsupported frame version {0}")]
    UnsupportedVersion(u8),
    #[error("invalid frame flags {0:#04x}")]
    InvalidFlags(u8),
    #[error(transparent)]
    Message(#[from] MessageError),
}

/// A decoded datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Data { seq: u64, message: Message },
    Ack { seq: u64 },
}

pub fn encode_data(seq: u64, message: &Message) -> Result<Vec<u8>, WireError> {
    let body = message.encode()?;
    let header = FrameHeader::new(FLAG_DATA, seq);
    let mut buf = Vec::with_capacity(std::mem::size_of::<FrameHeader>() + body.len());
    buf.extend_from_slice(header.as_bytes());
    buf.extend_from_slice(&body);
    if buf.len() > MAX_DATAGRAM {
        return Err(WireError::TooLarge(buf.len()));
    }
    Ok(buf)
}

pub fn encode_ack(seq: u64) -> Vec<u8> {
    FrameHeader::new(FLAG_ACK, seq).as_bytes().to_vec()
}

pub fn decode_frame(buf: &[u8]) -> Result<Frame, WireError> {
    let header = FrameHeader::read_from_prefix(buf).ok_or(WireError::TooShort(buf.len()))?;
    if header.magic() != FRAME_MAGIC {
        return Err(WireError::BadMagic(header.magic()));
    }
    if header.version != FRAME_VERSION {
        return Err(WireError::UnsupportedVersion(header.version));
    }
    let body = &buf[std::mem::size_of::<FrameHeader>()..];
    match header.flags {
        FLAG_ACK => Ok(Frame::Ack { seq: header.seq() }),
        FLAG_DATA => Ok(Frame::Data {
            seq: header.seq(),
            message: Message::decode(body)?,
        }),
        other => Err(WireError::InvalidFlags(other)),
    }
}
