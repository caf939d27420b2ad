//! OBEX packet framing.
//!
//! ```text
//! ┌────────┬────────────┬──────────────────┬───────────┐
//! │ code   │ length     │ non-header data  │ headers   │
//! │ 1 byte │ u16 BE     │ CONNECT: 4 bytes │ ...       │
//! │        │ (whole pkt)│ SETPATH: 2 bytes │           │
//! └────────┴────────────┴──────────────────┴───────────┘
//! ```
//!
//! `code` is the request opcode or the response code; bit 0x80 is the
//! FINAL bit.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::header::{decode_headers, Header};
use crate::error::{ObexError, Result};

/// Size of the `code | length` packet prefix
pub const PACKET_PREFIX_SIZE: usize = 3;

/// FINAL bit of opcodes and response codes
pub const FINAL_BIT: u8 = 0x80;

/// Size of CONNECT non-header data
pub const CONNECT_DATA_SIZE: usize = 4;

/// Size of SETPATH non-header data
pub const SETPATH_DATA_SIZE: usize = 2;

/// Protocol version sent in CONNECT responses (1.0)
pub const OBEX_VERSION: u8 = 0x10;

/// One request or response packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Opcode or response code, FINAL bit included
    pub code: u8,
    /// Non-header data (CONNECT parameters, SETPATH flags)
    pub non_header: Bytes,
    /// Headers in wire order
    pub headers: Vec<Header>,
}

impl Packet {
    /// Create a packet with no non-header data
    pub fn new(code: u8, headers: Vec<Header>) -> Self {
        Self {
            code,
            non_header: Bytes::new(),
            headers,
        }
    }

    /// Attach non-header data
    pub fn with_non_header(mut self, data: impl Into<Bytes>) -> Self {
        self.non_header = data.into();
        self
    }

    /// Whether the FINAL bit is set
    pub fn is_final(&self) -> bool {
        self.code & FINAL_BIT != 0
    }

    /// Size of the encoded packet
    pub fn encoded_len(&self) -> usize {
        PACKET_PREFIX_SIZE
            + self.non_header.len()
            + self.headers.iter().map(Header::encoded_len).sum::<usize>()
    }

    /// Encode to wire bytes
    pub fn encode(&self) -> Result<Bytes> {
        let total = self.encoded_len();
        let len = u16::try_from(total)
            .map_err(|_| ObexError::Protocol(format!("packet of {total} bytes exceeds 64 KiB")))?;

        let mut buf = BytesMut::with_capacity(total);
        buf.put_u8(self.code);
        buf.put_u16(len);
        buf.put_slice(&self.non_header);
        for header in &self.headers {
            header.encode(&mut buf)?;
        }
        Ok(buf.freeze())
    }

    /// Decode a whole packet whose non-header data is `non_header_len` bytes.
    ///
    /// A packet too short to carry the expected non-header data keeps what it
    /// has, so the command handler can reject it with the proper response.
    pub fn decode(mut frame: Bytes, non_header_len: usize) -> Result<Self> {
        if frame.len() < PACKET_PREFIX_SIZE {
            return Err(ObexError::Parse(format!(
                "packet of {} bytes is shorter than its prefix",
                frame.len()
            )));
        }

        let code = frame.get_u8();
        let len = frame.get_u16() as usize;
        if len != frame.len() + PACKET_PREFIX_SIZE {
            return Err(ObexError::Parse(format!(
                "packet length {} does not match {} received bytes",
                len,
                frame.len() + PACKET_PREFIX_SIZE
            )));
        }

        let non_header = frame.split_to(non_header_len.min(frame.len()));
        let headers = decode_headers(frame)?;

        Ok(Self {
            code,
            non_header,
            headers,
        })
    }
}

/// Non-header data of a CONNECT request or response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectParams {
    /// Protocol version
    pub version: u8,
    /// Connect flags
    pub flags: u8,
    /// Largest packet the sender can receive
    pub mtu: u16,
}

impl ConnectParams {
    /// Parse exactly [`CONNECT_DATA_SIZE`] bytes
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() != CONNECT_DATA_SIZE {
            return None;
        }
        Some(Self {
            version: data[0],
            flags: data[1],
            mtu: u16::from_be_bytes([data[2], data[3]]),
        })
    }

    /// Wire form
    pub fn to_bytes(self) -> Bytes {
        let mut buf = BytesMut::with_capacity(CONNECT_DATA_SIZE);
        buf.put_u8(self.version);
        buf.put_u8(self.flags);
        buf.put_u16(self.mtu);
        buf.freeze()
    }
}

/// SETPATH flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SetPathFlags {
    /// Back up one level before applying the name
    pub backup: bool,
    /// Do not create the folder if it does not exist
    pub no_create: bool,
}

impl SetPathFlags {
    const BACKUP: u8 = 0x01;
    const NO_CREATE: u8 = 0x02;

    /// Parse SETPATH non-header data; missing data reads as no flags
    pub fn parse(data: &[u8]) -> Self {
        let flags = data.first().copied().unwrap_or(0);
        Self {
            backup: flags & Self::BACKUP != 0,
            no_create: flags & Self::NO_CREATE != 0,
        }
    }

    /// Wire form (flags byte, constants byte)
    pub fn to_bytes(self) -> Bytes {
        let mut flags = 0;
        if self.backup {
            flags |= Self::BACKUP;
        }
        if self.no_create {
            flags |= Self::NO_CREATE;
        }
        Bytes::from(vec![flags, 0])
    }
}
