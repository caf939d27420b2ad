//! OBEX header codec.
//!
//! A header is a one-byte id followed by its value. The two high bits of the
//! id select how the value is framed on the wire:
//!
//! ```text
//! 00  null-terminated UTF-16BE text   hi | len:u16 | text..  | 00 00
//! 01  byte sequence                   hi | len:u16 | bytes..
//! 10  single byte                     hi | value:u8
//! 11  4-byte quantity                 hi | value:u32 BE
//! ```
//!
//! `len` always counts the whole header, prefix included.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tracing::debug;

use crate::error::{ObexError, Result};

/// Size of the `hi | len:u16` prefix of variable-length headers
pub const HEADER_PREFIX_SIZE: usize = 3;

/// Size of a TARGET/WHO capability identifier
pub const TARGET_SIZE: usize = 16;

/// Header identifier (`HI`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HeaderId(pub u8);

impl HeaderId {
    /// Number of objects
    pub const COUNT: Self = Self(0xC0);
    /// Object name (UTF-16BE text)
    pub const NAME: Self = Self(0x01);
    /// Object MIME type (null-terminated ASCII)
    pub const TYPE: Self = Self(0x42);
    /// Object length in bytes
    pub const LENGTH: Self = Self(0xC3);
    /// ISO 8601 timestamp
    pub const TIME: Self = Self(0x44);
    /// Text description
    pub const DESCRIPTION: Self = Self(0x05);
    /// Service the operation is addressed to
    pub const TARGET: Self = Self(0x46);
    /// HTTP 1.x header
    pub const HTTP: Self = Self(0x47);
    /// Chunk of the object body
    pub const BODY: Self = Self(0x48);
    /// Final chunk of the object body
    pub const END_OF_BODY: Self = Self(0x49);
    /// Identifies the responding service
    pub const WHO: Self = Self(0x4A);
    /// Connection id
    pub const CONNECTION: Self = Self(0xCB);
    /// Application parameters
    pub const APP_PARAMETERS: Self = Self(0x4C);

    /// Wire framing selected by the two high bits
    pub fn encoding(self) -> HeaderEncoding {
        match self.0 & 0xC0 {
            0x00 => HeaderEncoding::Unicode,
            0x40 => HeaderEncoding::ByteSequence,
            0x80 => HeaderEncoding::Byte,
            _ => HeaderEncoding::Quad,
        }
    }

    /// Short name for logging
    pub fn name(self) -> &'static str {
        match self {
            Self::COUNT => "COUNT",
            Self::NAME => "NAME",
            Self::TYPE => "TYPE",
            Self::LENGTH => "LENGTH",
            Self::TIME => "TIME",
            Self::DESCRIPTION => "DESCRIPTION",
            Self::TARGET => "TARGET",
            Self::HTTP => "HTTP",
            Self::BODY => "BODY",
            Self::END_OF_BODY => "END_OF_BODY",
            Self::WHO => "WHO",
            Self::CONNECTION => "CONNECTION",
            Self::APP_PARAMETERS => "APP_PARAMETERS",
            _ => "UNKNOWN",
        }
    }
}

/// Header value framing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderEncoding {
    /// Length-prefixed, null-terminated UTF-16BE
    Unicode,
    /// Length-prefixed bytes
    ByteSequence,
    /// One byte
    Byte,
    /// Four bytes, big-endian
    Quad,
}

/// Raw header value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderValue {
    /// UTF-16BE text as received (terminator included)
    Unicode(Bytes),
    /// Byte sequence
    Bytes(Bytes),
    /// Single byte
    U8(u8),
    /// 4-byte quantity
    U32(u32),
}

/// A decoded OBEX header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    /// Header identifier
    pub id: HeaderId,
    /// Header value
    pub value: HeaderValue,
}

impl Header {
    /// NAME header from UTF-8 text
    pub fn name(name: &str) -> Self {
        Self {
            id: HeaderId::NAME,
            value: HeaderValue::Unicode(encode_unicode(name)),
        }
    }

    /// NAME header with no value at all (distinct from an empty string)
    pub fn empty_name() -> Self {
        Self {
            id: HeaderId::NAME,
            value: HeaderValue::Unicode(Bytes::new()),
        }
    }

    /// TYPE header, null terminator appended
    pub fn mime_type(mime: &str) -> Self {
        let mut raw = BytesMut::with_capacity(mime.len() + 1);
        raw.put_slice(mime.as_bytes());
        raw.put_u8(0);
        Self {
            id: HeaderId::TYPE,
            value: HeaderValue::Bytes(raw.freeze()),
        }
    }

    /// LENGTH header
    pub fn length(length: u32) -> Self {
        Self {
            id: HeaderId::LENGTH,
            value: HeaderValue::U32(length),
        }
    }

    /// TIME header (ISO 8601 text, not null-terminated)
    pub fn time(stamp: &str) -> Self {
        Self::bytes(HeaderId::TIME, Bytes::copy_from_slice(stamp.as_bytes()))
    }

    /// CONNECTION header
    pub fn connection(id: u32) -> Self {
        Self {
            id: HeaderId::CONNECTION,
            value: HeaderValue::U32(id),
        }
    }

    /// TARGET header
    pub fn target(uuid: &[u8]) -> Self {
        Self::bytes(HeaderId::TARGET, Bytes::copy_from_slice(uuid))
    }

    /// WHO header
    pub fn who(uuid: &[u8]) -> Self {
        Self::bytes(HeaderId::WHO, Bytes::copy_from_slice(uuid))
    }

    /// BODY header
    pub fn body(data: Bytes) -> Self {
        Self::bytes(HeaderId::BODY, data)
    }

    /// END-OF-BODY header
    pub fn end_of_body(data: Bytes) -> Self {
        Self::bytes(HeaderId::END_OF_BODY, data)
    }

    /// Any byte-sequence header
    pub fn bytes(id: HeaderId, data: Bytes) -> Self {
        Self {
            id,
            value: HeaderValue::Bytes(data),
        }
    }

    /// Raw value bytes; empty for fixed-size headers
    pub fn data(&self) -> &[u8] {
        match &self.value {
            HeaderValue::Unicode(b) | HeaderValue::Bytes(b) => &b[..],
            HeaderValue::U8(_) | HeaderValue::U32(_) => &[],
        }
    }

    /// Value length as the peer declared it (without the prefix)
    pub fn data_len(&self) -> usize {
        match &self.value {
            HeaderValue::Unicode(b) | HeaderValue::Bytes(b) => b.len(),
            HeaderValue::U8(_) => 1,
            HeaderValue::U32(_) => 4,
        }
    }

    /// Value of a 4-byte header
    pub fn as_u32(&self) -> Option<u32> {
        match self.value {
            HeaderValue::U32(v) => Some(v),
            _ => None,
        }
    }

    /// Body chunk carried by a BODY/END-OF-BODY header
    pub fn body_chunk(&self) -> Option<&Bytes> {
        match &self.value {
            HeaderValue::Bytes(b)
                if self.id == HeaderId::BODY || self.id == HeaderId::END_OF_BODY =>
            {
                Some(b)
            },
            _ => None,
        }
    }

    /// Bytes this header occupies on the wire
    pub fn encoded_len(&self) -> usize {
        match &self.value {
            HeaderValue::Unicode(b) | HeaderValue::Bytes(b) => HEADER_PREFIX_SIZE + b.len(),
            HeaderValue::U8(_) => 2,
            HeaderValue::U32(_) => 5,
        }
    }

    /// Append the wire form of this header
    pub fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        buf.put_u8(self.id.0);
        match &self.value {
            HeaderValue::Unicode(b) | HeaderValue::Bytes(b) => {
                let len = u16::try_from(HEADER_PREFIX_SIZE + b.len()).map_err(|_| {
                    ObexError::Protocol(format!("{} header too large", self.id.name()))
                })?;
                buf.put_u16(len);
                buf.put_slice(b);
            },
            HeaderValue::U8(v) => buf.put_u8(*v),
            HeaderValue::U32(v) => buf.put_u32(*v),
        }
        Ok(())
    }

    /// Decode one header from the front of `buf`
    pub fn decode(buf: &mut Bytes) -> Result<Self> {
        if !buf.has_remaining() {
            return Err(ObexError::Parse("empty header".to_string()));
        }
        let id = HeaderId(buf.get_u8());

        let value = match id.encoding() {
            HeaderEncoding::Unicode | HeaderEncoding::ByteSequence => {
                if buf.remaining() < 2 {
                    return Err(ObexError::Parse(format!(
                        "truncated {} header length",
                        id.name()
                    )));
                }
                let len = buf.get_u16() as usize;
                if len < HEADER_PREFIX_SIZE || len - HEADER_PREFIX_SIZE > buf.remaining() {
                    return Err(ObexError::Parse(format!(
                        "{} header length {} overruns packet",
                        id.name(),
                        len
                    )));
                }
                let data = buf.split_to(len - HEADER_PREFIX_SIZE);
                if id.encoding() == HeaderEncoding::Unicode {
                    HeaderValue::Unicode(data)
                } else {
                    HeaderValue::Bytes(data)
                }
            },
            HeaderEncoding::Byte => {
                if !buf.has_remaining() {
                    return Err(ObexError::Parse(format!("truncated {} header", id.name())));
                }
                HeaderValue::U8(buf.get_u8())
            },
            HeaderEncoding::Quad => {
                if buf.remaining() < 4 {
                    return Err(ObexError::Parse(format!("truncated {} header", id.name())));
                }
                HeaderValue::U32(buf.get_u32())
            },
        };

        Ok(Self { id, value })
    }
}

/// Decode every header in `buf`
pub fn decode_headers(mut buf: Bytes) -> Result<Vec<Header>> {
    let mut headers = Vec::new();
    while buf.has_remaining() {
        headers.push(Header::decode(&mut buf)?);
    }
    Ok(headers)
}

/// Convert a UTF-16BE NAME value to UTF-8, dropping the null terminator
pub fn decode_unicode(raw: &[u8]) -> Result<String> {
    if raw.len() % 2 != 0 {
        return Err(ObexError::Parse(format!(
            "odd-length UTF-16 text ({} bytes)",
            raw.len()
        )));
    }

    let text = encoding_rs::UTF_16BE
        .decode_without_bom_handling_and_without_replacement(raw)
        .ok_or_else(|| ObexError::Parse("malformed UTF-16BE text".to_string()))?;

    let text = text.strip_suffix('\0').unwrap_or(&text);
    Ok(text.to_string())
}

/// Convert UTF-8 text to null-terminated UTF-16BE
pub fn encode_unicode(text: &str) -> Bytes {
    let mut raw = BytesMut::with_capacity((text.len() + 1) * 2);
    for unit in text.encode_utf16() {
        raw.put_u16(unit);
    }
    raw.put_u16(0);
    raw.freeze()
}

/// Validate a TYPE value: it must be null-terminated and UTF-8 up to the
/// first null. Returns `None` for values that must be ignored.
pub fn decode_type(raw: &[u8]) -> Option<String> {
    if raw.last() != Some(&0) {
        debug!("Ignoring non-terminated type header");
        return None;
    }

    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    match std::str::from_utf8(&raw[..end]) {
        Ok(mime) => Some(mime.to_string()),
        Err(_) => {
            debug!("Invalid type header: {:?}", &raw[..end]);
            None
        },
    }
}
