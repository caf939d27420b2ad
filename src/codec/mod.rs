//! OBEX wire codec.
//!
//! - [`header`]: header framing, NAME/TYPE text conversion
//! - [`packet`]: request/response packet framing, CONNECT and SETPATH parameters
//! - [`time`]: TIME header timestamps

pub mod header;
pub mod packet;
pub mod time;

pub use header::{
    decode_headers, decode_type, decode_unicode, encode_unicode, Header, HeaderEncoding, HeaderId,
    HeaderValue, HEADER_PREFIX_SIZE, TARGET_SIZE,
};
pub use packet::{
    ConnectParams, Packet, SetPathFlags, CONNECT_DATA_SIZE, FINAL_BIT, OBEX_VERSION,
    PACKET_PREFIX_SIZE, SETPATH_DATA_SIZE,
};
pub use time::{format_iso8601, parse_iso8601};
