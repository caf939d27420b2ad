//! Request objects exchanged between the transport driver and the engine.
//!
//! An [`ObexObject`] carries one request/response exchange: the request's
//! opcode, non-header data and headers (read through a rewindable cursor),
//! the response code pair, reply headers, and the body chunks flowing in
//! either direction.

use bytes::Bytes;

use crate::codec::{Header, CONNECT_DATA_SIZE, FINAL_BIT, SETPATH_DATA_SIZE};

/// Request opcodes (FINAL bit stripped)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    /// Open a session
    Connect,
    /// Close the session
    Disconnect,
    /// Send an object
    Put,
    /// Fetch an object
    Get,
    /// Change the current folder
    SetPath,
    /// Abort the request in progress
    Abort,
    /// Anything else
    Unknown(u8),
}

impl Opcode {
    /// Classify a wire opcode
    pub fn from_byte(b: u8) -> Self {
        match b & !FINAL_BIT {
            0x00 => Self::Connect,
            0x01 => Self::Disconnect,
            0x02 => Self::Put,
            0x03 => Self::Get,
            0x05 => Self::SetPath,
            0x7F => Self::Abort,
            other => Self::Unknown(other),
        }
    }

    /// Wire opcode with the FINAL bit set as requested
    pub fn to_byte(self, last: bool) -> u8 {
        let code = match self {
            Self::Connect => 0x00,
            Self::Disconnect => 0x01,
            Self::Put => 0x02,
            Self::Get => 0x03,
            Self::SetPath => 0x05,
            Self::Abort => 0x7F,
            Self::Unknown(other) => other & !FINAL_BIT,
        };
        if last {
            code | FINAL_BIT
        } else {
            code
        }
    }

    /// Length of the non-header data that follows the packet prefix
    pub fn non_header_len(self) -> usize {
        match self {
            Self::Connect => CONNECT_DATA_SIZE,
            Self::SetPath => SETPATH_DATA_SIZE,
            _ => 0,
        }
    }

    /// Command name for logging
    pub fn name(self) -> &'static str {
        match self {
            Self::Connect => "CONNECT",
            Self::Disconnect => "DISCONNECT",
            Self::Put => "PUT",
            Self::Get => "GET",
            Self::SetPath => "SETPATH",
            Self::Abort => "ABORT",
            Self::Unknown(_) => "UNKNOWN",
        }
    }
}

/// Response codes (FINAL bit stripped)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ResponseCode {
    /// More packets follow
    Continue = 0x10,
    /// Request completed
    Success = 0x20,
    /// Object created
    Created = 0x21,
    /// Malformed request or missing mandatory header
    BadRequest = 0x40,
    /// Authentication required
    Unauthorized = 0x41,
    /// Request refused
    Forbidden = 0x43,
    /// Object not found
    NotFound = 0x44,
    /// Server failure
    InternalServerError = 0x50,
    /// Command not supported
    NotImplemented = 0x51,
    /// Service unavailable (connection id mismatch)
    ServiceUnavailable = 0x53,
}

impl ResponseCode {
    /// Wire byte (FINAL bit always set on responses)
    pub fn to_wire(self) -> u8 {
        self as u8 | FINAL_BIT
    }

    /// Decode a wire response byte
    pub fn from_wire(b: u8) -> Option<Self> {
        let code = match b & !FINAL_BIT {
            0x10 => Self::Continue,
            0x20 => Self::Success,
            0x21 => Self::Created,
            0x40 => Self::BadRequest,
            0x41 => Self::Unauthorized,
            0x43 => Self::Forbidden,
            0x44 => Self::NotFound,
            0x50 => Self::InternalServerError,
            0x51 => Self::NotImplemented,
            0x53 => Self::ServiceUnavailable,
            _ => return None,
        };
        Some(code)
    }

    /// Whether the code reports a failure
    pub fn is_error(self) -> bool {
        (self as u8) >= 0x40
    }
}

/// Response code pair: `next` answers non-final exchanges, `last` the final one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Response {
    /// Code for intermediate packets
    pub next: ResponseCode,
    /// Code for the final packet
    pub last: ResponseCode,
}

impl Response {
    /// Provisional "continue" (CONTINUE while packets flow, SUCCESS at the end)
    pub const PROCEED: Self = Self {
        next: ResponseCode::Continue,
        last: ResponseCode::Success,
    };

    /// Same code for every packet
    pub fn single(code: ResponseCode) -> Self {
        Self {
            next: code,
            last: code,
        }
    }

    /// Whether the exchange may carry on
    pub fn proceeds(&self) -> bool {
        self.next == ResponseCode::Continue
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::PROCEED
    }
}

/// Direction of the body stream of an object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BodyStream {
    /// No body streaming
    #[default]
    None,
    /// Inbound chunks are delivered one at a time (PUT)
    Inbound,
    /// Outbound chunks are pulled on demand (GET response)
    Outbound,
    /// Outbound stream sent its END-OF-BODY
    Finished,
}

/// One request/response exchange
#[derive(Debug, Clone)]
pub struct ObexObject {
    opcode: Opcode,
    non_header: Bytes,
    headers: Vec<Header>,
    cursor: usize,
    response: Response,
    reply_headers: Vec<Header>,
    stream: BodyStream,
    inbound: Option<Bytes>,
}

impl ObexObject {
    /// Create an object for an incoming request
    pub fn new(opcode: Opcode, non_header: Bytes, headers: Vec<Header>) -> Self {
        Self {
            opcode,
            non_header,
            headers,
            cursor: 0,
            response: Response::default(),
            reply_headers: Vec::new(),
            stream: BodyStream::None,
            inbound: None,
        }
    }

    /// Request opcode
    pub fn opcode(&self) -> Opcode {
        self.opcode
    }

    /// Request non-header data
    pub fn non_header(&self) -> &[u8] {
        &self.non_header
    }

    /// Append headers from a continuation packet
    pub fn append_headers(&mut self, headers: impl IntoIterator<Item = Header>) {
        self.headers.extend(headers);
    }

    /// Next request header, or `None` once all were read
    pub fn next_header(&mut self) -> Option<Header> {
        let header = self.headers.get(self.cursor).cloned()?;
        self.cursor += 1;
        Some(header)
    }

    /// Make every request header readable again
    pub fn rewind_headers(&mut self) {
        self.cursor = 0;
    }

    /// Current response code pair
    pub fn response(&self) -> Response {
        self.response
    }

    /// Set the response code pair
    pub fn set_response(&mut self, next: ResponseCode, last: ResponseCode) {
        self.response = Response { next, last };
    }

    /// Answer every remaining packet with `code`
    pub fn respond(&mut self, code: ResponseCode) {
        self.response = Response::single(code);
    }

    /// Add a reply header
    pub fn add_header(&mut self, header: Header) {
        self.reply_headers.push(header);
    }

    /// Reply headers queued so far
    pub fn reply_headers(&self) -> &[Header] {
        &self.reply_headers
    }

    /// Drain the queued reply headers
    pub fn take_reply_headers(&mut self) -> Vec<Header> {
        std::mem::take(&mut self.reply_headers)
    }

    /// Body stream state
    pub fn body_stream(&self) -> BodyStream {
        self.stream
    }

    /// Deliver request body as separate stream events
    pub fn enable_inbound_stream(&mut self) {
        self.stream = BodyStream::Inbound;
    }

    /// Hand the next inbound body chunk to the engine
    pub fn deliver_chunk(&mut self, chunk: Bytes) {
        self.inbound = Some(chunk);
    }

    /// Take the inbound chunk delivered with the current stream event
    pub fn read_stream(&mut self) -> Option<Bytes> {
        self.inbound.take()
    }

    /// Answer with a body pulled chunk by chunk
    pub fn start_body_stream(&mut self) {
        self.stream = BodyStream::Outbound;
    }

    /// Whether an outbound body still has to be pulled
    pub fn is_streaming_out(&self) -> bool {
        self.stream == BodyStream::Outbound
    }

    /// Queue one outbound chunk; `end` marks the end of the stream
    pub fn push_body(&mut self, chunk: Bytes, end: bool) {
        if end {
            self.reply_headers.push(Header::end_of_body(chunk));
            self.stream = BodyStream::Finished;
        } else {
            self.reply_headers.push(Header::body(chunk));
        }
    }
}
