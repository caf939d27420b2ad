//! OBEX session engine.
//!
//! Implements the server side of OBEX: CONNECT negotiation, connection-id
//! validation, GET/PUT/SETPATH dispatch to a profile's command table, and
//! body streaming bounded by the negotiated MTU.
//!
//! # Request Flow
//!
//! ```text
//! Client                                Server
//!    |                                    |
//!    |-- CONNECT (mtu, TARGET) ---------->|  tx_mtu = mtu - margin
//!    |<------- SUCCESS (WHO, CONNECTION) -|  id allocated
//!    |                                    |
//!    |-- PUT (CONNECTION, NAME, LENGTH) ->|  admission control
//!    |<------------------------ CONTINUE -|
//!    |-- PUT (BODY) --------------------->|  written through
//!    |<------------------------ CONTINUE -|
//!    |-- PUT final (END-OF-BODY) -------->|
//!    |<------------------------- SUCCESS -|  transfer completed
//!    |                                    |
//!    |-- GET final (CONNECTION, NAME) --->|
//!    |<----------------- CONTINUE (BODY) -|  one chunk per request
//!    |-- GET final ---------------------->|
//!    |<---------- SUCCESS (END-OF-BODY) --|
//!    |                                    |
//!    |-- DISCONNECT --------------------->|
//!    |<------------------------- SUCCESS -|  transport torn down
//! ```
//!
//! ## Events
//!
//! | Event             | Engine action                                        |
//! |-------------------|------------------------------------------------------|
//! | `RequestHint`     | classify command, provisional CONTINUE or NOT IMPL.  |
//! | `RequestCheck`    | eager PUT admission                                  |
//! | `Request`         | dispatch CONNECT/GET/PUT/SETPATH                     |
//! | `StreamAvailable` | accept one inbound body chunk                        |
//! | `StreamEmpty`     | produce one outbound body chunk                      |
//! | `Progress`        | forward offset/size to the registry                  |
//! | `Abort`           | reset the request, answer SUCCESS                    |
//! | `RequestDone`     | report completion, reset; DISCONNECT ends the link   |
//!
//! ## Profiles
//!
//! | Service       | TARGET          | Connection id | Commands                 |
//! |---------------|-----------------|---------------|--------------------------|
//! | Object Push   | none            | not checked   | GET, PUT                 |
//! | File Transfer | [`FTP_TARGET`]  | required      | GET, PUT, SETPATH        |

mod capabilities;
mod message;
mod registry;
mod session;
mod transfer;

pub use capabilities::{CommandCaps, CommandTable, ServiceKind};
pub use message::{BodyStream, ObexObject, Opcode, Response, ResponseCode};
pub use registry::{ConnectionId, SessionRegistry};
pub use session::{
    Control, Event, FreeSpaceFn, RequestState, Session, SessionOptions, SessionState,
};
pub use transfer::{available_space, ObjectSize, Transfer};

/// Largest packet accepted from a peer
pub const DEFAULT_RX_MTU: usize = 32767;

/// Outbound chunk size before CONNECT negotiates one
pub const DEFAULT_TX_MTU: usize = 32767;

/// Bytes reserved for headers when sizing outbound chunks
pub const DEFAULT_HEADER_MARGIN: usize = 200;

/// Smallest outbound chunk (minimum OBEX packet of 255 minus the margin)
pub const MIN_TX_MTU: usize = 55;

/// File Transfer service identifier, F9EC7BC4-953C-11D2-984E-525400DC9E09
pub const FTP_TARGET: [u8; 16] = [
    0xF9, 0xEC, 0x7B, 0xC4, 0x95, 0x3C, 0x11, 0xD2, 0x98, 0x4E, 0x52, 0x54, 0x00, 0xDC, 0x9E,
    0x09,
];
