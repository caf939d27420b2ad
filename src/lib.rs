//! # OBEX - Object Exchange session engine
//!
//! Server side of the OBEX protocol over an already connected byte stream.
//! One engine serves two profiles sharing the same state machine:
//!
//! - **Object Push**: connectionless, push any object, pull the owner's card
//! - **File Transfer**: connection-oriented (TARGET + connection id), folder
//!   navigation and folder listings
//!
//! ## Protocol Overview
//!
//! ```text
//! Client                              obexd
//!    |                                  |
//!    |------ CONNECT (mtu, TARGET) ---->|  negotiate tx_mtu, allocate id
//!    |<----- SUCCESS (WHO, CONNECTION) -|
//!    |                                  |
//!    |====== PUT / GET / SETPATH ======>|  profile command table
//!    |<===== CONTINUE ... SUCCESS ======|  bodies chunked to the MTU
//!    |                                  |
//!    |------ DISCONNECT --------------->|
//! ```
//!
//! ### Packet Format
//!
//! | Field            | Size     | Notes                                  |
//! |------------------|----------|----------------------------------------|
//! | opcode / status  | 1        | bit 0x80 = FINAL                       |
//! | length           | 2 (BE)   | whole packet                           |
//! | non-header data  | 0, 2, 4  | SETPATH flags, CONNECT parameters      |
//! | headers          | variable | id class selects framing               |
//!
//! ## Quick Start
//!
//! ### Driving the engine directly
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use obex::profiles::FileTransfer;
//! use obex::protocol::{Event, ObexObject, Opcode, Session};
//! use obex::server::SessionManager;
//!
//! let mut session = Session::new(
//!     Arc::new(FileTransfer::new()),
//!     Arc::new(SessionManager::new()),
//!     "/srv/obex",
//! );
//! let mut obj = ObexObject::new(Opcode::Connect, params, headers);
//! session.handle_event(Event::RequestHint, &mut obj);
//! session.handle_event(Event::Request, &mut obj);
//! ```
//!
//! ### Serving over TCP
//!
//! ```rust,ignore
//! use obex::server::{Server, ServerConfig};
//! use obex::protocol::ServiceKind;
//!
//! let config = ServerConfig::default()
//!     .with_service(ServiceKind::FileTransfer)
//!     .with_root("/srv/obex");
//! Server::bind(config).await?.run().await?;
//! ```
//!
//! ## Modules
//!
//! - [`codec`]: Packet and header wire format
//! - [`protocol`]: Session engine, transfers and registry hooks
//! - [`profiles`]: Object Push and File Transfer command tables
//! - [`server`]: TCP listener and packet driver
//! - [`config`]: Configuration management
//! - [`error`]: Error types and result aliases

pub mod codec;
pub mod config;
pub mod error;
pub mod profiles;
pub mod protocol;
pub mod server;

// Re-exports for convenience
pub use codec::{Header, HeaderId, Packet};
pub use config::Config;
pub use error::{ObexError, Result};
pub use profiles::{FileTransfer, ObjectPush};
pub use protocol::{CommandTable, Event, ObexObject, ResponseCode, ServiceKind, Session};
pub use server::{Server, ServerConfig, SessionManager};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
