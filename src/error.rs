//! OBEX error types.
//!
//! Every error the engine can hit while serving a request maps to exactly one
//! OBEX response code (see [`ObexError::response_code`]). Protocol violations,
//! missing capabilities and resource failures abort the current request, never
//! the session; only transport errors end a connection.

use thiserror::Error;

use crate::protocol::ResponseCode;

/// OBEX server errors.
#[derive(Error, Debug)]
pub enum ObexError {
    /// Packet or header could not be decoded.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Request is well-formed but violates the protocol.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Mandatory header missing from the request.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Command not offered by the bound profile.
    #[error("Command not implemented: {0}")]
    NotImplemented(&'static str),

    /// Request refused (admission control, permissions, disk space).
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Requested object or folder does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Inbound or outbound body stream failure.
    #[error("Stream error: {0}")]
    Stream(String),

    /// Configuration error.
    #[error("Config error: {0}")]
    Config(String),

    /// System call failure.
    #[error("System error: {0}")]
    Sys(#[from] nix::Error),

    /// I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for OBEX operations
pub type Result<T> = std::result::Result<T, ObexError>;

impl ObexError {
    /// Response code a request failing with this error is answered with.
    pub fn response_code(&self) -> ResponseCode {
        match self {
            ObexError::Parse(_) | ObexError::BadRequest(_) => ResponseCode::BadRequest,
            ObexError::NotImplemented(_) => ResponseCode::NotImplemented,
            ObexError::Protocol(_) | ObexError::Forbidden(_) => ResponseCode::Forbidden,
            ObexError::NotFound(_) => ResponseCode::NotFound,
            ObexError::Io(err) if err.kind() == std::io::ErrorKind::NotFound => {
                ResponseCode::NotFound
            },
            ObexError::Io(err) if err.kind() == std::io::ErrorKind::PermissionDenied => {
                ResponseCode::Forbidden
            },
            ObexError::Stream(_) | ObexError::Config(_) | ObexError::Sys(_) | ObexError::Io(_) => {
                ResponseCode::InternalServerError
            },
        }
    }
}

impl From<toml::de::Error> for ObexError {
    fn from(err: toml::de::Error) -> Self {
        ObexError::Config(err.to_string())
    }
}
