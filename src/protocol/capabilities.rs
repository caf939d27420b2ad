//! Profile command tables.
//!
//! A profile exposes a subset of GET/PUT/CHKPUT/SETPATH. The engine consults
//! [`CommandCaps`] before dispatching, so a command the profile does not
//! offer is answered NOT IMPLEMENTED without touching the profile.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::message::ObexObject;
use super::session::SessionState;
use super::FTP_TARGET;
use crate::codec::SetPathFlags;
use crate::error::{ObexError, Result};

/// OBEX services served by the engine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ServiceKind {
    /// Connectionless Object Push (no TARGET, no connection id)
    #[default]
    #[serde(rename = "opp", alias = "object-push")]
    ObjectPush,
    /// Connection-oriented File Transfer (TARGET + connection id)
    #[serde(rename = "ftp", alias = "file-transfer")]
    FileTransfer,
}

impl ServiceKind {
    /// Capability identifier a CONNECT must carry, if any
    pub fn target(self) -> Option<&'static [u8; 16]> {
        match self {
            Self::ObjectPush => None,
            Self::FileTransfer => Some(&FTP_TARGET),
        }
    }

    /// Whether requests must present the session's connection id
    pub fn uses_connection_id(self) -> bool {
        self.target().is_some()
    }

    /// Descriptive name
    pub fn name(self) -> &'static str {
        match self {
            Self::ObjectPush => "Object Push",
            Self::FileTransfer => "File Transfer",
        }
    }
}

impl std::fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ServiceKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "opp" | "opush" | "object-push" => Ok(Self::ObjectPush),
            "ftp" | "file-transfer" => Ok(Self::FileTransfer),
            _ => Err(format!("Unknown OBEX service: {}", s)),
        }
    }
}

/// Commands a profile implements
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommandCaps {
    /// GET fulfiller
    pub get: bool,
    /// PUT fulfiller
    pub put: bool,
    /// PUT admission check
    pub chkput: bool,
    /// SETPATH fulfiller
    pub setpath: bool,
}

impl CommandCaps {
    /// Every command
    pub fn all() -> Self {
        Self {
            get: true,
            put: true,
            chkput: true,
            setpath: true,
        }
    }

    /// Add GET
    pub fn with_get(mut self) -> Self {
        self.get = true;
        self
    }

    /// Add PUT
    pub fn with_put(mut self) -> Self {
        self.put = true;
        self
    }

    /// Add the PUT admission check
    pub fn with_chkput(mut self) -> Self {
        self.chkput = true;
        self
    }

    /// Add SETPATH
    pub fn with_setpath(mut self) -> Self {
        self.setpath = true;
        self
    }
}

/// Per-profile command table.
///
/// Only the commands listed in [`CommandTable::capabilities`] are ever
/// called; the default bodies report the command as not implemented.
///
/// Fulfillers read the request's decoded NAME/TYPE and the current folder
/// from [`SessionState`], stage transfers through it, and add reply headers
/// or a response code on the [`ObexObject`]. An `Err` is turned into the
/// matching response code by the engine.
pub trait CommandTable: Send + Sync {
    /// Service this table serves
    fn service(&self) -> ServiceKind;

    /// Commands offered
    fn capabilities(&self) -> CommandCaps;

    /// Fulfill a GET
    fn get(&self, _session: &mut SessionState, _obj: &mut ObexObject) -> Result<()> {
        Err(ObexError::NotImplemented("GET"))
    }

    /// Fulfill a PUT once admission passed
    fn put(&self, _session: &mut SessionState, _obj: &mut ObexObject) -> Result<()> {
        Err(ObexError::NotImplemented("PUT"))
    }

    /// Profile-specific PUT admission; usually opens the destination
    fn chkput(&self, _session: &mut SessionState, _obj: &mut ObexObject) -> Result<()> {
        Err(ObexError::NotImplemented("CHKPUT"))
    }

    /// Compute the folder a SETPATH leads to
    fn setpath(
        &self,
        _session: &mut SessionState,
        _name: Option<&str>,
        _flags: SetPathFlags,
    ) -> Result<PathBuf> {
        Err(ObexError::NotImplemented("SETPATH"))
    }
}
