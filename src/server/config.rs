//! Server configuration.

use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use crate::protocol::{ServiceKind, SessionOptions};

/// Default listen port
pub const DEFAULT_PORT: u16 = 6650;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address
    pub addr: SocketAddr,
    /// Profile served to every connection
    pub service: ServiceKind,
    /// Folder sessions start in
    pub root: PathBuf,
    /// Business card served by Object Push
    pub vcard: PathBuf,
    /// MTU settings for new sessions
    pub options: SessionOptions,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from((Ipv4Addr::LOCALHOST, DEFAULT_PORT)),
            service: ServiceKind::default(),
            root: PathBuf::from("."),
            vcard: PathBuf::from("vcard.vcf"),
            options: SessionOptions::default(),
        }
    }
}

impl ServerConfig {
    /// Create with custom port
    pub fn with_port(mut self, port: u16) -> Self {
        self.addr.set_port(port);
        self
    }

    /// Bind to all interfaces
    pub fn bind_all(mut self) -> Self {
        self.addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.addr.port()));
        self
    }

    /// Set address directly
    pub fn with_addr(mut self, addr: SocketAddr) -> Self {
        self.addr = addr;
        self
    }

    /// Serve another profile
    pub fn with_service(mut self, service: ServiceKind) -> Self {
        self.service = service;
        self
    }

    /// Set the root folder
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    /// Set the business card file
    pub fn with_vcard(mut self, vcard: impl Into<PathBuf>) -> Self {
        self.vcard = vcard.into();
        self
    }

    /// Set MTU settings
    pub fn with_options(mut self, options: SessionOptions) -> Self {
        self.options = options;
        self
    }
}
