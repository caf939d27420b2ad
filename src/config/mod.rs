//! Configuration management.
//!
//! Supports configuration from:
//! - TOML config files
//! - Environment variables (`OBEXD_*`)
//! - CLI arguments (for `obexd serve`)

use std::net::SocketAddr;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{ObexError, Result};
use crate::protocol::{
    ServiceKind, SessionOptions, DEFAULT_HEADER_MARGIN, DEFAULT_RX_MTU, DEFAULT_TX_MTU,
};
use crate::server::ServerConfig;

/// Smallest packet every OBEX peer must accept
const MIN_PACKET_SIZE: usize = 255;

/// Largest packet the u16 length field can describe
const MAX_PACKET_SIZE: usize = 65535;

/// Main configuration struct
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Listener configuration
    #[serde(default)]
    pub server: ServiceConfig,

    /// Protocol parameters
    #[serde(default)]
    pub obex: ObexConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let content = std::fs::read_to_string(&path).map_err(|e| {
            ObexError::Config(format!("Failed to read config file {}: {e}", path.display()))
        })?;

        toml::from_str(&content)
            .map_err(|e| ObexError::Config(format!("Failed to parse config: {e}")))
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        // Listener settings
        if let Ok(host) = std::env::var("OBEXD_HOST") {
            config.server.host = host;
        }
        if let Ok(port) = std::env::var("OBEXD_PORT") {
            if let Ok(port) = port.parse() {
                config.server.port = port;
            }
        }
        if let Ok(service) = std::env::var("OBEXD_SERVICE") {
            if let Ok(service) = service.parse() {
                config.server.service = service;
            }
        }
        if let Ok(root) = std::env::var("OBEXD_ROOT") {
            config.server.root = PathBuf::from(root);
        }
        if let Ok(vcard) = std::env::var("OBEXD_VCARD") {
            config.server.vcard = PathBuf::from(vcard);
        }

        // Protocol settings
        if let Ok(val) = std::env::var("OBEXD_RX_MTU") {
            if let Ok(val) = val.parse() {
                config.obex.rx_mtu = val;
            }
        }
        if let Ok(val) = std::env::var("OBEXD_TX_MTU") {
            if let Ok(val) = val.parse() {
                config.obex.tx_mtu = val;
            }
        }
        if let Ok(val) = std::env::var("OBEXD_HEADER_MARGIN") {
            if let Ok(val) = val.parse() {
                config.obex.header_margin = val;
            }
        }

        config
    }

    /// Merge with another config (other takes precedence where it differs
    /// from the defaults)
    pub fn merge(self, other: Self) -> Self {
        fn pick<T: PartialEq>(base: T, over: T, default: T) -> T {
            if over != default {
                over
            } else {
                base
            }
        }

        let server = ServiceConfig::default();
        let obex = ObexConfig::default();
        Self {
            server: ServiceConfig {
                host: pick(self.server.host, other.server.host, server.host),
                port: pick(self.server.port, other.server.port, server.port),
                service: pick(self.server.service, other.server.service, server.service),
                root: pick(self.server.root, other.server.root, server.root),
                vcard: pick(self.server.vcard, other.server.vcard, server.vcard),
            },
            obex: ObexConfig {
                rx_mtu: pick(self.obex.rx_mtu, other.obex.rx_mtu, obex.rx_mtu),
                tx_mtu: pick(self.obex.tx_mtu, other.obex.tx_mtu, obex.tx_mtu),
                header_margin: pick(
                    self.obex.header_margin,
                    other.obex.header_margin,
                    obex.header_margin,
                ),
            },
        }
    }

    /// Check protocol parameters
    pub fn validate(&self) -> Result<()> {
        for (key, mtu) in [("rx_mtu", self.obex.rx_mtu), ("tx_mtu", self.obex.tx_mtu)] {
            if !(MIN_PACKET_SIZE..=MAX_PACKET_SIZE).contains(&mtu) {
                return Err(ObexError::Config(format!(
                    "{key} {mtu} outside {MIN_PACKET_SIZE}..={MAX_PACKET_SIZE}"
                )));
            }
        }
        if self.obex.header_margin >= MIN_PACKET_SIZE {
            return Err(ObexError::Config(format!(
                "header_margin {} leaves no room for a body in a {MIN_PACKET_SIZE}-byte packet",
                self.obex.header_margin
            )));
        }
        Ok(())
    }

    /// Build the server configuration
    pub fn to_server_config(&self) -> Result<ServerConfig> {
        self.validate()?;
        let addr: SocketAddr = self
            .server
            .listen_addr()
            .parse()
            .map_err(|e| ObexError::Config(format!("Invalid listen address: {e}")))?;

        Ok(ServerConfig::default()
            .with_addr(addr)
            .with_service(self.server.service)
            .with_root(self.server.root.clone())
            .with_vcard(self.server.vcard.clone())
            .with_options(self.obex.to_session_options()))
    }
}

/// Listener configuration (`[server]`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Profile served on this listener
    pub service: ServiceKind,

    /// Folder sessions start in and cannot leave
    pub root: PathBuf,

    /// Business card served by Object Push
    pub vcard: PathBuf,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 6650,
            service: ServiceKind::ObjectPush,
            root: default_root(),
            vcard: dirs::config_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("obexd")
                .join("vcard.vcf"),
        }
    }
}

impl ServiceConfig {
    /// Get the full listen address
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn default_root() -> PathBuf {
    dirs::download_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Protocol parameters (`[obex]`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObexConfig {
    /// Largest packet accepted from peers
    pub rx_mtu: usize,

    /// Outbound chunk size before CONNECT
    pub tx_mtu: usize,

    /// Bytes reserved for headers in each outbound packet
    pub header_margin: usize,
}

impl Default for ObexConfig {
    fn default() -> Self {
        Self {
            rx_mtu: DEFAULT_RX_MTU,
            tx_mtu: DEFAULT_TX_MTU,
            header_margin: DEFAULT_HEADER_MARGIN,
        }
    }
}

impl ObexConfig {
    /// Session settings derived from this section
    pub fn to_session_options(self) -> SessionOptions {
        SessionOptions {
            rx_mtu: self.rx_mtu,
            tx_mtu: self.tx_mtu,
            header_margin: self.header_margin,
        }
    }
}
