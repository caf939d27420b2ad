//! OBEX server over TCP.
//!
//! Accepts connections and drives one session engine per connection:
//! - Object Push or File Transfer, selected by [`ServerConfig::service`]
//! - Connection ids and transfer status tracked by [`SessionManager`]
//!
//! # Example
//!
//! ```rust,ignore
//! use obex::server::{Server, ServerConfig};
//!
//! let config = ServerConfig::default().with_port(6650).with_root("/srv/obex");
//! let server = Server::bind(config).await?;
//! server.run().await?;
//! ```

mod config;
mod handlers;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{info, info_span, warn, Instrument};

pub use config::{ServerConfig, DEFAULT_PORT};
pub use handlers::{read_packet, serve_connection, write_packet};
pub use state::{AppState, SessionManager, TransferRecord, TransferStatus};

use crate::error::Result;

/// Listening OBEX server
pub struct Server {
    listener: TcpListener,
    state: Arc<AppState>,
}

impl Server {
    /// Bind the configured address
    pub async fn bind(config: ServerConfig) -> Result<Self> {
        let listener = TcpListener::bind(config.addr).await?;
        Ok(Self::from_listener(listener, config))
    }

    /// Serve on an already bound listener
    pub fn from_listener(listener: TcpListener, config: ServerConfig) -> Self {
        Self {
            listener,
            state: Arc::new(AppState::new(config)),
        }
    }

    /// Address actually bound
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Shared state
    pub fn state(&self) -> Arc<AppState> {
        Arc::clone(&self.state)
    }

    /// Accept connections until accepting fails
    pub async fn run(self) -> Result<()> {
        info!(
            "{} server listening on {} (root {})",
            self.state.config.service,
            self.local_addr()?,
            self.state.config.root.display()
        );

        loop {
            let (stream, peer) = self.listener.accept().await?;
            let session = self.state.new_session();
            let span = info_span!("conn", id = %uuid::Uuid::new_v4(), %peer);

            tokio::spawn(
                async move {
                    info!("Connection accepted");
                    match serve_connection(stream, session).await {
                        Ok(()) => info!("Connection closed"),
                        Err(e) => warn!("Connection ended: {}", e),
                    }
                }
                .instrument(span),
            );
        }
    }
}
