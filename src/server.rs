//! Relay server
//!
//! Owns the room registry for the lifetime of the process and spawns one
//! session task per accepted connection.

use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::handler::{handle_connection, SessionSettings};
use crate::registry::RoomRegistry;

/// The relay server
pub struct Server {
    registry: Arc<RoomRegistry>,
    settings: SessionSettings,
}

impl Server {
    /// Create a server with an empty room registry
    pub fn new(settings: SessionSettings) -> Self {
        Self {
            registry: Arc::new(RoomRegistry::new()),
            settings,
        }
    }

    pub fn registry(&self) -> &Arc<RoomRegistry> {
        &self.registry
    }

    /// Accept connections until the task is dropped
    ///
    /// Accept errors are logged and do not stop the loop.
    pub async fn run(self, listener: TcpListener) {
        if let Ok(addr) = listener.local_addr() {
            info!("Relay server listening on {}", addr);
        }

        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    debug!("New connection from {}", peer);
                    let registry = Arc::clone(&self.registry);
                    let settings = self.settings;

                    // Spawn handler task for each connection
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, registry, settings).await {
                            warn!(%peer, "Session ended with error: {}", e);
                        }
                    });
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                }
            }
        }
    }
}
