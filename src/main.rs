//! Relay Server - Entry Point
//!
//! Loads configuration, binds the TCP listener and runs the server.

use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use voice_relay::{Config, Server};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;

    // RUST_LOG takes precedence over the configured level
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(format!("voice_relay={}", config.log_level))),
        )
        .init();

    info!(
        listen = %config.listen_addr(),
        outbound_queue = config.outbound_queue,
        broadcast_timeout_ms = config.broadcast_timeout.as_millis() as u64,
        max_frame_bytes = config.max_frame_bytes,
        "Starting relay server"
    );

    // Failing to bind is the only fatal runtime error
    let listener = TcpListener::bind(config.listen_addr()).await?;
    Server::new(config.session_settings()).run(listener).await;

    Ok(())
}
