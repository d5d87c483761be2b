//! Configuration for the relay server.
//!
//! Supports both command-line arguments and a TOML configuration file.
//! CLI arguments take precedence over config file values.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use serde::Deserialize;

use crate::broadcast::DEFAULT_BROADCAST_TIMEOUT;
use crate::codec::DEFAULT_MAX_FRAME_BYTES;
use crate::error::ConfigError;
use crate::handler::SessionSettings;
use crate::sink::DEFAULT_OUTBOUND_QUEUE;

/// Command-line arguments for the relay server
#[derive(Parser, Debug, Default)]
#[command(name = "voice_relay")]
#[command(version)]
#[command(about = "Room-based relay for text notices and voice attachments", long_about = None)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Interface to bind to
    #[arg(long)]
    pub host: Option<String>,

    /// TCP port to listen on
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Capacity of each connection's outbound queue
    #[arg(long)]
    pub outbound_queue: Option<usize>,

    /// How long a broadcast or socket write waits on a stalled peer, in milliseconds
    #[arg(long)]
    pub broadcast_timeout_ms: Option<u64>,

    /// Largest accepted incoming frame in bytes
    #[arg(long)]
    pub max_frame_bytes: Option<usize>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    pub log_level: Option<String>,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server-related configuration
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_outbound_queue")]
    pub outbound_queue: usize,
    #[serde(default = "default_broadcast_timeout_ms")]
    pub broadcast_timeout_ms: u64,
    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            outbound_queue: default_outbound_queue(),
            broadcast_timeout_ms: default_broadcast_timeout_ms(),
            max_frame_bytes: default_max_frame_bytes(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5454
}

fn default_outbound_queue() -> usize {
    DEFAULT_OUTBOUND_QUEUE
}

fn default_broadcast_timeout_ms() -> u64 {
    DEFAULT_BROADCAST_TIMEOUT.as_millis() as u64
}

fn default_max_frame_bytes() -> usize {
    DEFAULT_MAX_FRAME_BYTES
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Final resolved configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub outbound_queue: usize,
    pub broadcast_timeout: Duration,
    pub max_frame_bytes: usize,
    pub log_level: String,
}

impl Config {
    /// Load configuration from CLI args and optional TOML file.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_cli(CliArgs::parse())
    }

    /// Resolve parsed CLI args, reading the TOML file they point at
    pub fn from_cli(cli: CliArgs) -> Result<Self, ConfigError> {
        let toml_config = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|e| ConfigError::FileRead(config_path.clone(), e))?;
            toml::from_str(&contents)
                .map_err(|e| ConfigError::TomlParse(config_path.clone(), e))?
        } else {
            TomlConfig::default()
        };

        Self::merge(cli, toml_config)
    }

    /// Merge CLI args over file values (CLI takes precedence)
    pub fn merge(cli: CliArgs, file: TomlConfig) -> Result<Self, ConfigError> {
        let config = Config {
            host: cli.host.unwrap_or(file.server.host),
            port: cli.port.unwrap_or(file.server.port),
            outbound_queue: cli.outbound_queue.unwrap_or(file.server.outbound_queue),
            broadcast_timeout: Duration::from_millis(
                cli.broadcast_timeout_ms
                    .unwrap_or(file.server.broadcast_timeout_ms),
            ),
            max_frame_bytes: cli.max_frame_bytes.unwrap_or(file.server.max_frame_bytes),
            log_level: cli.log_level.unwrap_or(file.logging.level),
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.outbound_queue == 0 {
            return Err(ConfigError::Invalid(
                "outbound_queue must be at least 1".to_string(),
            ));
        }
        if self.max_frame_bytes < 2 {
            return Err(ConfigError::Invalid(
                "max_frame_bytes must be at least 2".to_string(),
            ));
        }
        Ok(())
    }

    /// Address the listener binds to
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            outbound_queue: self.outbound_queue,
            broadcast_timeout: self.broadcast_timeout,
            max_frame_bytes: self.max_frame_bytes,
        }
    }
}
