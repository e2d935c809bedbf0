//! Server configuration.
//!
//! The binary builds this from its command line arguments; tests construct it
//! directly.

use std::{path::PathBuf, time::Duration};

use chatrelay_shared::codec::{DEFAULT_MAX_FRAME_LEN, FrameCodec};

use crate::infrastructure::history::DEFAULT_HISTORY_CAPACITY;

/// Seconds a connection may stay silent before it is closed.
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 300;

/// Seconds a single write to a client may block before the connection is dropped.
pub const DEFAULT_WRITE_TIMEOUT_SECS: u64 = 10;

/// Seconds to wait for connections to drain on shutdown.
pub const DEFAULT_SHUTDOWN_GRACE_SECS: u64 = 5;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// JSON-lines history file; history is kept in memory when `None`
    pub history_file: Option<PathBuf>,
    /// Records kept for replay to joining connections
    pub history_capacity: usize,
    pub max_frame_len: usize,
    pub idle_timeout: Duration,
    /// A client that does not read for this long is treated as gone
    pub write_timeout: Duration,
    pub shutdown_grace: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            history_file: None,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
            idle_timeout: Duration::from_secs(DEFAULT_IDLE_TIMEOUT_SECS),
            write_timeout: Duration::from_secs(DEFAULT_WRITE_TIMEOUT_SECS),
            shutdown_grace: Duration::from_secs(DEFAULT_SHUTDOWN_GRACE_SECS),
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Per-connection settings handed to every handler task.
    pub fn connection_settings(&self) -> ConnectionSettings {
        ConnectionSettings {
            codec: FrameCodec::new(self.max_frame_len),
            idle_timeout: self.idle_timeout,
            write_timeout: self.write_timeout,
            close_grace: self.shutdown_grace,
        }
    }
}

/// Settings for one connection handler
#[derive(Debug, Clone, Copy)]
pub struct ConnectionSettings {
    pub codec: FrameCodec,
    pub idle_timeout: Duration,
    pub write_timeout: Duration,
    /// How long the handler waits for its writer to flush when closing
    pub close_grace: Duration,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        ServerConfig::default().connection_settings()
    }
}
