//! Server configuration.
//!
//! Every field has a default, so a partial document deserializes cleanly:
//!
//! ```
//! use predictwire::config::ServerConfig;
//!
//! let config: ServerConfig = serde_json::from_str(r#"{"max_workers": 4}"#).unwrap();
//! assert_eq!(config.max_workers, 4);
//! assert_eq!(config.channel_capacity, 1024);
//! ```

use serde::Deserialize;

use crate::error::{Result, ServeError};
use crate::protocol::DEFAULT_MAX_PAYLOAD_SIZE;

/// Default number of requests dispatched concurrently.
pub const DEFAULT_MAX_WORKERS: usize = 20;

/// Default per-connection outbound frame queue length.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Size of the worker pool shared by all connections.
    pub max_workers: usize,
    /// Largest accepted frame payload, in bytes.
    pub max_payload_size: u32,
    /// Outbound frames buffered per connection before handlers wait.
    pub channel_capacity: usize,
}

impl ServerConfig {
    /// Reject values the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.max_workers == 0 {
            return Err(ServeError::Config("max_workers must be at least 1".into()));
        }
        if self.channel_capacity == 0 {
            return Err(ServeError::Config(
                "channel_capacity must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_workers: DEFAULT_MAX_WORKERS,
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}
