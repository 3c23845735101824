//! TOML configuration with every field defaulted.
//!
//! ```toml
//! [server]
//! address = "0.0.0.0"
//! port = 8000
//!
//! [client]
//! base_url = "http://chat.example:8000"
//! username = "ann"
//!
//! [backoff]
//! max_secs = 32
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::backoff::{ReconnectBackoff, DEFAULT_INITIAL_SECS, DEFAULT_MAX_SECS};
use crate::error::ChatError;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub client: ClientConfig,
    pub backoff: BackoffConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub address: String,
    pub port: u16,
    /// Directory served for paths that are not API routes.
    pub static_dir: PathBuf,
    /// JSON history file.
    pub store_path: PathBuf,
    /// Broadcast queue depth; slower listeners skip what they miss.
    pub channel_capacity: usize,
    /// Seconds between keep-alive comments on idle event streams. 0 disables.
    pub heartbeat_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1".to_string(),
            port: 8000,
            static_dir: PathBuf::from("static"),
            store_path: PathBuf::from("static/messages.json"),
            channel_capacity: 1024,
            heartbeat_secs: 30,
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }

    pub fn heartbeat(&self) -> Option<Duration> {
        (self.heartbeat_secs > 0).then(|| Duration::from_secs(self.heartbeat_secs))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClientConfig {
    pub base_url: String,
    pub connect_timeout_secs: u64,
    pub username: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000".to_string(),
            connect_timeout_secs: 3,
            username: "guest".to_string(),
        }
    }
}

impl ClientConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BackoffConfig {
    pub initial_secs: u64,
    pub max_secs: u64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_secs: DEFAULT_INITIAL_SECS,
            max_secs: DEFAULT_MAX_SECS,
        }
    }
}

impl BackoffConfig {
    pub fn build(&self) -> ReconnectBackoff {
        ReconnectBackoff::new(self.initial_secs, self.max_secs)
    }
}

impl Config {
    /// Parse a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self, ChatError> {
        Ok(toml::from_str(s)?)
    }

    /// Load from `path`, or return defaults when no path is given.
    ///
    /// A path that was given but cannot be read is an error.
    pub fn load(path: Option<&Path>) -> Result<Self, ChatError> {
        match path {
            Some(p) => Self::from_toml_str(&std::fs::read_to_string(p)?),
            None => Ok(Self::default()),
        }
    }
}
