//! Optional TOML configuration file.
//!
//! Every key is optional; absent keys leave the built-in default (or the
//! value from an earlier layer) untouched.  Keys are named after the
//! [`BridgeConfig`] fields, with durations given in milliseconds:
//!
//! ```toml
//! osc_listen_addr = "0.0.0.0:9000"
//! osc_upstream_addr = "console.local:8001"
//! ws_bind_addr = "127.0.0.1:8080"
//! ws_path = "/osc"
//! session_send_timeout_ms = 2000
//! log_level = "debug"
//! ```

use std::net::{SocketAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::domain::config::BridgeConfig;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum FileConfigError {
    #[error("I/O error reading config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid address for `{key}`: {value:?} ({reason})")]
    InvalidAddress {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// On-disk configuration, one optional entry per setting.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub osc_listen_addr: Option<String>,
    pub osc_upstream_addr: Option<String>,
    pub ws_bind_addr: Option<String>,
    pub ws_path: Option<String>,
    pub max_frame_len: Option<usize>,
    pub session_queue_capacity: Option<usize>,
    pub session_send_timeout_ms: Option<u64>,
    pub upstream_retry_attempts: Option<u32>,
    pub upstream_retry_backoff_ms: Option<u64>,
    pub upstream_write_timeout_ms: Option<u64>,
    pub shutdown_timeout_ms: Option<u64>,
    /// `tracing` filter directive, e.g. `"info"` or `"osc_bridge=debug"`.
    pub log_level: Option<String>,
}

impl FileConfig {
    /// Reads and parses the file at `path`.
    pub fn load(path: &Path) -> Result<Self, FileConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| FileConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, FileConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Overwrites the fields of `config` that this file sets.
    pub fn apply_to(&self, config: &mut BridgeConfig) -> Result<(), FileConfigError> {
        if let Some(v) = &self.osc_listen_addr {
            config.osc_listen_addr = resolve_key("osc_listen_addr", v)?;
        }
        if let Some(v) = &self.osc_upstream_addr {
            config.osc_upstream_addr = resolve_key("osc_upstream_addr", v)?;
        }
        if let Some(v) = &self.ws_bind_addr {
            config.ws_bind_addr = resolve_key("ws_bind_addr", v)?;
        }
        if let Some(v) = &self.ws_path {
            config.ws_path = v.clone();
        }
        if let Some(v) = self.max_frame_len {
            config.max_frame_len = v;
        }
        if let Some(v) = self.session_queue_capacity {
            config.session_queue_capacity = v;
        }
        if let Some(ms) = self.session_send_timeout_ms {
            config.session_send_timeout = Duration::from_millis(ms);
        }
        if let Some(v) = self.upstream_retry_attempts {
            config.upstream_retry_attempts = v;
        }
        if let Some(ms) = self.upstream_retry_backoff_ms {
            config.upstream_retry_backoff = Duration::from_millis(ms);
        }
        if let Some(ms) = self.upstream_write_timeout_ms {
            config.upstream_write_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = self.shutdown_timeout_ms {
            config.shutdown_timeout = Duration::from_millis(ms);
        }
        Ok(())
    }
}

/// Resolves `host:port` (IP literal or hostname) to the first socket address.
pub fn resolve_addr(value: &str) -> std::io::Result<SocketAddr> {
    value.to_socket_addrs()?.next().ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("{value} resolved to no addresses"),
        )
    })
}

fn resolve_key(key: &'static str, value: &str) -> Result<SocketAddr, FileConfigError> {
    resolve_addr(value).map_err(|e| FileConfigError::InvalidAddress {
        key,
        value: value.to_string(),
        reason: e.to_string(),
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
