//! Bridge configuration types.
//!
//! [`BridgeConfig`] is the single source of truth for all runtime settings.
//! It is built once at startup from defaults, an optional TOML file,
//! environment variables and CLI flags (in that order of precedence, lowest
//! first) and then shared read-only by every task.

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

/// Smallest frame body that can hold a message: the four-byte address
/// length plus a one-character address.
pub const MIN_FRAME_LEN: usize = 5;

/// Validation failures for a fully assembled [`BridgeConfig`].
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("WebSocket path must start with '/', got {0:?}")]
    InvalidWsPath(String),

    #[error("session queue capacity must be at least 1")]
    ZeroQueueCapacity,

    #[error("max frame length must be at least {MIN_FRAME_LEN} bytes, got {0}")]
    FrameLimitTooSmall(usize),
}

/// All runtime configuration for the OSC bridge.
///
/// # Example
///
/// ```rust
/// use osc_bridge::domain::BridgeConfig;
///
/// let cfg = BridgeConfig::default();
/// assert_eq!(cfg.osc_listen_addr.port(), 8000);
/// assert_eq!(cfg.ws_path, "/osc");
/// ```
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Where OSC peers connect to push messages towards WebSocket clients.
    pub osc_listen_addr: SocketAddr,

    /// The OSC device that receives messages sent by WebSocket clients.
    ///
    /// One persistent connection is shared by every WebSocket session.
    pub osc_upstream_addr: SocketAddr,

    /// Address the WebSocket server binds to.
    pub ws_bind_addr: SocketAddr,

    /// HTTP path WebSocket clients must request during the upgrade.
    pub ws_path: String,

    /// Largest OSC frame body accepted from a TCP peer, in bytes.
    ///
    /// Checked against the length prefix before any buffer is allocated.
    pub max_frame_len: usize,

    /// Outbound queue depth per WebSocket session.
    ///
    /// When a slow client's queue is full, new messages are dropped for that
    /// client only; the OSC ingest path never waits on it.
    pub session_queue_capacity: usize,

    /// Maximum time a single WebSocket frame write may take before the
    /// session is considered stalled and closed.
    pub session_send_timeout: Duration,

    /// How many times a WebSocket-originated message is tried against the
    /// upstream before it is dropped.
    pub upstream_retry_attempts: u32,

    /// Delay before the first retry; doubles after each failed attempt.
    pub upstream_retry_backoff: Duration,

    /// Maximum time one frame write to the upstream may take.  A stalled
    /// write drops the upstream connection and counts as a failed attempt.
    pub upstream_write_timeout: Duration,

    /// How long shutdown waits for spawned tasks to finish.
    pub shutdown_timeout: Duration,
}

impl BridgeConfig {
    /// Checks cross-field constraints that the type system cannot express.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.ws_path.starts_with('/') {
            return Err(ConfigError::InvalidWsPath(self.ws_path.clone()));
        }
        if self.session_queue_capacity == 0 {
            return Err(ConfigError::ZeroQueueCapacity);
        }
        if self.max_frame_len < MIN_FRAME_LEN {
            return Err(ConfigError::FrameLimitTooSmall(self.max_frame_len));
        }
        Ok(())
    }
}

impl Default for BridgeConfig {
    /// | Field                   | Default            |
    /// |-------------------------|--------------------|
    /// | osc_listen_addr         | `0.0.0.0:8000`     |
    /// | osc_upstream_addr       | `127.0.0.1:8001`   |
    /// | ws_bind_addr            | `127.0.0.1:8080`   |
    /// | ws_path                 | `/osc`             |
    /// | max_frame_len           | 1 MiB              |
    /// | session_queue_capacity  | 256                |
    /// | session_send_timeout    | 5 seconds          |
    /// | upstream_retry_attempts | 3                  |
    /// | upstream_retry_backoff  | 200 ms             |
    /// | upstream_write_timeout  | 5 seconds          |
    /// | shutdown_timeout        | 5 seconds          |
    fn default() -> Self {
        Self {
            // Compile-time-known valid socket address strings.
            osc_listen_addr: "0.0.0.0:8000".parse().unwrap(),
            osc_upstream_addr: "127.0.0.1:8001".parse().unwrap(),
            ws_bind_addr: "127.0.0.1:8080".parse().unwrap(),
            ws_path: "/osc".to_string(),
            max_frame_len: 1024 * 1024,
            session_queue_capacity: 256,
            session_send_timeout: Duration::from_secs(5),
            upstream_retry_attempts: 3,
            upstream_retry_backoff: Duration::from_millis(200),
            upstream_write_timeout: Duration::from_secs(5),
            shutdown_timeout: Duration::from_secs(5),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
