//! Domain layer for osc-bridge.
//!
//! Pure types with no I/O, networking or async runtime: the JSON message
//! shape spoken by WebSocket clients and the bridge configuration.

pub mod config;
pub mod messages;

// Re-export the most commonly needed types at the domain module boundary
// so callers can write `domain::BridgeConfig` instead of the longer path.
pub use config::{BridgeConfig, ConfigError};
pub use messages::{OscArgumentJson, OscMessageJson};
