//! Infrastructure layer for the OSC bridge.
//!
//! Everything that touches a socket or a file lives here: the OSC TCP
//! listener and upstream connection, the WebSocket server, the session
//! registry and the configuration file loader.
//!
//! # What does NOT belong here?
//!
//! - Message translation and routing policy (that is the application layer)
//! - JSON message and config type definitions (that is the domain layer)

pub mod config_file;
pub mod ingest;
pub mod osc_conn;
pub mod server;
pub mod sessions;
pub mod tasks;
pub mod upstream;
pub mod ws_server;

// Re-export the primary entry points so `main.rs` can call them concisely.
pub use config_file::{resolve_addr, FileConfig, FileConfigError};
pub use server::{run_bridge, Bridge};
pub use sessions::{SessionRegistry, SessionSendError};
pub use upstream::SharedUpstream;
