//! osc-bridge library crate.
//!
//! Bridges OSC devices speaking length-framed OSC over TCP with WebSocket
//! clients speaking JSON.
//!
//! # Architecture
//!
//! ```text
//! OSC peers / upstream (binary frames over TCP)
//!         ↕
//! [osc-bridge]
//!   ├── domain/           Pure types: JSON message shape, BridgeConfig
//!   ├── application/      Translation OSC ↔ JSON, BridgeRouter
//!   └── infrastructure/
//!         ├── osc_conn/   Framed OSC reader/writer (osc-core codec)
//!         ├── ingest/     OSC TCP accept loop
//!         ├── upstream/   Shared connection to the OSC upstream
//!         ├── sessions/   WebSocket session registry
//!         ├── ws_server/  WebSocket accept loop (tokio-tungstenite)
//!         ├── tasks/      Abortable connection task set
//!         └── server/     Wiring and shutdown
//!         ↕
//! WebSocket clients (JSON text frames)
//! ```
//!
//! # Layer rules
//!
//! - `domain` has no I/O and no async.
//! - `application` depends on `domain` and `osc-core`; it reaches the outside
//!   world only through the `SessionBroadcaster` and `OscUpstream` traits.
//! - `infrastructure` depends on all other layers plus `tokio` and `tungstenite`.

/// Domain layer: pure types (no I/O).
pub mod domain;

/// Application layer: translation and routing.
pub mod application;

/// Infrastructure layer: sockets, sessions, config file.
pub mod infrastructure;
