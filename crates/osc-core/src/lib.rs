//! # osc-core
//!
//! OSC message types and the binary codec used by the OSC ⇄ WebSocket bridge.
//!
//! The crate is pure: no sockets, no async runtime, no global state.  The
//! bridge binary (`osc-bridge`) owns all I/O and calls into this crate to turn
//! bytes into [`OscMessage`] values and back.
//!
//! # Wire format at a glance
//!
//! ```text
//! frame  = [body_len:4] body
//! body   = [address_len:4][address] argument*
//! argument = 'i' [i32:4] | 'f' [f32:4] | 's' [len:2][utf8]
//! ```
//!
//! This is a simplified, length-prefixed framing.  It is *not* OSC 1.0 padded
//! framing: there are no type-tag strings, no 4-byte alignment and no bundles.

pub mod protocol;

// Re-export the most-used items at the crate root so callers can write
// `osc_core::OscMessage` instead of `osc_core::protocol::messages::OscMessage`.
pub use protocol::codec::{decode_frame, decode_message, encode_frame, encode_message, OscError};
pub use protocol::messages::{OscMessage, OscValue, TypeTag};
