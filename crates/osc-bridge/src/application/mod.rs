//! Application layer for osc-bridge.
//!
//! Knows *what* to do with a message (translate it, fan it out, write it
//! upstream) but delegates *how* to the infrastructure layer through the
//! [`SessionBroadcaster`] and [`OscUpstream`] traits.

pub mod bridge_service;

pub use bridge_service::{
    translate_json_to_osc, translate_osc_to_json, BridgeError, BridgeRouter, BroadcastReport,
    OscUpstream, RetryPolicy, SessionBroadcaster, UpstreamError,
};
