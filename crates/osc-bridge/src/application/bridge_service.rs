//! Message translation and routing between the OSC and WebSocket sides.
//!
//! Two kinds of items live here:
//!
//! - Pure translators ([`translate_osc_to_json`], [`translate_json_to_osc`])
//!   with no I/O.
//! - [`BridgeRouter`], the policy layer.  It depends only on the
//!   [`SessionBroadcaster`] and [`OscUpstream`] traits; the infrastructure
//!   layer injects the real session registry and TCP upstream, tests inject
//!   recording fakes.
//!
//! ```text
//! OSC → WS:  OscMessage → OscMessageJson → JSON text → SessionBroadcaster::broadcast
//! WS → OSC:  JSON text → OscMessageJson → OscMessage → OscUpstream::write_message
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use osc_core::{OscError, OscMessage, OscValue};
use thiserror::Error;
use tracing::{debug, warn};

use crate::domain::messages::{OscArgumentJson, OscMessageJson};

// ── Error types ───────────────────────────────────────────────────────────────

/// Why a message could not be written to the OSC upstream.
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// The upstream TCP connection is down and could not be re-established,
    /// or a write on it failed.
    #[error("OSC upstream {addr} unavailable: {reason}")]
    Unavailable { addr: SocketAddr, reason: String },

    /// The message cannot be represented on the wire.  Retrying won't help.
    #[error("message cannot be encoded: {0}")]
    Encode(#[from] OscError),
}

/// Errors for a single WebSocket-originated message.
///
/// Every variant is message-scoped: the caller drops the message and keeps
/// the session open.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The text is not JSON, or does not match the agreed message shape.
    #[error("invalid message JSON: {0}")]
    JsonShape(#[from] serde_json::Error),

    /// The JSON is well formed but describes an unencodable OSC message
    /// (empty address, oversized string).
    #[error("invalid OSC message: {0}")]
    InvalidMessage(OscError),

    /// The upstream stayed unavailable through every retry.
    #[error("upstream write failed after {attempts} attempt(s): {source}")]
    Upstream {
        attempts: u32,
        #[source]
        source: UpstreamError,
    },
}

// ── Collaborator traits ───────────────────────────────────────────────────────

/// Outcome of one broadcast, for logging and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Sessions the message was queued for.
    pub delivered: usize,
    /// Sessions that could not take the message (full queue, closed).
    pub failed: usize,
}

/// Fan-out to every live WebSocket session.
///
/// Implementations must be safe to call concurrently and must never block
/// on a slow session.  Per-session failures are absorbed and only counted.
#[async_trait]
pub trait SessionBroadcaster: Send + Sync {
    async fn broadcast(&self, text: &str) -> BroadcastReport;
}

/// The single shared OSC connection WebSocket clients write through.
///
/// Implementations serialize concurrent callers so frames never interleave.
#[async_trait]
pub trait OscUpstream: Send + Sync {
    async fn write_message(&self, msg: &OscMessage) -> Result<(), UpstreamError>;
}

// ── Translation ───────────────────────────────────────────────────────────────

/// Projects a decoded OSC message onto the JSON shape.
pub fn translate_osc_to_json(msg: &OscMessage) -> OscMessageJson {
    OscMessageJson {
        address: msg.address.clone(),
        arguments: msg
            .arguments
            .iter()
            .map(|arg| match arg {
                OscValue::Int32(v) => OscArgumentJson::Int(*v),
                OscValue::Float32(v) => OscArgumentJson::Float(*v),
                OscValue::Str(s) => OscArgumentJson::Str(s.clone()),
            })
            .collect(),
    }
}

/// Converts the JSON shape back into an OSC message.
///
/// # Errors
///
/// [`BridgeError::InvalidMessage`] when the result could not be encoded: an
/// empty address, or a string argument longer than the wire format allows.
///
/// # Example
///
/// ```rust
/// use osc_bridge::application::translate_json_to_osc;
/// use osc_bridge::domain::{OscArgumentJson, OscMessageJson};
/// use osc_core::OscValue;
///
/// let json = OscMessageJson {
///     address: "/cue".to_string(),
///     arguments: vec![OscArgumentJson::Str("go".to_string())],
/// };
/// let msg = translate_json_to_osc(json).unwrap();
/// assert_eq!(msg.arguments, vec![OscValue::Str("go".to_string())]);
/// ```
pub fn translate_json_to_osc(json: OscMessageJson) -> Result<OscMessage, BridgeError> {
    if json.address.is_empty() {
        return Err(BridgeError::InvalidMessage(OscError::EmptyAddress));
    }
    let arguments = json
        .arguments
        .into_iter()
        .map(|arg| match arg {
            OscArgumentJson::Int(v) => Ok(OscValue::Int32(v)),
            OscArgumentJson::Float(v) => Ok(OscValue::Float32(v)),
            OscArgumentJson::Str(s) if s.len() > osc_core::protocol::MAX_STRING_ARG_LEN => {
                Err(BridgeError::InvalidMessage(OscError::StringTooLong {
                    len: s.len(),
                    max: osc_core::protocol::MAX_STRING_ARG_LEN,
                }))
            }
            OscArgumentJson::Str(s) => Ok(OscValue::Str(s)),
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(OscMessage {
        address: json.address,
        arguments,
    })
}

// ── Router ────────────────────────────────────────────────────────────────────

/// Retry schedule for upstream writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first; values below 1 are treated as 1.
    pub attempts: u32,
    /// Delay before the second attempt; doubled after each failure.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff: Duration::from_millis(200),
        }
    }
}

/// Routes messages between OSC peers and WebSocket sessions.
///
/// One router is built at startup and shared (`Arc`) by every ingest task
/// and every WebSocket session task.  It holds no mutable state of its own.
pub struct BridgeRouter {
    sessions: Arc<dyn SessionBroadcaster>,
    upstream: Arc<dyn OscUpstream>,
    retry: RetryPolicy,
}

impl BridgeRouter {
    pub fn new(
        sessions: Arc<dyn SessionBroadcaster>,
        upstream: Arc<dyn OscUpstream>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            sessions,
            upstream,
            retry,
        }
    }

    /// OSC → WS: broadcasts one decoded message to every session.
    ///
    /// Never fails from the TCP side's point of view; per-session problems
    /// show up only in the returned report.
    pub async fn on_inbound_osc(&self, msg: OscMessage, origin: &str) -> BroadcastReport {
        let json = translate_osc_to_json(&msg);
        let text = match serde_json::to_string(&json) {
            Ok(t) => t,
            Err(e) => {
                // Unreachable for the supported value types, but never fatal.
                warn!("osc {origin}: JSON serialization of {} failed: {e}", msg.address);
                return BroadcastReport::default();
            }
        };

        let report = self.sessions.broadcast(&text).await;
        debug!(
            "osc {origin} → ws: {} ({} args) delivered={} failed={}",
            msg.address,
            msg.arguments.len(),
            report.delivered,
            report.failed
        );
        report
    }

    /// WS → OSC: parses one text frame and writes it to the upstream.
    ///
    /// # Errors
    ///
    /// Every error is message-scoped ([`BridgeError`]); the caller logs it,
    /// drops the message and keeps the session open.
    pub async fn on_inbound_ws_text(&self, text: &str) -> Result<(), BridgeError> {
        let json: OscMessageJson = serde_json::from_str(text)?;
        let msg = translate_json_to_osc(json)?;
        self.write_with_retry(&msg).await
    }

    async fn write_with_retry(&self, msg: &OscMessage) -> Result<(), BridgeError> {
        let attempts = self.retry.attempts.max(1);
        let mut delay = self.retry.backoff;
        let mut attempt = 1;

        loop {
            match self.upstream.write_message(msg).await {
                Ok(()) => {
                    debug!("ws → osc: {} ({} args)", msg.address, msg.arguments.len());
                    return Ok(());
                }
                Err(e) => {
                    // Encode failures are deterministic; only a down upstream is retried.
                    let retryable = matches!(e, UpstreamError::Unavailable { .. });
                    if !retryable || attempt >= attempts {
                        return Err(BridgeError::Upstream {
                            attempts: attempt,
                            source: e,
                        });
                    }
                    warn!("upstream write attempt {attempt}/{attempts} failed: {e}; retrying in {delay:?}");
                    tokio::time::sleep(delay).await;
                    delay = delay.saturating_mul(2);
                    attempt += 1;
                }
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
