//! WebSocket server: accept loop and per-session task management.
//!
//! Each accepted TCP connection is upgraded to a WebSocket session, provided
//! the request path matches `ws_path` (anything else gets `404 Not Found`).
//! A session then runs two halves concurrently:
//!
//! - **Writer**: drains the session's registry queue into the socket, one
//!   text frame per message, each bounded by `session_send_timeout`.
//! - **Reader**: hands every text frame to [`BridgeRouter::on_inbound_ws_text`]
//!   in arrival order.  Bad messages are logged and skipped; the session
//!   stays open.
//!
//! The session ends when either half finishes, and is unregistered on the
//! way out so broadcasts stop targeting it.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::application::BridgeRouter;
use crate::domain::config::BridgeConfig;
use crate::infrastructure::sessions::SessionRegistry;
use crate::infrastructure::tasks::TaskSet;

/// Upper bound on the HTTP upgrade exchange of a new connection.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

// ── Public API ────────────────────────────────────────────────────────────────

/// Runs the WebSocket accept loop until `token` is cancelled.
///
/// Every connection gets its own task on `tasks`, so one slow client
/// never delays the next accept.
pub async fn run_ws_server(
    listener: TcpListener,
    router: Arc<BridgeRouter>,
    sessions: Arc<SessionRegistry>,
    config: Arc<BridgeConfig>,
    tasks: TaskSet,
    token: CancellationToken,
) {
    loop {
        let accepted = tokio::select! {
            _ = token.cancelled() => {
                info!("WebSocket accept loop stopping");
                break;
            }
            accepted = listener.accept() => accepted,
        };

        match accepted {
            Ok((stream, peer_addr)) => {
                debug!("new WebSocket connection from {peer_addr}");
                let router = Arc::clone(&router);
                let sessions = Arc::clone(&sessions);
                let config = Arc::clone(&config);
                let token = token.child_token();
                tasks.spawn(async move {
                    match run_session(stream, peer_addr, &router, &sessions, &config, &token).await {
                        Ok(()) => info!("WebSocket session {peer_addr} closed"),
                        Err(e) => warn!("WebSocket session {peer_addr} ended with error: {e:#}"),
                    }
                });
            }
            // Transient (e.g. too many open files); keep accepting.
            Err(e) => error!("WebSocket accept error: {e}"),
        }
    }
}

// ── Per-session handler ───────────────────────────────────────────────────────

/// Runs the complete lifecycle of a single WebSocket session.
///
/// # Errors
///
/// Returns an error if the upgrade handshake fails or takes longer than
/// [`HANDSHAKE_TIMEOUT`], including the 404 rejection for a wrong path.
/// Cancellation during the handshake drops the connection and returns
/// `Ok`.
async fn run_session(
    raw_stream: TcpStream,
    peer_addr: SocketAddr,
    router: &BridgeRouter,
    sessions: &SessionRegistry,
    config: &BridgeConfig,
    token: &CancellationToken,
) -> anyhow::Result<()> {
    let expected_path = config.ws_path.clone();
    let callback = move |request: &Request, response: Response| {
        check_path(request, &expected_path).map(|()| response)
    };
    let handshake = tokio::select! {
        _ = token.cancelled() => {
            debug!("WebSocket handshake with {peer_addr} abandoned for shutdown");
            return Ok(());
        }
        handshake = timeout(HANDSHAKE_TIMEOUT, accept_hdr_async(raw_stream, callback)) => handshake,
    };
    let ws_stream = handshake
        .map_err(|_| anyhow::anyhow!("WebSocket handshake with {peer_addr} timed out"))?
        .with_context(|| format!("WebSocket handshake failed with {peer_addr}"))?;

    let (id, mut queue) = sessions
        .register(peer_addr, config.session_queue_capacity)
        .await;
    info!("WebSocket session {id} established: {peer_addr}");

    let (mut ws_tx, mut ws_rx) = ws_stream.split();
    let send_timeout = config.session_send_timeout;

    // ── Writer: registry queue → socket ───────────────────────────────────────
    let writer = async {
        loop {
            let text = tokio::select! {
                biased;
                _ = token.cancelled() => None,
                next = queue.recv() => next,
            };
            let Some(text) = text else {
                // Shutdown, or the registry dropped our sender.
                let _ = timeout(send_timeout, ws_tx.send(WsMessage::Close(None))).await;
                break;
            };
            match timeout(send_timeout, ws_tx.send(WsMessage::Text(text))).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    debug!("session {id}: WebSocket send failed: {e}");
                    break;
                }
                Err(_) => {
                    warn!("session {id}: send stalled for {send_timeout:?}, closing");
                    break;
                }
            }
        }
    };

    // ── Reader: socket → router ───────────────────────────────────────────────
    let reader = async {
        while let Some(frame) = ws_rx.next().await {
            match frame {
                Ok(WsMessage::Text(text)) => {
                    if let Err(e) = router.on_inbound_ws_text(&text).await {
                        warn!("session {id}: message dropped: {e}");
                    }
                }
                Ok(WsMessage::Binary(data)) => {
                    warn!(
                        "session {id}: unexpected binary frame ({} bytes) ignored",
                        data.len()
                    );
                }
                Ok(WsMessage::Close(_)) => {
                    debug!("session {id}: Close frame received");
                    break;
                }
                // Ping/Pong are answered by tungstenite itself.
                Ok(_) => {}
                Err(e) => {
                    debug!("session {id}: WebSocket read error: {e}");
                    break;
                }
            }
        }
    };

    tokio::select! {
        _ = writer => debug!("session {id}: writer finished"),
        _ = reader => debug!("session {id}: reader finished"),
    }

    sessions.unregister(id).await;
    Ok(())
}

// ── Helper ────────────────────────────────────────────────────────────────────

/// Accepts the upgrade only when the request path equals `expected`.
///
/// The query string is ignored.
#[allow(clippy::result_large_err)]
fn check_path(request: &Request, expected: &str) -> Result<(), ErrorResponse> {
    if request.uri().path() == expected {
        return Ok(());
    }
    let mut response = ErrorResponse::new(Some(format!(
        "no WebSocket endpoint at {}",
        request.uri().path()
    )));
    *response.status_mut() = StatusCode::NOT_FOUND;
    Err(response)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
