//! OSC ingest: accepts TCP peers and feeds their messages to the router.
//!
//! One task per peer.  A malformed frame ends that peer's connection only;
//! other peers, the listener and every WebSocket session carry on.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::AsyncRead;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::application::BridgeRouter;
use crate::infrastructure::osc_conn::{ConnectionError, OscConnection, OscReader};
use crate::infrastructure::tasks::TaskSet;

/// How a single peer connection ended.
#[derive(Debug)]
pub enum ConnectionOutcome {
    /// The peer closed the stream between frames.
    PeerClosed,
    /// Shutdown was requested.
    Cancelled,
    /// A frame was malformed or the socket failed.
    Failed(ConnectionError),
}

/// Accepts OSC peers on `listener` until `token` is cancelled.
///
/// Each peer runs in its own task spawned on `tasks` so shutdown can wait
/// for them, or abort them.
pub async fn run_ingest(
    listener: TcpListener,
    router: Arc<BridgeRouter>,
    max_frame_len: usize,
    tasks: TaskSet,
    token: CancellationToken,
) {
    loop {
        let accepted = tokio::select! {
            _ = token.cancelled() => {
                info!("OSC ingest stopping");
                break;
            }
            accepted = listener.accept() => accepted,
        };

        match accepted {
            Ok((stream, peer)) => {
                info!("OSC peer connected: {peer}");
                // The write half is held for the task's lifetime; dropping it
                // would half-close the socket towards the peer.
                let (reader, writer) =
                    OscConnection::from_stream(stream, peer).into_split(max_frame_len);
                let router = Arc::clone(&router);
                let token = token.child_token();
                tasks.spawn(async move {
                    let _writer = writer;
                    match run_connection(reader, peer, &router, &token).await {
                        ConnectionOutcome::PeerClosed => info!("OSC peer {peer} disconnected"),
                        ConnectionOutcome::Cancelled => debug!("OSC peer {peer} closed for shutdown"),
                        ConnectionOutcome::Failed(e) => warn!("OSC peer {peer} dropped: {e}"),
                    }
                });
            }
            // Transient (e.g. too many open files); keep accepting.
            Err(e) => error!("OSC accept error: {e}"),
        }
    }
}

/// Reads frames from one peer and routes each to the WebSocket sessions.
pub async fn run_connection<R: AsyncRead + Unpin>(
    mut reader: OscReader<R>,
    peer: SocketAddr,
    router: &BridgeRouter,
    token: &CancellationToken,
) -> ConnectionOutcome {
    let origin = peer.to_string();
    loop {
        let next = tokio::select! {
            _ = token.cancelled() => return ConnectionOutcome::Cancelled,
            next = reader.read_message() => next,
        };

        match next {
            Ok(Some(msg)) => {
                router.on_inbound_osc(msg, &origin).await;
            }
            Ok(None) => return ConnectionOutcome::PeerClosed,
            Err(e) => return ConnectionOutcome::Failed(e),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use osc_core::{encode_frame, OscError, OscMessage};
    use tokio::io::{duplex, AsyncWriteExt};

    use super::*;
    use crate::application::{
        BroadcastReport, OscUpstream, RetryPolicy, SessionBroadcaster, UpstreamError,
    };

    #[derive(Default)]
    struct RecordingBroadcaster {
        sent: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl SessionBroadcaster for RecordingBroadcaster {
        async fn broadcast(&self, text: &str) -> BroadcastReport {
            self.sent.lock().unwrap().push(text.to_string());
            BroadcastReport {
                delivered: 1,
                failed: 0,
            }
        }
    }

    struct NullUpstream;

    #[async_trait]
    impl OscUpstream for NullUpstream {
        async fn write_message(&self, _msg: &OscMessage) -> Result<(), UpstreamError> {
            Ok(())
        }
    }

    fn router(sessions: Arc<RecordingBroadcaster>) -> BridgeRouter {
        BridgeRouter::new(sessions, Arc::new(NullUpstream), RetryPolicy::default())
    }

    fn peer() -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], 9000))
    }

    #[tokio::test]
    async fn test_each_frame_is_broadcast_in_order() {
        // Arrange
        let sessions = Arc::new(RecordingBroadcaster::default());
        let router = router(Arc::clone(&sessions));
        let (mut client, server) = duplex(1024);
        for i in 0..3 {
            let frame = encode_frame(&OscMessage::new("/n").with_arg(i)).unwrap();
            client.write_all(&frame).await.unwrap();
        }
        drop(client);

        // Act
        let outcome = run_connection(
            OscReader::new(server, 1024),
            peer(),
            &router,
            &CancellationToken::new(),
        )
        .await;

        // Assert
        assert!(matches!(outcome, ConnectionOutcome::PeerClosed));
        let sent = sessions.sent.lock().unwrap();
        assert_eq!(
            *sent,
            vec![
                r#"{"address":"/n","arguments":[{"type":"i","value":0}]}"#,
                r#"{"address":"/n","arguments":[{"type":"i","value":1}]}"#,
                r#"{"address":"/n","arguments":[{"type":"i","value":2}]}"#,
            ]
        );
    }

    #[tokio::test]
    async fn test_unknown_tag_ends_connection_after_earlier_frames() {
        // Arrange: a good frame followed by one with tag 'x'
        let sessions = Arc::new(RecordingBroadcaster::default());
        let router = router(Arc::clone(&sessions));
        let (mut client, server) = duplex(1024);
        client
            .write_all(&encode_frame(&OscMessage::new("/ok")).unwrap())
            .await
            .unwrap();
        let mut bad = encode_frame(&OscMessage::new("/bad")).unwrap();
        bad.push(b'x');
        let body_len = (bad.len() - 4) as u32;
        bad[..4].copy_from_slice(&body_len.to_be_bytes());
        client.write_all(&bad).await.unwrap();

        // Act
        let outcome = run_connection(
            OscReader::new(server, 1024),
            peer(),
            &router,
            &CancellationToken::new(),
        )
        .await;

        // Assert
        assert!(matches!(
            outcome,
            ConnectionOutcome::Failed(ConnectionError::Decode {
                source: OscError::UnknownTag { tag: b'x', .. },
                ..
            })
        ));
        assert_eq!(sessions.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_cancellation_stops_an_idle_connection() {
        let sessions = Arc::new(RecordingBroadcaster::default());
        let router = router(sessions);
        let (_client, server) = duplex(64);
        let token = CancellationToken::new();
        token.cancel();

        let outcome = run_connection(OscReader::new(server, 64), peer(), &router, &token).await;

        assert!(matches!(outcome, ConnectionOutcome::Cancelled));
    }
}
