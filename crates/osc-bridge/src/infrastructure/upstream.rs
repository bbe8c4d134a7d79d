//! The single shared TCP connection to the OSC upstream device.
//!
//! Every WebSocket session writes through the same [`SharedUpstream`].  A
//! `tokio::sync::Mutex` around the writer serializes whole frames, so bytes of
//! two messages never interleave on the wire.
//!
//! The writer is taken out of its slot for the duration of a write and only
//! put back once the whole frame is on the socket.  A write that fails, times
//! out or is cancelled half way therefore drops the connection instead of
//! leaving a partial frame in front of the next one.  The next write connects
//! afresh.  Retrying a failed message is the caller's job.

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use osc_core::OscMessage;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::application::{OscUpstream, UpstreamError};
use crate::infrastructure::osc_conn::{ConnectionError, OscConnection, OscWriter};

/// Upper bound on a single connect attempt.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// Lazily connected, mutex-guarded writer to the OSC upstream.
pub struct SharedUpstream {
    addr: SocketAddr,
    write_timeout: Duration,
    writer: Mutex<Option<OscWriter<OwnedWriteHalf>>>,
}

impl SharedUpstream {
    /// Creates a handle without connecting.  The first write connects.
    ///
    /// A single frame write taking longer than `write_timeout` is treated as
    /// a dead upstream.
    pub fn new(addr: SocketAddr, write_timeout: Duration) -> Self {
        Self {
            addr,
            write_timeout,
            writer: Mutex::new(None),
        }
    }

    /// Creates a handle and tries to connect immediately.
    ///
    /// A failed initial connect is logged, not returned: the bridge still
    /// starts and the connect is retried on the first write.
    pub async fn connect(addr: SocketAddr, write_timeout: Duration) -> Self {
        let upstream = Self::new(addr, write_timeout);
        {
            let mut guard = upstream.writer.lock().await;
            match open_writer(addr).await {
                Ok(writer) => {
                    info!("connected to OSC upstream at {addr}");
                    *guard = Some(writer);
                }
                Err(e) => warn!("OSC upstream not reachable yet: {e}"),
            }
        }
        upstream
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Whether a live writer is currently held.
    pub async fn is_connected(&self) -> bool {
        self.writer.lock().await.is_some()
    }

    /// Closes the write direction of the upstream connection, if open.
    pub async fn shutdown(&self) {
        if let Some(mut writer) = self.writer.lock().await.take() {
            if let Err(e) = writer.shutdown().await {
                debug!("error closing OSC upstream {}: {e}", self.addr);
            }
        }
    }

    fn unavailable(&self, reason: impl ToString) -> UpstreamError {
        UpstreamError::Unavailable {
            addr: self.addr,
            reason: reason.to_string(),
        }
    }
}

#[async_trait]
impl OscUpstream for SharedUpstream {
    async fn write_message(&self, msg: &OscMessage) -> Result<(), UpstreamError> {
        // Held across connect and write so frames from concurrent sessions
        // are written one at a time.
        let mut guard = self.writer.lock().await;

        // If this future is dropped mid-write, `writer` goes with it and the
        // slot stays empty.
        let mut writer = match guard.take() {
            Some(writer) => writer,
            None => {
                let writer = open_writer(self.addr)
                    .await
                    .map_err(|e| self.unavailable(format!("{e:#}")))?;
                info!("reconnected to OSC upstream at {}", self.addr);
                writer
            }
        };

        let written = timeout(self.write_timeout, writer.write_message(msg)).await;
        match written {
            Ok(Ok(())) => {
                *guard = Some(writer);
                Ok(())
            }
            // Nothing was written; the connection is still good.
            Ok(Err(ConnectionError::Encode(e))) => {
                *guard = Some(writer);
                Err(UpstreamError::Encode(e))
            }
            Ok(Err(e)) => {
                warn!("OSC upstream {} write failed, dropping connection: {e}", self.addr);
                Err(self.unavailable(e))
            }
            Err(_) => {
                warn!(
                    "OSC upstream {} write stalled for {:?}, dropping connection",
                    self.addr, self.write_timeout
                );
                Err(self.unavailable(format!("write timed out after {:?}", self.write_timeout)))
            }
        }
    }
}

async fn open_writer(addr: SocketAddr) -> anyhow::Result<OscWriter<OwnedWriteHalf>> {
    let conn = timeout(CONNECT_TIMEOUT, OscConnection::connect(addr))
        .await
        .map_err(|_| anyhow::anyhow!("connect to {addr} timed out after {CONNECT_TIMEOUT:?}"))??;
    // The upstream is write-only from our side; the read half is dropped.
    // Frame limit is irrelevant here.
    let (_reader, writer) = conn.into_split(0);
    Ok(writer)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::infrastructure::osc_conn::OscReader;
    use tokio::net::TcpListener;

    const WRITE_TIMEOUT: Duration = Duration::from_secs(5);

    /// Roughly 30 MB encoded: far more than a socket buffer that nobody
    /// drains will absorb.
    fn bulk_message() -> OscMessage {
        (0..500).fold(OscMessage::new("/bulk"), |msg, _| {
            msg.with_arg("x".repeat(60_000))
        })
    }

    #[tokio::test]
    async fn test_concurrent_writes_arrive_as_whole_frames() {
        // Arrange
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let upstream = Arc::new(SharedUpstream::connect(addr, WRITE_TIMEOUT).await);
        let (socket, _) = listener.accept().await.unwrap();
        let mut reader = OscReader::new(socket, 64 * 1024);
        const WRITERS: i32 = 16;

        // Act: many tasks write through the same handle at once
        let mut handles = Vec::new();
        for i in 0..WRITERS {
            let up = Arc::clone(&upstream);
            handles.push(tokio::spawn(async move {
                let msg = OscMessage::new("/track")
                    .with_arg(i)
                    .with_arg("x".repeat(500));
                up.write_message(&msg).await.unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        // Assert: every frame decodes cleanly and each sender appears once
        let mut seen = Vec::new();
        for _ in 0..WRITERS {
            let msg = reader.read_message().await.unwrap().unwrap();
            assert_eq!(msg.address, "/track");
            match msg.arguments[0] {
                osc_core::OscValue::Int32(i) => seen.push(i),
                _ => panic!("unexpected first argument"),
            }
        }
        seen.sort_unstable();
        assert_eq!(seen, (0..WRITERS).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_unreachable_upstream_reports_unavailable() {
        // Bind then drop to get a port nobody listens on.
        let addr = {
            let l = TcpListener::bind("127.0.0.1:0").await.unwrap();
            l.local_addr().unwrap()
        };
        let upstream = SharedUpstream::connect(addr, WRITE_TIMEOUT).await;
        assert!(!upstream.is_connected().await);

        let err = upstream
            .write_message(&OscMessage::new("/a"))
            .await
            .unwrap_err();
        assert!(matches!(err, UpstreamError::Unavailable { addr: a, .. } if a == addr));
    }

    #[tokio::test]
    async fn test_connects_lazily_once_upstream_appears() {
        // Arrange: no listener at first
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let upstream = SharedUpstream::new(addr, WRITE_TIMEOUT);
        assert!(!upstream.is_connected().await);

        // Act
        let write = tokio::spawn(async move {
            upstream.write_message(&OscMessage::new("/late")).await.map(|_| upstream)
        });
        let (socket, _) = listener.accept().await.unwrap();
        let upstream = write.await.unwrap().unwrap();

        // Assert
        assert!(upstream.is_connected().await);
        let mut reader = OscReader::new(socket, 1024);
        assert_eq!(
            reader.read_message().await.unwrap(),
            Some(OscMessage::new("/late"))
        );
    }

    #[tokio::test]
    async fn test_encode_error_keeps_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let upstream = SharedUpstream::connect(addr, WRITE_TIMEOUT).await;
        let _socket = listener.accept().await.unwrap();

        let err = upstream
            .write_message(&OscMessage::new(""))
            .await
            .unwrap_err();

        assert!(matches!(err, UpstreamError::Encode(_)));
        assert!(upstream.is_connected().await);
    }

    #[tokio::test]
    async fn test_cancelled_write_drops_connection_and_next_write_is_clean() {
        // Arrange: an upstream that accepts but never reads
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let upstream = SharedUpstream::connect(addr, WRITE_TIMEOUT).await;
        let (_stalled, _) = listener.accept().await.unwrap();

        // Act: abandon a write that cannot finish
        let cancelled = tokio::time::timeout(
            Duration::from_millis(300),
            upstream.write_message(&bulk_message()),
        )
        .await;

        // Assert: the half-written connection is gone
        assert!(cancelled.is_err());
        assert!(!upstream.is_connected().await);

        // ...and the next message goes out whole on a fresh connection
        let write = tokio::spawn(async move {
            upstream.write_message(&OscMessage::new("/after")).await
        });
        let (socket, _) = listener.accept().await.unwrap();
        write.await.unwrap().unwrap();
        let mut reader = OscReader::new(socket, 1024);
        assert_eq!(
            reader.read_message().await.unwrap(),
            Some(OscMessage::new("/after"))
        );
    }

    #[tokio::test]
    async fn test_stalled_write_times_out_as_unavailable() {
        // Arrange
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let upstream = SharedUpstream::connect(addr, Duration::from_millis(200)).await;
        let (_stalled, _) = listener.accept().await.unwrap();

        // Act
        let err = tokio::time::timeout(
            Duration::from_secs(5),
            upstream.write_message(&bulk_message()),
        )
        .await
        .expect("write timeout did not fire")
        .unwrap_err();

        // Assert
        assert!(matches!(err, UpstreamError::Unavailable { addr: a, .. } if a == addr));
        assert!(!upstream.is_connected().await);
    }
}
