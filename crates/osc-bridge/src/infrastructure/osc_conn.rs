//! Framed OSC reading and writing over a TCP stream.
//!
//! TCP is a *stream* protocol: one `read()` may return part of a frame or
//! several frames at once.  [`OscReader`] reads the 4-byte length prefix,
//! checks it against the configured limit, then reads exactly that many body
//! bytes before handing them to the codec.
//!
//! Reader and writer are generic over `AsyncRead`/`AsyncWrite` so tests can
//! drive them through `tokio::io::duplex` pipes instead of real sockets.

use std::net::SocketAddr;

use anyhow::Context;
use osc_core::protocol::codec::frame_body_len;
use osc_core::protocol::FRAME_HEADER_SIZE;
use osc_core::{decode_message, encode_frame, OscError, OscMessage};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

/// Errors from reading or writing framed OSC messages.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// The frame was complete on the wire but its body did not decode, or the
    /// peer closed mid-frame (reported as `Truncated`).
    #[error("malformed frame at stream offset {frame_offset}: {source}")]
    Decode {
        frame_offset: u64,
        #[source]
        source: OscError,
    },

    /// The length prefix exceeds the configured limit.  Nothing was allocated.
    #[error("frame at stream offset {frame_offset} declares {len} bytes, limit is {max}")]
    FrameTooLarge {
        frame_offset: u64,
        len: usize,
        max: usize,
    },

    /// The outgoing message could not be encoded; nothing was written.
    #[error("cannot encode message: {0}")]
    Encode(#[source] OscError),

    /// Socket-level failure.
    #[error("socket I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConnectionError {
    /// Stream offset of the frame the error refers to, if any.
    pub fn frame_offset(&self) -> Option<u64> {
        match self {
            ConnectionError::Decode { frame_offset, .. }
            | ConnectionError::FrameTooLarge { frame_offset, .. } => Some(*frame_offset),
            _ => None,
        }
    }
}

// ── Connection ────────────────────────────────────────────────────────────────

/// One TCP connection speaking framed OSC.
///
/// Owns the socket exclusively.  Use [`OscConnection::into_split`] to get
/// independent read and write halves.
pub struct OscConnection {
    stream: TcpStream,
    peer_addr: SocketAddr,
}

impl OscConnection {
    /// Opens a TCP connection to an OSC device.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub async fn connect(addr: SocketAddr) -> anyhow::Result<Self> {
        let stream = TcpStream::connect(addr)
            .await
            .with_context(|| format!("failed to connect to OSC peer at {addr}"))?;
        // Control messages are small and latency-sensitive.
        stream.set_nodelay(true).ok();
        Ok(Self {
            stream,
            peer_addr: addr,
        })
    }

    /// Wraps an accepted stream.
    pub fn from_stream(stream: TcpStream, peer_addr: SocketAddr) -> Self {
        stream.set_nodelay(true).ok();
        Self { stream, peer_addr }
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Splits into a reader enforcing `max_frame_len` and a writer.
    pub fn into_split(
        self,
        max_frame_len: usize,
    ) -> (OscReader<OwnedReadHalf>, OscWriter<OwnedWriteHalf>) {
        let (read_half, write_half) = self.stream.into_split();
        (
            OscReader::new(read_half, max_frame_len),
            OscWriter::new(write_half),
        )
    }
}

// ── Reader ────────────────────────────────────────────────────────────────────

/// Reads one framed [`OscMessage`] at a time.
pub struct OscReader<R> {
    inner: R,
    max_frame_len: usize,
    /// Bytes consumed so far; used to locate errors in logs.
    offset: u64,
}

impl<R: AsyncRead + Unpin> OscReader<R> {
    pub fn new(inner: R, max_frame_len: usize) -> Self {
        Self {
            inner,
            max_frame_len,
            offset: 0,
        }
    }

    /// Total bytes consumed from the stream so far.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Waits for the next complete frame.
    ///
    /// Returns `Ok(None)` when the peer closes cleanly between frames.
    ///
    /// # Errors
    ///
    /// [`ConnectionError::Decode`] for a malformed body or a close mid-frame,
    /// [`ConnectionError::FrameTooLarge`] for an oversized length prefix and
    /// [`ConnectionError::Io`] for socket failures.  After any error the
    /// stream position is unreliable and the connection should be dropped.
    pub async fn read_message(&mut self) -> Result<Option<OscMessage>, ConnectionError> {
        let frame_offset = self.offset;

        let mut header = [0u8; FRAME_HEADER_SIZE];
        let got = read_full(&mut self.inner, &mut header).await?;
        self.offset += got as u64;
        if got == 0 {
            return Ok(None);
        }
        if got < FRAME_HEADER_SIZE {
            return Err(ConnectionError::Decode {
                frame_offset,
                source: OscError::Truncated {
                    offset: got,
                    needed: FRAME_HEADER_SIZE,
                    available: got,
                },
            });
        }

        let body_len = frame_body_len(&header);
        if body_len > self.max_frame_len {
            return Err(ConnectionError::FrameTooLarge {
                frame_offset,
                len: body_len,
                max: self.max_frame_len,
            });
        }

        let mut body = vec![0u8; body_len];
        let got = read_full(&mut self.inner, &mut body).await?;
        self.offset += got as u64;
        if got < body_len {
            return Err(ConnectionError::Decode {
                frame_offset,
                source: OscError::Truncated {
                    offset: FRAME_HEADER_SIZE + got,
                    needed: body_len,
                    available: got,
                },
            });
        }

        decode_message(&body)
            .map(Some)
            .map_err(|source| ConnectionError::Decode {
                frame_offset,
                source,
            })
    }
}

/// Reads until `buf` is full or EOF; returns the number of bytes read.
async fn read_full<R: AsyncRead + Unpin>(
    reader: &mut R,
    buf: &mut [u8],
) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

// ── Writer ────────────────────────────────────────────────────────────────────

/// Writes framed [`OscMessage`]s.
///
/// Not safe for concurrent use: callers sharing one writer must hold a lock
/// around [`OscWriter::write_message`] (see `upstream::SharedUpstream`).
pub struct OscWriter<W> {
    inner: W,
}

impl<W: AsyncWrite + Unpin> OscWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    /// Encodes `msg` and writes the whole frame.
    ///
    /// # Errors
    ///
    /// [`ConnectionError::Encode`] if the message cannot be represented (no
    /// bytes are written), [`ConnectionError::Io`] if the write fails.
    pub async fn write_message(&mut self, msg: &OscMessage) -> Result<(), ConnectionError> {
        let frame = encode_frame(msg).map_err(ConnectionError::Encode)?;
        // `write_all` keeps writing until the whole frame is accepted, so a
        // partial write never leaves half a frame behind on success.
        self.inner.write_all(&frame).await?;
        self.inner.flush().await?;
        Ok(())
    }

    /// Flushes and closes the write direction.
    pub async fn shutdown(&mut self) -> std::io::Result<()> {
        self.inner.shutdown().await
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
