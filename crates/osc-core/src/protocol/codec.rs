//! Binary codec for OSC messages exchanged with the bridge.
//!
//! Message body:
//! ```text
//! [address_len:4][address:N] ( [tag:1][payload] )*
//!
//!   tag 'i' → [i32:4]
//!   tag 'f' → [f32:4]
//!   tag 's' → [len:2][utf8:len]
//! ```
//! Stream frame (what actually travels on TCP):
//! ```text
//! [body_len:4][body:body_len]
//! ```
//! All multi-byte integers are big-endian.  The body has no terminator: the
//! decoder consumes arguments until the supplied buffer is exhausted, which is
//! why streams need the outer frame length.

use thiserror::Error;

use crate::protocol::messages::{
    OscMessage, OscValue, TypeTag, ADDRESS_LEN_SIZE, FRAME_HEADER_SIZE, MAX_STRING_ARG_LEN,
};

/// Errors that can occur while encoding or decoding OSC messages.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum OscError {
    /// A field declares more bytes than remain in the buffer.
    #[error("truncated at offset {offset}: need {needed} bytes, {available} available")]
    Truncated {
        offset: usize,
        needed: usize,
        available: usize,
    },

    /// An argument tag byte outside the `i`/`f`/`s` alphabet.
    #[error("unknown argument tag 0x{tag:02X} at offset {offset}")]
    UnknownTag { tag: u8, offset: usize },

    /// A string field is not valid UTF-8.
    #[error("invalid UTF-8 in string at offset {offset}")]
    InvalidUtf8 { offset: usize },

    /// The address is zero bytes long.
    #[error("OSC address must not be empty")]
    EmptyAddress,

    /// A string argument is longer than its 2-byte length prefix allows.
    #[error("string argument of {len} bytes exceeds the {max}-byte limit")]
    StringTooLong { len: usize, max: usize },

    /// The encoded body does not fit a 4-byte length prefix.
    #[error("encoded message of {0} bytes does not fit a 32-bit length prefix")]
    MessageTooLarge(usize),
}

impl OscError {
    /// Byte offset the error refers to, when there is one.
    pub fn offset(&self) -> Option<usize> {
        match self {
            OscError::Truncated { offset, .. }
            | OscError::UnknownTag { offset, .. }
            | OscError::InvalidUtf8 { offset } => Some(*offset),
            _ => None,
        }
    }
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Encodes the body of `msg` (no frame prefix).
///
/// The output is exactly [`OscMessage::encoded_len`] bytes long.
///
/// # Errors
///
/// [`OscError::EmptyAddress`], [`OscError::StringTooLong`] or
/// [`OscError::MessageTooLarge`] when the message cannot be represented.
///
/// # Examples
///
/// ```rust
/// use osc_core::{decode_message, encode_message, OscMessage};
///
/// let msg = OscMessage::new("/fade").with_arg(0.5f32).with_arg(3);
/// let bytes = encode_message(&msg).unwrap();
/// assert_eq!(&bytes[..4], &[0, 0, 0, 5]);
/// assert_eq!(decode_message(&bytes).unwrap(), msg);
/// ```
pub fn encode_message(msg: &OscMessage) -> Result<Vec<u8>, OscError> {
    let len = checked_body_len(msg)?;
    let mut buf = Vec::with_capacity(len);
    write_body(&mut buf, msg);
    Ok(buf)
}

/// Decodes one message body occupying the whole of `bytes`.
///
/// # Errors
///
/// Returns [`OscError::Truncated`] if a field runs past the end of `bytes`,
/// [`OscError::UnknownTag`] for a tag byte outside `i`/`f`/`s`, and
/// [`OscError::InvalidUtf8`] / [`OscError::EmptyAddress`] for bad strings.
pub fn decode_message(bytes: &[u8]) -> Result<OscMessage, OscError> {
    let mut cur = Cursor::new(bytes);

    let addr_len = cur.read_u32()? as usize;
    if addr_len == 0 {
        return Err(OscError::EmptyAddress);
    }
    let address = cur.read_str(addr_len)?;

    let mut arguments = Vec::new();
    while !cur.is_empty() {
        let tag_offset = cur.offset();
        let tag_byte = cur.read_u8()?;
        let tag = TypeTag::try_from(tag_byte).map_err(|_| OscError::UnknownTag {
            tag: tag_byte,
            offset: tag_offset,
        })?;
        let value = match tag {
            TypeTag::Int32 => OscValue::Int32(i32::from_be_bytes(cur.read_array()?)),
            TypeTag::Float32 => OscValue::Float32(f32::from_be_bytes(cur.read_array()?)),
            TypeTag::Str => {
                let len = u16::from_be_bytes(cur.read_array()?) as usize;
                OscValue::Str(cur.read_str(len)?)
            }
        };
        arguments.push(value);
    }

    Ok(OscMessage { address, arguments })
}

/// Encodes `msg` as a stream frame: 4-byte body length followed by the body.
///
/// # Errors
///
/// Same as [`encode_message`].
pub fn encode_frame(msg: &OscMessage) -> Result<Vec<u8>, OscError> {
    let len = checked_body_len(msg)?;
    let mut buf = Vec::with_capacity(FRAME_HEADER_SIZE + len);
    buf.extend_from_slice(&(len as u32).to_be_bytes());
    write_body(&mut buf, msg);
    Ok(buf)
}

/// Decodes one frame from the front of `bytes`.
///
/// Returns the message and the number of bytes consumed so the caller can
/// advance past it.  Any strict prefix of a valid frame yields
/// [`OscError::Truncated`].
///
/// # Examples
///
/// ```rust
/// use osc_core::{decode_frame, encode_frame, OscMessage};
///
/// let msg = OscMessage::new("/cue").with_arg("go");
/// let frame = encode_frame(&msg).unwrap();
/// let (decoded, consumed) = decode_frame(&frame).unwrap();
/// assert_eq!(decoded, msg);
/// assert_eq!(consumed, frame.len());
/// ```
pub fn decode_frame(bytes: &[u8]) -> Result<(OscMessage, usize), OscError> {
    let header: [u8; FRAME_HEADER_SIZE] = Cursor::new(bytes).read_array()?;
    let body_len = frame_body_len(&header);
    let total = FRAME_HEADER_SIZE + body_len;
    if bytes.len() < total {
        return Err(OscError::Truncated {
            offset: FRAME_HEADER_SIZE,
            needed: body_len,
            available: bytes.len() - FRAME_HEADER_SIZE,
        });
    }
    let msg = decode_message(&bytes[FRAME_HEADER_SIZE..total])
        .map_err(|e| shift(e, FRAME_HEADER_SIZE))?;
    Ok((msg, total))
}

/// Reads the body length out of a frame header.
pub fn frame_body_len(header: &[u8; FRAME_HEADER_SIZE]) -> usize {
    u32::from_be_bytes(*header) as usize
}

// ── Encoding helpers ──────────────────────────────────────────────────────────

fn checked_body_len(msg: &OscMessage) -> Result<usize, OscError> {
    if msg.address.is_empty() {
        return Err(OscError::EmptyAddress);
    }
    for arg in &msg.arguments {
        if let OscValue::Str(s) = arg {
            if s.len() > MAX_STRING_ARG_LEN {
                return Err(OscError::StringTooLong {
                    len: s.len(),
                    max: MAX_STRING_ARG_LEN,
                });
            }
        }
    }
    let len = msg.encoded_len();
    if len > u32::MAX as usize {
        return Err(OscError::MessageTooLarge(len));
    }
    Ok(len)
}

/// Writes the message body.  Lengths must already be validated.
fn write_body(buf: &mut Vec<u8>, msg: &OscMessage) {
    buf.extend_from_slice(&(msg.address.len() as u32).to_be_bytes());
    buf.extend_from_slice(msg.address.as_bytes());
    for arg in &msg.arguments {
        buf.push(arg.type_tag() as u8);
        match arg {
            OscValue::Int32(v) => buf.extend_from_slice(&v.to_be_bytes()),
            OscValue::Float32(v) => buf.extend_from_slice(&v.to_be_bytes()),
            OscValue::Str(s) => {
                buf.extend_from_slice(&(s.len() as u16).to_be_bytes());
                buf.extend_from_slice(s.as_bytes());
            }
        }
    }
}

/// Moves an error's offset from body-relative to frame-relative.
fn shift(err: OscError, by: usize) -> OscError {
    match err {
        OscError::Truncated {
            offset,
            needed,
            available,
        } => OscError::Truncated {
            offset: offset + by,
            needed,
            available,
        },
        OscError::UnknownTag { tag, offset } => OscError::UnknownTag {
            tag,
            offset: offset + by,
        },
        OscError::InvalidUtf8 { offset } => OscError::InvalidUtf8 {
            offset: offset + by,
        },
        other => other,
    }
}

// ── Decoding cursor ───────────────────────────────────────────────────────────

/// Bounds-checked forward reader over a byte slice.
///
/// Every read checks the declared size against what is left before touching
/// the data, so a hostile length prefix can never cause an allocation larger
/// than the input itself.
struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn offset(&self) -> usize {
        self.pos
    }

    fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], OscError> {
        let available = self.buf.len() - self.pos;
        if available < n {
            return Err(OscError::Truncated {
                offset: self.offset(),
                needed: n,
                available,
            });
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn read_u8(&mut self) -> Result<u8, OscError> {
        Ok(self.take(1)?[0])
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], OscError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn read_u32(&mut self) -> Result<u32, OscError> {
        Ok(u32::from_be_bytes(self.read_array::<ADDRESS_LEN_SIZE>()?))
    }

    fn read_str(&mut self, len: usize) -> Result<String, OscError> {
        let offset = self.offset();
        let bytes = self.take(len)?;
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|_| OscError::InvalidUtf8 { offset })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
