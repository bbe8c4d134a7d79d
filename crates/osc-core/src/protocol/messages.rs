//! OSC message types carried by the bridge.
//!
//! Only the simplified `i`/`f`/`s` type-tag alphabet is supported.  Every
//! argument carries its own tag byte on the wire, so the argument count is
//! implied by the framing rather than by a separate type-tag string.

// ── Wire constants ────────────────────────────────────────────────────────────

/// Size of the big-endian address length prefix.
pub const ADDRESS_LEN_SIZE: usize = 4;

/// Size of the big-endian string-argument length prefix.
pub const STRING_LEN_SIZE: usize = 2;

/// Size of the big-endian frame length prefix used on TCP streams.
pub const FRAME_HEADER_SIZE: usize = 4;

/// Largest string argument the 2-byte length prefix can describe.
pub const MAX_STRING_ARG_LEN: usize = u16::MAX as usize;

// ── Type tags ─────────────────────────────────────────────────────────────────

/// Argument type tag byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TypeTag {
    Int32 = b'i',
    Float32 = b'f',
    Str = b's',
}

impl TypeTag {
    /// Returns the tag as the single-character string used by the JSON shape.
    pub fn as_str(self) -> &'static str {
        match self {
            TypeTag::Int32 => "i",
            TypeTag::Float32 => "f",
            TypeTag::Str => "s",
        }
    }
}

impl TryFrom<u8> for TypeTag {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            b'i' => Ok(TypeTag::Int32),
            b'f' => Ok(TypeTag::Float32),
            b's' => Ok(TypeTag::Str),
            _ => Err(()),
        }
    }
}

// ── Values and messages ───────────────────────────────────────────────────────

/// A single typed OSC argument.
#[derive(Debug, Clone, PartialEq)]
pub enum OscValue {
    /// `'i'`: 32-bit signed integer.
    Int32(i32),
    /// `'f'`: 32-bit IEEE-754 float.
    Float32(f32),
    /// `'s'`: UTF-8 string of at most [`MAX_STRING_ARG_LEN`] bytes.
    Str(String),
}

impl OscValue {
    /// Returns the wire tag for this value.
    pub fn type_tag(&self) -> TypeTag {
        match self {
            OscValue::Int32(_) => TypeTag::Int32,
            OscValue::Float32(_) => TypeTag::Float32,
            OscValue::Str(_) => TypeTag::Str,
        }
    }

    /// Number of bytes this value occupies after its tag byte.
    pub fn payload_len(&self) -> usize {
        match self {
            OscValue::Int32(_) | OscValue::Float32(_) => 4,
            OscValue::Str(s) => STRING_LEN_SIZE + s.len(),
        }
    }
}

impl From<i32> for OscValue {
    fn from(v: i32) -> Self {
        OscValue::Int32(v)
    }
}

impl From<f32> for OscValue {
    fn from(v: f32) -> Self {
        OscValue::Float32(v)
    }
}

impl From<&str> for OscValue {
    fn from(v: &str) -> Self {
        OscValue::Str(v.to_string())
    }
}

impl From<String> for OscValue {
    fn from(v: String) -> Self {
        OscValue::Str(v)
    }
}

/// One OSC message: an address pattern plus ordered typed arguments.
///
/// A message is built fresh for each decode and passed through the bridge
/// once; it carries no identity of its own.
#[derive(Debug, Clone, PartialEq)]
pub struct OscMessage {
    /// Address pattern, e.g. `/fade`.  Never empty on the wire.
    pub address: String,
    /// Arguments in wire order.
    pub arguments: Vec<OscValue>,
}

impl OscMessage {
    /// Creates a message with no arguments.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            arguments: Vec::new(),
        }
    }

    /// Appends an argument, builder style.
    ///
    /// ```rust
    /// use osc_core::{OscMessage, OscValue};
    ///
    /// let msg = OscMessage::new("/fade").with_arg(0.5f32).with_arg(3);
    /// assert_eq!(msg.arguments, vec![OscValue::Float32(0.5), OscValue::Int32(3)]);
    /// ```
    pub fn with_arg(mut self, value: impl Into<OscValue>) -> Self {
        self.arguments.push(value.into());
        self
    }

    /// Exact size of this message's encoded body (without the frame prefix).
    pub fn encoded_len(&self) -> usize {
        ADDRESS_LEN_SIZE
            + self.address.len()
            + self
                .arguments
                .iter()
                .map(|a| 1 + a.payload_len())
                .sum::<usize>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_tag_try_from_known_bytes() {
        assert_eq!(TypeTag::try_from(b'i'), Ok(TypeTag::Int32));
        assert_eq!(TypeTag::try_from(b'f'), Ok(TypeTag::Float32));
        assert_eq!(TypeTag::try_from(b's'), Ok(TypeTag::Str));
    }

    #[test]
    fn test_type_tag_rejects_other_osc_tags() {
        // 'b' (blob) and 'T' (true) are valid OSC 1.0 tags but outside this alphabet.
        assert!(TypeTag::try_from(b'b').is_err());
        assert!(TypeTag::try_from(b'T').is_err());
        assert!(TypeTag::try_from(0).is_err());
    }

    #[test]
    fn test_type_tag_byte_matches_as_str() {
        for tag in [TypeTag::Int32, TypeTag::Float32, TypeTag::Str] {
            assert_eq!(tag.as_str().as_bytes(), &[tag as u8]);
        }
    }

    #[test]
    fn test_encoded_len_matches_size_formula() {
        // 4 + len("/fade") + (1 + 4) + (1 + 4) + (1 + 2 + 2)
        let msg = OscMessage::new("/fade")
            .with_arg(0.5f32)
            .with_arg(3)
            .with_arg("go");
        assert_eq!(msg.encoded_len(), 4 + 5 + 5 + 5 + 5);
    }

    #[test]
    fn test_value_type_tags() {
        assert_eq!(OscValue::from(1).type_tag(), TypeTag::Int32);
        assert_eq!(OscValue::from(1.0f32).type_tag(), TypeTag::Float32);
        assert_eq!(OscValue::from("x").type_tag(), TypeTag::Str);
    }
}
