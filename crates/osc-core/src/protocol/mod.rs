//! Protocol module containing OSC message types and the binary codec.

pub mod codec;
pub mod messages;

pub use codec::{decode_frame, decode_message, encode_frame, encode_message, OscError};
pub use messages::*;
