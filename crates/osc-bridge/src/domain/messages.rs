//! JSON message shape for the WebSocket side of the bridge.
//!
//! Both directions use the same object:
//!
//! ```json
//! {"address":"/fade","arguments":[{"type":"f","value":0.5},{"type":"i","value":3}]}
//! ```
//!
//! Serde's adjacently tagged representation (`tag = "type"`,
//! `content = "value"`) maps each argument to exactly that `{type, value}`
//! pair, and rejects unknown tags or mistyped values at parse time.

use serde::{Deserialize, Serialize};

/// One OSC message as seen by WebSocket clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OscMessageJson {
    /// OSC address pattern, e.g. `"/fade"`.
    pub address: String,

    /// Typed arguments in order.  May be omitted by clients sending a
    /// message without arguments.
    #[serde(default)]
    pub arguments: Vec<OscArgumentJson>,
}

/// A single typed argument inside [`OscMessageJson`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum OscArgumentJson {
    /// `{"type":"i","value":<integer>}`; must fit in an `i32`.
    #[serde(rename = "i")]
    Int(i32),

    /// `{"type":"f","value":<number>}`; integers are accepted and widened.
    #[serde(rename = "f")]
    Float(f32),

    /// `{"type":"s","value":<string>}`.
    #[serde(rename = "s")]
    Str(String),
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serializes_with_type_and_value_fields() {
        // Arrange
        let msg = OscMessageJson {
            address: "/fade".to_string(),
            arguments: vec![OscArgumentJson::Float(0.5), OscArgumentJson::Int(3)],
        };

        // Act
        let json = serde_json::to_string(&msg).unwrap();

        // Assert
        assert_eq!(
            json,
            r#"{"address":"/fade","arguments":[{"type":"f","value":0.5},{"type":"i","value":3}]}"#
        );
    }

    #[test]
    fn test_parses_cue_example() {
        let msg: OscMessageJson =
            serde_json::from_str(r#"{"address":"/cue","arguments":[{"type":"s","value":"go"}]}"#)
                .unwrap();
        assert_eq!(msg.address, "/cue");
        assert_eq!(msg.arguments, vec![OscArgumentJson::Str("go".to_string())]);
    }

    #[test]
    fn test_missing_arguments_defaults_to_empty() {
        let msg: OscMessageJson = serde_json::from_str(r#"{"address":"/blackout"}"#).unwrap();
        assert!(msg.arguments.is_empty());
    }

    #[test]
    fn test_float_accepts_integer_literal() {
        let arg: OscArgumentJson = serde_json::from_str(r#"{"type":"f","value":1}"#).unwrap();
        assert_eq!(arg, OscArgumentJson::Float(1.0));
    }

    #[test]
    fn test_unknown_type_tag_is_rejected() {
        let result = serde_json::from_str::<OscArgumentJson>(r#"{"type":"b","value":"AA=="}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_int_out_of_range_is_rejected() {
        let result = serde_json::from_str::<OscArgumentJson>(r#"{"type":"i","value":4294967296}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_int_with_fraction_is_rejected() {
        let result = serde_json::from_str::<OscArgumentJson>(r#"{"type":"i","value":1.5}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_value_type_mismatch_is_rejected() {
        let result = serde_json::from_str::<OscArgumentJson>(r#"{"type":"s","value":3}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_address_is_rejected() {
        let result = serde_json::from_str::<OscMessageJson>(r#"{"arguments":[]}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_top_level_field_is_rejected() {
        // The legacy shape carried a separate type-tag string; it is not accepted.
        let result =
            serde_json::from_str::<OscMessageJson>(r#"{"address":"/a","typeTag":",i","arguments":[]}"#);
        assert!(result.is_err());
    }
}
