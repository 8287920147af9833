//! Argument payload codec.
//!
//! The first and subsequent instances may come from different builds of the
//! host application, so the wire shape must not depend on field naming. The
//! default codec writes a bare JSON array of strings.

use crate::{RelayError, Result};

/// Encodes and decodes an argument list to and from a message payload.
///
/// Implementations must satisfy `decode(&encode(x)?)? == x` for every finite
/// sequence of strings.
pub trait ArgsCodec: Send + Sync + 'static {
    fn encode(&self, args: &[String]) -> Result<Vec<u8>>;
    fn decode(&self, payload: &[u8]) -> Result<Vec<String>>;
}

/// JSON array codec: `["app","--flag","value"]`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonArgsCodec;

impl ArgsCodec for JsonArgsCodec {
    fn encode(&self, args: &[String]) -> Result<Vec<u8>> {
        serde_json::to_vec(args).map_err(RelayError::from)
    }

    fn decode(&self, payload: &[u8]) -> Result<Vec<String>> {
        serde_json::from_slice(payload).map_err(|e| RelayError::Decode {
            message: format!("expected a JSON array of strings: {}", e),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(args: Vec<String>) {
        let codec = JsonArgsCodec;
        let bytes = codec.encode(&args).unwrap();
        assert_eq!(codec.decode(&bytes).unwrap(), args);
    }

    #[test]
    fn test_roundtrip_preserves_tricky_values() {
        roundtrip(vec![
            "app".to_string(),
            String::new(),
            "  padded  ".to_string(),
            "Größe 日本語 🚀".to_string(),
            "quote \" comma , bracket ]".to_string(),
            "line\nbreak\ttab\\slash".to_string(),
            "dup".to_string(),
            "dup".to_string(),
            "\u{0}nul".to_string(),
        ]);
    }

    #[test]
    fn test_roundtrip_empty_sequence() {
        roundtrip(Vec::new());
    }

    #[test]
    fn test_wire_shape_is_bare_array() {
        let bytes = JsonArgsCodec
            .encode(&["app".to_string(), "--Flag".to_string()])
            .unwrap();
        assert_eq!(bytes, br#"["app","--Flag"]"#);
    }

    #[test]
    fn test_decode_rejects_non_string_arrays() {
        let err = JsonArgsCodec.decode(br#"{"args": ["x"]}"#).unwrap_err();
        assert!(matches!(err, RelayError::Decode { .. }));

        let err = JsonArgsCodec.decode(b"[1, 2]").unwrap_err();
        assert!(matches!(err, RelayError::Decode { .. }));

        let err = JsonArgsCodec.decode(&[0xff, 0xfe]).unwrap_err();
        assert!(matches!(err, RelayError::Decode { .. }));
    }
}
