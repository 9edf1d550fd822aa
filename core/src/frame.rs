//! Decoded frames.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// One typed logical record extracted from the byte stream.
///
/// `payload` holds the raw JSON text of the `data:` line. The decoder only
/// checks that it is well-formed; schema interpretation belongs to the
/// reducer. Frames are never mutated after decode.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    /// Open vocabulary: "start", "token", "step", "complete", "error", ...
    pub kind: String,
    /// Well-formed JSON document, exactly as received
    pub payload: String,
    /// Zero-based position among the frames emitted by one decoder
    pub arrival_order: u64,
}

impl Frame {
    pub fn new(kind: impl Into<String>, payload: impl Into<String>, arrival_order: u64) -> Self {
        Self {
            kind: kind.into(),
            payload: payload.into(),
            arrival_order,
        }
    }

    /// Deserialize the payload into a typed value
    pub fn parse<T: DeserializeOwned>(&self) -> crate::Result<T> {
        Ok(serde_json::from_str(&self.payload)?)
    }

    /// Payload as a generic JSON value
    pub fn value(&self) -> crate::Result<serde_json::Value> {
        self.parse()
    }

    pub fn payload_bytes(&self) -> &[u8] {
        self.payload.as_bytes()
    }

    pub fn is_kind(&self, kind: &str) -> bool {
        self.kind == kind
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Token {
        token: String,
    }

    #[test]
    fn test_parse_typed_payload() {
        let frame = Frame::new("token", r#"{"token":"hi"}"#, 0);
        let token: Token = frame.parse().unwrap();
        assert_eq!(token.token, "hi");
        assert!(frame.is_kind("token"));
    }

    #[test]
    fn test_parse_mismatch_is_error() {
        let frame = Frame::new("token", "42", 3);
        assert!(frame.parse::<Token>().is_err());
        assert_eq!(frame.value().unwrap(), serde_json::json!(42));
    }
}
