use std::fmt;
use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::codec::DELIMITER;
use crate::error::{FrameError, Result};

/// Converts application messages to and from frame payloads.
///
/// Implementations must uphold two laws:
/// - `decode(&encode(m)?)? == m` for every encodable `m`;
/// - `encode` never produces the frame [`DELIMITER`].
///
/// `decode` rejects bytes that encode no message, including the empty slice.
pub trait Translator {
    /// The application-level message type.
    type Message;

    /// Encode a message into payload bytes (without delimiter).
    fn encode(&self, message: &Self::Message) -> Result<Vec<u8>>;

    /// Decode payload bytes (without delimiter) into a message.
    fn decode(&self, payload: &[u8]) -> Result<Self::Message>;
}

/// Compact JSON payloads.
///
/// `serde_json` escapes control characters inside strings and never emits
/// insignificant whitespace in compact mode, so a raw `\n` cannot appear in
/// the output.
pub struct JsonTranslator<M = serde_json::Value> {
    _message: PhantomData<fn() -> M>,
}

impl<M> JsonTranslator<M> {
    pub fn new() -> Self {
        Self {
            _message: PhantomData,
        }
    }
}

impl<M> Default for JsonTranslator<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M> Clone for JsonTranslator<M> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<M> fmt::Debug for JsonTranslator<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonTranslator")
            .field("message", &std::any::type_name::<M>())
            .finish()
    }
}

impl<M: Serialize + DeserializeOwned> Translator for JsonTranslator<M> {
    type Message = M;

    fn encode(&self, message: &M) -> Result<Vec<u8>> {
        let payload = serde_json::to_vec(message).map_err(FrameError::Encode)?;
        if let Some(offset) = payload.iter().position(|b| *b == DELIMITER) {
            return Err(FrameError::DelimiterInPayload { offset });
        }
        Ok(payload)
    }

    fn decode(&self, payload: &[u8]) -> Result<M> {
        if payload.is_empty() {
            return Err(FrameError::EmptyFrame);
        }
        serde_json::from_slice(payload).map_err(|source| FrameError::Decode {
            len: payload.len(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;
    use serde_json::{json, Value};

    use super::*;

    #[test]
    fn roundtrip_preserves_structured_values() {
        let translator = JsonTranslator::<Value>::new();
        let samples = [
            json!({"a": 1}),
            json!("Hello everyone : 4242"),
            json!([1, "two", null, {"nested": [true, false]}]),
            json!(3.5),
            json!(null),
        ];
        for message in samples {
            let payload = translator.encode(&message).unwrap();
            assert_eq!(translator.decode(&payload).unwrap(), message);
        }
    }

    #[test]
    fn newlines_inside_strings_are_escaped() {
        let translator = JsonTranslator::<Value>::new();
        let message = json!({"text": "line one\nline two\r\n", "key\n": "\n"});
        let payload = translator.encode(&message).unwrap();
        assert!(!payload.contains(&DELIMITER));
        assert_eq!(translator.decode(&payload).unwrap(), message);
    }

    #[test]
    fn empty_payload_is_rejected() {
        let translator = JsonTranslator::<Value>::new();
        assert!(matches!(
            translator.decode(b""),
            Err(FrameError::EmptyFrame)
        ));
    }

    #[test]
    fn malformed_payload_is_a_decode_error() {
        let translator = JsonTranslator::<Value>::new();
        let err = translator.decode(b"{\"a\":").unwrap_err();
        assert!(matches!(err, FrameError::Decode { len: 5, .. }));
        assert!(err.is_protocol_violation());

        assert!(translator.decode(&[0xff, 0xfe, 0x00]).is_err());
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Ping {
        seq: u32,
        note: String,
    }

    #[test]
    fn typed_messages_roundtrip() {
        let translator = JsonTranslator::<Ping>::new();
        let ping = Ping {
            seq: 7,
            note: "hi\nthere".to_string(),
        };
        let payload = translator.encode(&ping).unwrap();
        assert_eq!(translator.decode(&payload).unwrap(), ping);
    }

    #[test]
    fn typed_decode_rejects_wrong_shape() {
        let translator = JsonTranslator::<Ping>::new();
        let err = translator.decode(br#"{"seq":"x"}"#).unwrap_err();
        assert!(matches!(err, FrameError::Decode { .. }));
    }
}
