use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::{FrameError, Result};

/// Byte terminating every frame. Never valid inside an encoded payload.
pub const DELIMITER: u8 = b'\n';

/// Default maximum frame size: 16 MiB.
pub const DEFAULT_MAX_FRAME: usize = 16 * 1024 * 1024;

/// Configuration for frame parsing.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum bytes buffered for one frame before it is rejected. Default: 16 MiB.
    pub max_frame_size: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME,
        }
    }
}

/// Position of the first delimiter in `bytes`.
pub fn find_delimiter(bytes: &[u8]) -> Option<usize> {
    bytes.iter().position(|b| *b == DELIMITER)
}

/// Encode a payload into the wire format.
///
/// Wire format:
/// ```text
/// ┌──────────────────────────┬──────┐
/// │ Payload (any length)     │ 0x0A │
/// │ (no 0x0A inside)         │ "\n" │
/// └──────────────────────────┴──────┘
/// ```
pub fn encode_frame(payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    if let Some(offset) = find_delimiter(payload) {
        return Err(FrameError::DelimiterInPayload { offset });
    }
    dst.reserve(payload.len() + 1);
    dst.put_slice(payload);
    dst.put_u8(DELIMITER);
    Ok(())
}

/// `tokio_util` codec for delimiter-terminated frames.
///
/// Yields raw payloads; turning them into messages is left to a
/// [`Translator`](crate::Translator) so one malformed frame does not end the
/// stream. An oversized frame is reported once and the rest of it is skipped
/// up to its delimiter.
#[derive(Debug, Clone)]
pub struct DelimitedCodec {
    config: FrameConfig,
    /// Bytes at the head of the buffer already searched for a delimiter.
    scanned: usize,
    discarding: bool,
}

impl DelimitedCodec {
    pub fn new() -> Self {
        Self::with_config(FrameConfig::default())
    }

    pub fn with_config(config: FrameConfig) -> Self {
        Self {
            config,
            scanned: 0,
            discarding: false,
        }
    }

    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl Default for DelimitedCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for DelimitedCodec {
    type Item = Bytes;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>> {
        if self.discarding {
            match find_delimiter(src) {
                Some(pos) => {
                    src.advance(pos + 1);
                    self.discarding = false;
                }
                None => {
                    src.clear();
                    return Ok(None);
                }
            }
        }

        match find_delimiter(&src[self.scanned..]) {
            Some(pos) => {
                let end = self.scanned + pos;
                self.scanned = 0;
                let payload = src.split_to(end).freeze();
                src.advance(1);
                Ok(Some(payload))
            }
            None if src.len() > self.config.max_frame_size => {
                let size = src.len();
                src.clear();
                self.scanned = 0;
                self.discarding = true;
                Err(FrameError::FrameTooLarge {
                    size,
                    max: self.config.max_frame_size,
                })
            }
            None => {
                self.scanned = src.len();
                Ok(None)
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>> {
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None => {
                if !src.is_empty() {
                    tracing::debug!(len = src.len(), "discarding unterminated frame at eof");
                    src.clear();
                }
                self.scanned = 0;
                self.discarding = false;
                Ok(None)
            }
        }
    }
}

impl<'a> Encoder<&'a [u8]> for DelimitedCodec {
    type Error = FrameError;

    fn encode(&mut self, payload: &'a [u8], dst: &mut BytesMut) -> Result<()> {
        encode_frame(payload, dst)
    }
}

impl Encoder<Bytes> for DelimitedCodec {
    type Error = FrameError;

    fn encode(&mut self, payload: Bytes, dst: &mut BytesMut) -> Result<()> {
        encode_frame(&payload, dst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_appends_delimiter() {
        let mut buf = BytesMut::new();
        encode_frame(br#"{"a":1}"#, &mut buf).unwrap();
        assert_eq!(buf.as_ref(), b"{\"a\":1}\n");
    }

    #[test]
    fn encode_rejects_embedded_delimiter() {
        let mut buf = BytesMut::new();
        let err = encode_frame(b"ab\ncd", &mut buf).unwrap_err();
        assert!(matches!(err, FrameError::DelimiterInPayload { offset: 2 }));
        assert!(buf.is_empty());
    }

    #[test]
    fn decode_incomplete_frame() {
        let mut codec = DelimitedCodec::new();
        let mut buf = BytesMut::from(&b"{\"a\""[..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), 4);
    }

    #[test]
    fn decode_multiple_frames() {
        let mut codec = DelimitedCodec::new();
        let mut buf = BytesMut::from(&b"first\nsecond\nthi"[..]);

        assert_eq!(codec.decode(&mut buf).unwrap().unwrap().as_ref(), b"first");
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap().as_ref(), b"second");
        assert!(codec.decode(&mut buf).unwrap().is_none());

        buf.put_slice(b"rd\n");
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap().as_ref(), b"third");
        assert!(buf.is_empty());
    }

    #[test]
    fn decode_empty_payload() {
        let mut codec = DelimitedCodec::new();
        let mut buf = BytesMut::from(&b"\n"[..]);
        let frame = codec.decode(&mut buf).unwrap().unwrap();
        assert!(frame.is_empty());
    }

    #[test]
    fn decode_rejects_oversized_frame() {
        let mut codec = DelimitedCodec::with_config(FrameConfig { max_frame_size: 8 });
        let mut buf = BytesMut::from(&b"0123456789"[..]);
        let err = codec.decode(&mut buf).unwrap_err();
        assert!(matches!(err, FrameError::FrameTooLarge { size: 10, max: 8 }));
        assert!(buf.is_empty());
    }

    #[test]
    fn decode_skips_rest_of_oversized_frame() {
        let mut codec = DelimitedCodec::with_config(FrameConfig { max_frame_size: 4 });
        let mut buf = BytesMut::from(&b"12345"[..]);
        assert!(codec.decode(&mut buf).is_err());

        buf.put_slice(b"67");
        assert!(codec.decode(&mut buf).unwrap().is_none());
        assert!(buf.is_empty());

        buf.put_slice(b"89\n7\n");
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap().as_ref(), b"7");
        assert!(buf.is_empty());
    }

    #[test]
    fn decode_eof_drops_unterminated_tail() {
        let mut codec = DelimitedCodec::new();
        let mut buf = BytesMut::from(&b"done\npartial"[..]);
        assert_eq!(codec.decode_eof(&mut buf).unwrap().unwrap().as_ref(), b"done");
        assert!(codec.decode_eof(&mut buf).unwrap().is_none());
        assert!(buf.is_empty());
    }

    #[tokio::test]
    async fn framed_roundtrip_over_duplex() {
        use futures_util::{SinkExt, StreamExt};
        use tokio_util::codec::Framed;

        let (left, right) = tokio::io::duplex(256);
        let mut writer = Framed::new(left, DelimitedCodec::new());
        let mut reader = Framed::new(right, DelimitedCodec::new());

        writer.send(Bytes::from_static(b"{\"n\":1}")).await.unwrap();
        writer.send(&b"{\"n\":2}"[..]).await.unwrap();

        let f1 = reader.next().await.unwrap().unwrap();
        let f2 = reader.next().await.unwrap().unwrap();
        assert_eq!(f1.as_ref(), b"{\"n\":1}");
        assert_eq!(f2.as_ref(), b"{\"n\":2}");
    }
}
