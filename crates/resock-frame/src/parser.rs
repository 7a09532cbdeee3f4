use bytes::{Bytes, BytesMut};
use resock_transport::PushBack;
use tracing::{debug, trace};

use crate::accumulator::{ChunkAccumulator, Feed};
use crate::codec::{encode_frame, find_delimiter, FrameConfig};
use crate::error::{FrameError, Result};
use crate::translator::{JsonTranslator, Translator};

/// Turns a chunked byte stream into decoded messages.
///
/// Each call to [`handle_data`](Self::handle_data) yields at most one
/// message: the chunk is split at its first delimiter and everything after
/// it is pushed back upstream, so it comes back as a fresh chunk and every
/// frame boundary is found exactly once.
///
/// Call [`reset`](Self::reset) whenever the underlying connection is
/// re-established; a partial frame from a dead transport has no continuation.
///
/// A frame that outgrows [`FrameConfig::max_frame_size`] is reported once and
/// its remaining bytes are skipped up to the next delimiter.
pub struct FrameParser<T = JsonTranslator> {
    buffer: ChunkAccumulator,
    /// Inside an oversized frame; drop bytes until its delimiter.
    discarding: bool,
    translator: T,
    config: FrameConfig,
}

impl<T: Translator> FrameParser<T> {
    pub fn new(translator: T) -> Self {
        Self::with_config(translator, FrameConfig::default())
    }

    pub fn with_config(translator: T, config: FrameConfig) -> Self {
        Self {
            buffer: ChunkAccumulator::new(),
            discarding: false,
            translator,
            config,
        }
    }

    /// Consume one chunk read from `upstream`.
    ///
    /// Returns `Ok(None)` while a frame is incomplete. A malformed frame is
    /// reported as an error after its excess bytes have been pushed back, so
    /// the frames behind it are still delivered.
    pub fn handle_data<P>(&mut self, chunk: Bytes, upstream: &mut P) -> Result<Option<T::Message>>
    where
        P: PushBack + ?Sized,
    {
        if self.discarding {
            return self.skip_oversized(chunk, upstream);
        }

        match self.buffer.feed(chunk) {
            Feed::Pending => {
                let size = self.buffer.len();
                if size > self.config.max_frame_size {
                    self.buffer.clear();
                    self.discarding = true;
                    return Err(FrameError::FrameTooLarge {
                        size,
                        max: self.config.max_frame_size,
                    });
                }
                Ok(None)
            }
            Feed::Complete { frame, excess } => {
                if !excess.is_empty() {
                    trace!(len = excess.len(), "returning excess bytes upstream");
                    upstream.unshift(excess)?;
                }
                if frame.len() > self.config.max_frame_size {
                    return Err(FrameError::FrameTooLarge {
                        size: frame.len(),
                        max: self.config.max_frame_size,
                    });
                }
                self.translator.decode(&frame).map(Some)
            }
        }
    }

    fn skip_oversized<P>(&mut self, chunk: Bytes, upstream: &mut P) -> Result<Option<T::Message>>
    where
        P: PushBack + ?Sized,
    {
        match find_delimiter(&chunk) {
            None => {
                trace!(len = chunk.len(), "skipping oversized frame");
                Ok(None)
            }
            Some(pos) => {
                self.discarding = false;
                let excess = chunk.slice(pos + 1..);
                if !excess.is_empty() {
                    upstream.unshift(excess)?;
                }
                Ok(None)
            }
        }
    }

    /// Discard any partial frame.
    pub fn reset(&mut self) {
        if !self.buffer.is_empty() {
            debug!(
                discarded = self.buffer.len(),
                "dropping partial frame from previous connection"
            );
        }
        self.buffer.clear();
        self.discarding = false;
    }

    /// Encode `message` as a complete wire frame (payload + delimiter).
    pub fn encode(&self, message: &T::Message) -> Result<Bytes> {
        let payload = self.translator.encode(message)?;
        let mut frame = BytesMut::with_capacity(payload.len() + 1);
        encode_frame(&payload, &mut frame)?;
        Ok(frame.freeze())
    }

    /// Bytes buffered toward the next frame.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn translator(&self) -> &T {
        &self.translator
    }

    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl<T: Translator + Default> Default for FrameParser<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}
