use bytes::{Bytes, BytesMut};

use crate::codec::find_delimiter;

/// Result of feeding one chunk to a [`ChunkAccumulator`].
#[derive(Debug, PartialEq, Eq)]
pub enum Feed {
    /// No delimiter yet; the chunk was buffered.
    Pending,
    /// A frame is complete.
    ///
    /// `frame` is every buffered chunk plus the new chunk up to its first
    /// delimiter. `excess` is everything after that delimiter; the caller
    /// owns it and decides where it goes.
    Complete { frame: Bytes, excess: Bytes },
}

/// Collects chunks until a delimiter arrives.
///
/// Chunks are kept as received and only concatenated when a frame
/// completes. After a [`Feed::Complete`] the accumulator is empty: it never
/// holds a complete frame and never keeps excess bytes.
#[derive(Debug, Default)]
pub struct ChunkAccumulator {
    chunks: Vec<Bytes>,
    len: usize,
}

impl ChunkAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `chunk`, splitting it at its first delimiter if it has one.
    pub fn feed(&mut self, chunk: Bytes) -> Feed {
        match find_delimiter(&chunk) {
            None => {
                if !chunk.is_empty() {
                    self.len += chunk.len();
                    self.chunks.push(chunk);
                }
                Feed::Pending
            }
            Some(pos) => {
                let excess = chunk.slice(pos + 1..);
                let mut head = chunk;
                head.truncate(pos);
                if !head.is_empty() {
                    self.len += head.len();
                    self.chunks.push(head);
                }
                Feed::Complete {
                    frame: self.take(),
                    excess,
                }
            }
        }
    }

    /// Buffered byte count.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Drop everything buffered.
    pub fn clear(&mut self) {
        self.chunks.clear();
        self.len = 0;
    }

    fn take(&mut self) -> Bytes {
        let frame = match self.chunks.len() {
            0 => Bytes::new(),
            1 => self.chunks.pop().unwrap_or_default(),
            _ => {
                let mut joined = BytesMut::with_capacity(self.len);
                for chunk in &self.chunks {
                    joined.extend_from_slice(chunk);
                }
                joined.freeze()
            }
        };
        self.clear();
        frame
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete(frame: &[u8], excess: &[u8]) -> Feed {
        Feed::Complete {
            frame: Bytes::copy_from_slice(frame),
            excess: Bytes::copy_from_slice(excess),
        }
    }

    #[test]
    fn buffers_until_delimiter() {
        let mut acc = ChunkAccumulator::new();
        assert_eq!(acc.feed(Bytes::from_static(b"{\"a\"")), Feed::Pending);
        assert_eq!(acc.feed(Bytes::from_static(b":1")), Feed::Pending);
        assert_eq!(acc.len(), 6);

        assert_eq!(acc.feed(Bytes::from_static(b"}\n")), complete(b"{\"a\":1}", b""));
        assert!(acc.is_empty());
    }

    #[test]
    fn splits_at_first_delimiter_only() {
        let mut acc = ChunkAccumulator::new();
        assert_eq!(
            acc.feed(Bytes::from_static(b"one\ntwo\nthree")),
            complete(b"one", b"two\nthree")
        );
        assert!(acc.is_empty());
    }

    #[test]
    fn leading_delimiter_completes_buffered_frame() {
        let mut acc = ChunkAccumulator::new();
        acc.feed(Bytes::from_static(b"abc"));
        assert_eq!(acc.feed(Bytes::from_static(b"\nxyz")), complete(b"abc", b"xyz"));
    }

    #[test]
    fn lone_delimiter_yields_empty_frame() {
        let mut acc = ChunkAccumulator::new();
        assert_eq!(acc.feed(Bytes::from_static(b"\n")), complete(b"", b""));
    }

    #[test]
    fn clear_discards_partial_frame() {
        let mut acc = ChunkAccumulator::new();
        acc.feed(Bytes::from_static(b"stale"));
        acc.clear();
        assert!(acc.is_empty());
        assert_eq!(acc.feed(Bytes::from_static(b"fresh\n")), complete(b"fresh", b""));
    }
}
