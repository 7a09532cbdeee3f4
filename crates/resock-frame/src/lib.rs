//! Newline-delimited message framing with push-back resynchronization.
//!
//! Every message travels as one compact JSON document followed by a single
//! `\n`. Two readers are provided:
//! - [`FrameParser`] consumes arbitrary chunks from a
//!   [`ResilientConnection`](resock_transport::ResilientConnection), yielding
//!   one message per chunk and pushing any excess bytes back upstream;
//! - [`DelimitedCodec`] is a `tokio_util` codec for plain streams.
//!
//! Payload encoding is pluggable through [`Translator`].

pub mod accumulator;
pub mod codec;
pub mod error;
pub mod parser;
pub mod translator;

pub use accumulator::{ChunkAccumulator, Feed};
pub use codec::{encode_frame, find_delimiter, DelimitedCodec, FrameConfig, DEFAULT_MAX_FRAME, DELIMITER};
pub use error::{FrameError, Result};
pub use parser::FrameParser;
pub use translator::{JsonTranslator, Translator};
