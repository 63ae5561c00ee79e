//! Terminator-delimited, byte-stuffed framing for the sensor serial protocol.
//!
//! This is the core value-add layer of sensorbridge. Every frame on the wire is:
//! - the payload, with each reserved byte preceded by the escape byte `0xFE`
//! - a single terminator byte `0xFF`
//!
//! There is no length prefix; only an unescaped terminator ends a frame.

#[cfg(feature = "async")]
pub mod async_codec;
pub mod codec;
pub mod error;
pub mod reader;
pub mod writer;

#[cfg(feature = "async")]
pub use async_codec::FrameCodec;
pub use codec::{
    decode_frame, encode_frame, EscapeMode, Frame, FrameConfig, FrameDecoder,
    DEFAULT_MAX_FRAME_SIZE, ESCAPE, TERMINATOR,
};
pub use error::{FrameError, Result};
pub use reader::FrameReader;
pub use writer::FrameWriter;
