use std::ops::Deref;
use std::time::Duration;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Reserved byte that ends a frame.
pub const TERMINATOR: u8 = 0xFF;

/// Reserved byte marking the next byte as literal payload.
pub const ESCAPE: u8 = 0xFE;

/// Default maximum resolved frame size. Sensor frames are 3 bytes.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 4096;

/// A resolved frame: escapes removed, terminator stripped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// The frame payload.
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame.
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self {
            payload: payload.into(),
        }
    }

    /// Number of resolved payload bytes.
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// True if the frame carried no payload.
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// The number of bytes this frame occupies on the wire.
    pub fn wire_size(&self, mode: EscapeMode) -> usize {
        let escapes = self.payload.iter().filter(|&&b| mode.needs_escape(b)).count();
        self.payload.len() + escapes + 1
    }
}

impl AsRef<[u8]> for Frame {
    fn as_ref(&self) -> &[u8] {
        self.payload.as_ref()
    }
}

impl Deref for Frame {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.payload
    }
}

/// Which payload bytes the encoder escapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EscapeMode {
    /// Escape both reserved values. Always round-trips.
    #[default]
    Both,
    /// Escape only the terminator, matching older host scripts. A literal
    /// `0xFE` payload byte will swallow the byte after it when decoded.
    TerminatorOnly,
}

impl EscapeMode {
    /// True if `byte` must be preceded by [`ESCAPE`] on the wire.
    pub fn needs_escape(self, byte: u8) -> bool {
        match self {
            EscapeMode::Both => byte == TERMINATOR || byte == ESCAPE,
            EscapeMode::TerminatorOnly => byte == TERMINATOR,
        }
    }
}

/// Encode a payload into the wire format.
///
/// Wire format:
/// ```text
/// ┌──────────────────────────────────────┬────────────┐
/// │ Payload, reserved bytes as FE xx     │ Terminator │
/// │ (FF -> FE FF, FE -> FE FE)           │ FF         │
/// └──────────────────────────────────────┴────────────┘
/// ```
pub fn encode_frame(payload: &[u8], mode: EscapeMode, dst: &mut BytesMut) {
    let escapes = payload.iter().filter(|&&b| mode.needs_escape(b)).count();
    dst.reserve(payload.len() + escapes + 1);
    for &byte in payload {
        if mode.needs_escape(byte) {
            dst.put_u8(ESCAPE);
        }
        dst.put_u8(byte);
    }
    dst.put_u8(TERMINATOR);
}

/// Decode one frame from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet, in
/// which case nothing is consumed. On success, consumes the frame bytes
/// including the terminator, and nothing after it.
pub fn decode_frame(src: &mut BytesMut, max_frame_size: usize) -> Result<Option<Frame>> {
    let Some(end) = find_terminator(src) else {
        return Ok(None); // Need more data
    };
    let mut wire = src.split_to(end + 1);
    FrameDecoder::new(max_frame_size).decode(&mut wire)
}

/// Index of the first unescaped terminator in `buf`.
fn find_terminator(buf: &[u8]) -> Option<usize> {
    let mut escaped = false;
    for (i, &byte) in buf.iter().enumerate() {
        if escaped {
            escaped = false;
        } else if byte == ESCAPE {
            escaped = true;
        } else if byte == TERMINATOR {
            return Some(i);
        }
    }
    None
}

/// Incremental frame decoder.
///
/// Owns the in-flight accumulation buffer for the frame currently being read.
/// Bytes are consumed from the caller's buffer as they are scanned, so a
/// partial frame survives across calls; the accumulation buffer is reset at
/// every terminator.
#[derive(Debug)]
pub struct FrameDecoder {
    acc: BytesMut,
    escaped: bool,
    discarding: bool,
    max_frame_size: usize,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_SIZE)
    }
}

impl FrameDecoder {
    /// Create a decoder that rejects frames longer than `max_frame_size`.
    pub fn new(max_frame_size: usize) -> Self {
        Self {
            acc: BytesMut::with_capacity(64),
            escaped: false,
            discarding: false,
            max_frame_size,
        }
    }

    /// Consume bytes from `src` up to and including the next terminator.
    ///
    /// Returns `Ok(None)` once `src` is exhausted without a terminator; the
    /// scanned bytes are kept and the next call continues where this one
    /// stopped. An oversized frame is reported once, then skipped through
    /// its terminator.
    pub fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>> {
        let mut pos = 0;
        let outcome = loop {
            let Some(&byte) = src.get(pos) else {
                break Ok(None);
            };
            pos += 1;

            if self.escaped {
                self.escaped = false;
                if let Err(err) = self.push(byte) {
                    break Err(err);
                }
                continue;
            }

            match byte {
                TERMINATOR if self.discarding => {
                    self.discarding = false;
                    self.acc.clear();
                }
                TERMINATOR => {
                    let payload = self.acc.split().freeze();
                    break Ok(Some(Frame { payload }));
                }
                ESCAPE => self.escaped = true,
                _ => {
                    if let Err(err) = self.push(byte) {
                        break Err(err);
                    }
                }
            }
        };
        src.advance(pos);
        outcome
    }

    /// Signal end of stream.
    ///
    /// A pending escape with nothing after it is a malformed frame. Any other
    /// partial frame is simply dropped. The decoder is reset either way.
    pub fn finish(&mut self) -> Result<()> {
        let dangling = self.escaped;
        self.reset();
        if dangling {
            return Err(FrameError::DanglingEscape);
        }
        Ok(())
    }

    /// Drop the partial frame and any escape state.
    pub fn reset(&mut self) {
        self.acc.clear();
        self.escaped = false;
        self.discarding = false;
    }

    /// Bytes accumulated for the frame in progress.
    pub fn pending(&self) -> usize {
        self.acc.len()
    }

    /// True if the last byte scanned was an unresolved escape.
    pub fn is_mid_escape(&self) -> bool {
        self.escaped
    }

    /// Update maximum frame size for subsequent frames.
    pub fn set_max_frame_size(&mut self, max_frame_size: usize) {
        self.max_frame_size = max_frame_size;
    }

    fn push(&mut self, byte: u8) -> Result<()> {
        if self.discarding {
            return Ok(());
        }
        if self.acc.len() >= self.max_frame_size {
            let size = self.acc.len() + 1;
            self.acc.clear();
            self.discarding = true;
            return Err(FrameError::FrameTooLarge {
                size,
                max: self.max_frame_size,
            });
        }
        self.acc.put_u8(byte);
        Ok(())
    }
}

/// Configuration for the frame codec.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum resolved frame size in bytes. Default: 4096.
    pub max_frame_size: usize,
    /// Which bytes the writer escapes. Default: both reserved values.
    pub escape_mode: EscapeMode,
    /// Read timeout applied to the transport for blocking reads.
    pub read_timeout: Option<Duration>,
    /// Surface `FrameError::Stalled` when no bytes arrive for this long.
    pub idle_timeout: Option<Duration>,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            escape_mode: EscapeMode::Both,
            read_timeout: None,
            idle_timeout: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(payload: &[u8], mode: EscapeMode) -> BytesMut {
        let mut buf = BytesMut::new();
        encode_frame(payload, mode, &mut buf);
        buf
    }

    #[test]
    fn test_encode_decode_roundtrip_with_reserved_bytes() {
        let payload = [0x01, TERMINATOR, 0x02, ESCAPE, ESCAPE, TERMINATOR, 0x00];
        let mut buf = encode(&payload, EscapeMode::Both);

        let frame = decode_frame(&mut buf, DEFAULT_MAX_FRAME_SIZE)
            .unwrap()
            .unwrap();

        assert_eq!(frame.payload.as_ref(), payload);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_encode_escapes_terminator() {
        let buf = encode(&[0xFF], EscapeMode::Both);
        assert_eq!(buf.as_ref(), [0xFE, 0xFF, 0xFF]);
    }

    #[test]
    fn test_encode_escapes_escape_byte() {
        let buf = encode(&[0xFE], EscapeMode::Both);
        assert_eq!(buf.as_ref(), [0xFE, 0xFE, 0xFF]);
    }

    #[test]
    fn test_terminator_only_mode_leaves_escape_bare() {
        let buf = encode(&[0xFE, 0xFF], EscapeMode::TerminatorOnly);
        assert_eq!(buf.as_ref(), [0xFE, 0xFE, 0xFF, 0xFF]);
    }

    #[test]
    fn test_empty_payload_is_just_terminator() {
        let mut buf = encode(&[], EscapeMode::Both);
        assert_eq!(buf.as_ref(), [TERMINATOR]);

        let frame = decode_frame(&mut buf, DEFAULT_MAX_FRAME_SIZE)
            .unwrap()
            .unwrap();
        assert!(frame.is_empty());
    }

    #[test]
    fn test_decode_escaped_terminator() {
        let mut buf = BytesMut::from(&[0xFE, 0xFF, 0xFF][..]);
        let frame = decode_frame(&mut buf, DEFAULT_MAX_FRAME_SIZE)
            .unwrap()
            .unwrap();
        assert_eq!(frame.payload.as_ref(), [0xFF]);
    }

    #[test]
    fn test_escaped_ordinary_byte_is_literal() {
        let mut buf = BytesMut::from(&[0x10, 0xFE, 0x41, 0xFF][..]);
        let frame = decode_frame(&mut buf, DEFAULT_MAX_FRAME_SIZE)
            .unwrap()
            .unwrap();
        assert_eq!(frame.payload.as_ref(), [0x10, 0x41]);
    }

    #[test]
    fn test_decode_incomplete_frame_consumes_nothing() {
        let mut buf = BytesMut::from(&[27, 0x01, 0x2C][..]);
        let result = decode_frame(&mut buf, DEFAULT_MAX_FRAME_SIZE).unwrap();
        assert!(result.is_none());
        assert_eq!(buf.len(), 3);
    }

    #[test]
    fn test_trailing_escape_is_incomplete() {
        let mut buf = BytesMut::from(&[27, 0xFE, 0xFF][..]);
        assert!(decode_frame(&mut buf, DEFAULT_MAX_FRAME_SIZE)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_decode_stops_at_terminator() {
        let mut buf = BytesMut::from(&[1, 2, 3, 0xFF, 4, 5][..]);
        let frame = decode_frame(&mut buf, DEFAULT_MAX_FRAME_SIZE)
            .unwrap()
            .unwrap();
        assert_eq!(frame.payload.as_ref(), [1, 2, 3]);
        assert_eq!(buf.as_ref(), [4, 5]);
    }

    #[test]
    fn test_multiple_frames() {
        let mut buf = BytesMut::new();
        encode_frame(&[27, 0x01, 0x2C], EscapeMode::Both, &mut buf);
        encode_frame(&[33, 0xFF, 0xFE], EscapeMode::Both, &mut buf);

        let f1 = decode_frame(&mut buf, DEFAULT_MAX_FRAME_SIZE)
            .unwrap()
            .unwrap();
        assert_eq!(f1.payload.as_ref(), [27, 0x01, 0x2C]);

        let f2 = decode_frame(&mut buf, DEFAULT_MAX_FRAME_SIZE)
            .unwrap()
            .unwrap();
        assert_eq!(f2.payload.as_ref(), [33, 0xFF, 0xFE]);

        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_frame_too_large() {
        let mut buf = encode(&[0x11; 16], EscapeMode::Both);
        buf.extend_from_slice(&[1, 2, 3, 0xFF]);

        let result = decode_frame(&mut buf, 8);
        assert!(matches!(result, Err(FrameError::FrameTooLarge { max: 8, .. })));

        // The oversized frame is gone; the next one decodes cleanly.
        let next = decode_frame(&mut buf, 8).unwrap().unwrap();
        assert_eq!(next.payload.as_ref(), [1, 2, 3]);
    }

    #[test]
    fn test_incremental_decoder_across_chunks() {
        let mut decoder = FrameDecoder::default();

        let mut chunk = BytesMut::from(&[27, 0x01][..]);
        assert!(decoder.decode(&mut chunk).unwrap().is_none());
        assert!(chunk.is_empty());
        assert_eq!(decoder.pending(), 2);

        let mut chunk = BytesMut::from(&[0xFE][..]);
        assert!(decoder.decode(&mut chunk).unwrap().is_none());
        assert!(decoder.is_mid_escape());

        let mut chunk = BytesMut::from(&[0xFF, 0xFF, 9][..]);
        let frame = decoder.decode(&mut chunk).unwrap().unwrap();
        assert_eq!(frame.payload.as_ref(), [27, 0x01, 0xFF]);
        assert_eq!(chunk.as_ref(), [9]);
        assert_eq!(decoder.pending(), 0);
    }

    #[test]
    fn test_decoder_resyncs_after_oversized_frame() {
        let mut decoder = FrameDecoder::new(4);
        let mut buf = BytesMut::from(&[1, 2, 3, 4, 5, 6, 0xFE, 0xFF, 7, 0xFF, 8, 9, 10, 0xFF][..]);

        let err = decoder.decode(&mut buf).unwrap_err();
        assert!(matches!(err, FrameError::FrameTooLarge { size: 5, max: 4 }));

        let frame = decoder.decode(&mut buf).unwrap().unwrap();
        assert_eq!(frame.payload.as_ref(), [8, 9, 10]);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_finish_reports_dangling_escape() {
        let mut decoder = FrameDecoder::default();
        let mut buf = BytesMut::from(&[27, 0xFE][..]);
        assert!(decoder.decode(&mut buf).unwrap().is_none());

        assert!(matches!(decoder.finish(), Err(FrameError::DanglingEscape)));
        assert_eq!(decoder.pending(), 0);
        assert!(!decoder.is_mid_escape());
    }

    #[test]
    fn test_finish_with_partial_frame_is_clean() {
        let mut decoder = FrameDecoder::default();
        let mut buf = BytesMut::from(&[27, 1][..]);
        assert!(decoder.decode(&mut buf).unwrap().is_none());
        assert!(decoder.finish().is_ok());
        assert_eq!(decoder.pending(), 0);
    }

    #[test]
    fn test_frame_derefs_to_payload_slice() {
        fn first(bytes: &[u8]) -> Option<u8> {
            bytes.first().copied()
        }

        let frame = Frame::new(vec![14u8, 0x01, 0x2C]);
        assert_eq!(first(&frame), Some(14));
        assert_eq!(&frame[1..], [0x01, 0x2C]);
    }

    #[test]
    fn test_roundtrip_at_every_split_point() {
        // Payloads dense in reserved bytes, sized exactly at the frame limit.
        let payloads: Vec<Vec<u8>> = (0u8..=40)
            .map(|seed| {
                (0..(seed as usize % 9) + 1)
                    .map(|i| match (seed as usize + i * 7) % 4 {
                        0 => TERMINATOR,
                        1 => ESCAPE,
                        2 => seed,
                        _ => i as u8,
                    })
                    .collect()
            })
            .collect();

        for payload in payloads {
            let wire = encode(&payload, EscapeMode::Both);
            for split in 0..=wire.len() {
                let mut decoder = FrameDecoder::new(payload.len());
                let mut head = BytesMut::from(&wire[..split]);
                let mut tail = BytesMut::from(&wire[split..]);

                let frame = match decoder.decode(&mut head).unwrap() {
                    Some(frame) => frame,
                    None => decoder.decode(&mut tail).unwrap().unwrap(),
                };
                assert_eq!(frame.as_ref(), payload.as_slice(), "split at {split}");
                assert!(head.is_empty() && tail.is_empty());
            }
        }
    }

    #[test]
    fn test_frame_wire_size() {
        let frame = Frame::new(Bytes::from_static(&[1, 0xFF, 0xFE]));
        assert_eq!(frame.wire_size(EscapeMode::Both), 6);
        assert_eq!(frame.wire_size(EscapeMode::TerminatorOnly), 5);
    }
}
