use std::io::{ErrorKind, Write};

use bytes::BytesMut;
use tracing::trace;

use crate::codec::{encode_frame, EscapeMode, Frame, FrameConfig};
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 64;

/// Writes complete frames to any `Write` stream.
///
/// Each call encodes the whole frame into a scratch buffer first and then
/// writes it out, so a writer shared behind a lock never interleaves two
/// encodings.
pub struct FrameWriter<T> {
    inner: T,
    buf: BytesMut,
    config: FrameConfig,
}

impl<T: Write> FrameWriter<T> {
    /// Create a new frame writer with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame writer with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
        }
    }

    /// Write a complete frame (blocking).
    pub fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        self.send(frame.payload.as_ref())
    }

    /// Encode and send a payload.
    pub fn send(&mut self, payload: &[u8]) -> Result<()> {
        if payload.len() > self.config.max_frame_size {
            return Err(FrameError::FrameTooLarge {
                size: payload.len(),
                max: self.config.max_frame_size,
            });
        }

        self.buf.clear();
        encode_frame(payload, self.config.escape_mode, &mut self.buf);

        let mut offset = 0usize;
        while offset < self.buf.len() {
            match self.inner.write(&self.buf[offset..]) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
        trace!(payload = payload.len(), wire = self.buf.len(), "wrote frame");

        self.flush()
    }

    /// Flush the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Switch escaping behavior for subsequent frames.
    pub fn set_escape_mode(&mut self, mode: EscapeMode) {
        self.config.escape_mode = mode;
    }

    /// Current frame writer configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use bytes::BytesMut;

    use super::*;
    use crate::codec::{decode_frame, Frame, DEFAULT_MAX_FRAME_SIZE};

    fn written(writer: FrameWriter<Cursor<Vec<u8>>>) -> BytesMut {
        BytesMut::from(writer.into_inner().into_inner().as_slice())
    }

    #[test]
    fn write_single_frame() {
        let mut writer = FrameWriter::new(Cursor::new(Vec::<u8>::new()));

        writer.send(&[200, 10, 20]).unwrap();

        let mut wire = written(writer);
        assert_eq!(wire.as_ref(), [200, 10, 20, 0xFF]);
        let frame = decode_frame(&mut wire, DEFAULT_MAX_FRAME_SIZE)
            .unwrap()
            .unwrap();
        assert_eq!(frame.payload.as_ref(), [200, 10, 20]);
    }

    #[test]
    fn write_escapes_reserved_bytes() {
        let mut writer = FrameWriter::new(Cursor::new(Vec::<u8>::new()));
        writer.send(&[200, 0xFF, 0xFE]).unwrap();

        let wire = written(writer);
        assert_eq!(wire.as_ref(), [200, 0xFE, 0xFF, 0xFE, 0xFE, 0xFF]);
    }

    #[test]
    fn terminator_only_mode() {
        let mut writer = FrameWriter::new(Cursor::new(Vec::<u8>::new()));
        writer.set_escape_mode(EscapeMode::TerminatorOnly);
        writer.send(&[0xFE, 0xFF]).unwrap();

        let wire = written(writer);
        assert_eq!(wire.as_ref(), [0xFE, 0xFE, 0xFF, 0xFF]);
    }

    #[test]
    fn write_multiple_frames() {
        let mut writer = FrameWriter::new(Cursor::new(Vec::<u8>::new()));

        writer.send(&[1]).unwrap();
        writer.send(&[2, 2]).unwrap();
        writer.send(&[]).unwrap();

        let mut wire = written(writer);
        let f1 = decode_frame(&mut wire, DEFAULT_MAX_FRAME_SIZE).unwrap().unwrap();
        let f2 = decode_frame(&mut wire, DEFAULT_MAX_FRAME_SIZE).unwrap().unwrap();
        let f3 = decode_frame(&mut wire, DEFAULT_MAX_FRAME_SIZE).unwrap().unwrap();

        assert_eq!(f1.payload.as_ref(), [1]);
        assert_eq!(f2.payload.as_ref(), [2, 2]);
        assert!(f3.is_empty());
        assert!(wire.is_empty());
    }

    #[test]
    fn frame_too_large_rejected() {
        let cfg = FrameConfig {
            max_frame_size: 4,
            ..FrameConfig::default()
        };
        let mut writer = FrameWriter::with_config(Cursor::new(Vec::<u8>::new()), cfg);

        let err = writer.send(b"oversized").unwrap_err();
        assert!(matches!(err, FrameError::FrameTooLarge { .. }));
    }

    #[test]
    fn flush_propagates() {
        let sink = FlushTrackingWriter::default();
        let flag = Arc::clone(&sink.flushed);
        let mut writer = FrameWriter::new(sink);

        writer.send(&[0]).unwrap();

        assert!(flag.load(Ordering::SeqCst));
    }

    #[test]
    fn write_frame_method() {
        let mut writer = FrameWriter::new(Cursor::new(Vec::<u8>::new()));
        let frame = Frame::new(vec![0, 0x7F, 0xFF]);

        writer.write_frame(&frame).unwrap();

        let mut wire = written(writer);
        let decoded = decode_frame(&mut wire, DEFAULT_MAX_FRAME_SIZE)
            .unwrap()
            .unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn handles_interrupted_write_and_flush() {
        let writer_impl = InterruptedWriteThenFlush {
            wrote_once: false,
            flush_interrupted: false,
            data: Vec::new(),
        };

        let mut writer = FrameWriter::new(writer_impl);
        writer.send(&[5, 5]).unwrap();

        let inner = writer.into_inner();
        assert_eq!(inner.data, vec![5, 5, 0xFF]);
    }

    #[test]
    fn handles_short_writes() {
        let mut writer = FrameWriter::new(OneByteWriter { data: Vec::new() });
        writer.send(&[1, 0xFF, 2]).unwrap();
        assert_eq!(writer.into_inner().data, vec![1, 0xFE, 0xFF, 2, 0xFF]);
    }

    #[test]
    fn connection_closed_when_write_returns_zero() {
        let mut writer = FrameWriter::new(ZeroWriter);
        let err = writer.send(&[1]).unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[derive(Default)]
    struct FlushTrackingWriter {
        flushed: Arc<AtomicBool>,
        data: Vec<u8>,
    }

    impl Write for FlushTrackingWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.data.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            self.flushed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    struct InterruptedWriteThenFlush {
        wrote_once: bool,
        flush_interrupted: bool,
        data: Vec<u8>,
    }

    impl Write for InterruptedWriteThenFlush {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            if !self.wrote_once {
                self.wrote_once = true;
                return Err(std::io::Error::from(ErrorKind::Interrupted));
            }
            self.data.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            if !self.flush_interrupted {
                self.flush_interrupted = true;
                return Err(std::io::Error::from(ErrorKind::Interrupted));
            }
            Ok(())
        }
    }

    struct OneByteWriter {
        data: Vec<u8>,
    }

    impl Write for OneByteWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            match buf.first() {
                Some(&b) => {
                    self.data.push(b);
                    Ok(1)
                }
                None => Ok(0),
            }
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    struct ZeroWriter;

    impl Write for ZeroWriter {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Ok(0)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn written_bytes_decode_through_reader() {
        let mut writer = FrameWriter::new(Cursor::new(Vec::<u8>::new()));

        writer.send(&[3, 0xFE, 0xFE]).unwrap();

        let wire = writer.into_inner().into_inner();
        let mut framed = crate::reader::FrameReader::new(Cursor::new(wire));
        let frame = framed.read_frame().unwrap();
        assert_eq!(frame.payload.as_ref(), [3, 0xFE, 0xFE]);
    }
}
