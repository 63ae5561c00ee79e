use std::io::{ErrorKind, Read};
use std::time::Instant;

use bytes::BytesMut;
use sensorbridge_transport::Transport;
use tracing::{debug, trace};

use crate::codec::{Frame, FrameConfig, FrameDecoder};
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 1024;
const READ_CHUNK_SIZE: usize = 256;

/// Reads complete frames from any `Read` stream.
///
/// Reads are buffered; the decoder scans the buffer with its own cursor, so
/// callers always get complete frames and the next call starts exactly at
/// the byte after the previous terminator.
pub struct FrameReader<T> {
    inner: T,
    buf: BytesMut,
    decoder: FrameDecoder,
    config: FrameConfig,
    last_activity: Instant,
}

impl<T: Read> FrameReader<T> {
    /// Create a new frame reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame reader with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            decoder: FrameDecoder::new(config.max_frame_size),
            config,
            last_activity: Instant::now(),
        }
    }

    /// Read the next complete frame (blocking).
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` when EOF is reached, or
    /// `Err(FrameError::DanglingEscape)` if EOF cut an escape sequence short.
    /// With an idle timeout configured, returns `Err(FrameError::Stalled)`
    /// once the stream has been silent for that long.
    pub fn read_frame(&mut self) -> Result<Frame> {
        loop {
            if let Some(frame) = self.decoder.decode(&mut self.buf)? {
                return Ok(frame);
            }

            match self.fill() {
                Ok(0) => return Err(self.end_of_stream()),
                Ok(_) => continue,
                Err(FrameError::Io(err)) if is_idle(&err) && self.config.idle_timeout.is_some() => {
                    self.check_stalled()?;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Read the next frame if one can be assembled without waiting.
    ///
    /// Returns `Ok(None)` when the stream currently has no data; call again
    /// later. Partial frames are kept between calls.
    pub fn try_read_frame(&mut self) -> Result<Option<Frame>> {
        if let Some(frame) = self.decoder.decode(&mut self.buf)? {
            return Ok(Some(frame));
        }

        match self.fill() {
            Ok(0) => Err(self.end_of_stream()),
            Ok(_) => self.decoder.decode(&mut self.buf),
            Err(FrameError::Io(err)) if is_idle(&err) => {
                if self.config.idle_timeout.is_some() {
                    self.check_stalled()?;
                }
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    /// Drop buffered bytes and the partial frame in progress.
    ///
    /// Returns how many bytes were thrown away.
    pub fn discard_buffered(&mut self) -> usize {
        let dropped = self.buf.len() + self.decoder.pending();
        self.buf.clear();
        self.decoder.reset();
        if dropped > 0 {
            debug!(dropped, "discarded buffered frame data");
        }
        dropped
    }

    /// Bytes read from the stream but not yet scanned.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Update maximum frame size for subsequent frame decoding.
    pub fn set_max_frame_size(&mut self, max_frame_size: usize) {
        self.config.max_frame_size = max_frame_size;
        self.decoder.set_max_frame_size(max_frame_size);
    }

    /// Current frame reader configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }

    fn fill(&mut self) -> Result<usize> {
        let mut chunk = [0u8; READ_CHUNK_SIZE];
        loop {
            match self.inner.read(&mut chunk) {
                Ok(n) => {
                    if n > 0 {
                        self.buf.extend_from_slice(&chunk[..n]);
                        self.last_activity = Instant::now();
                        trace!(bytes = n, "read chunk");
                    }
                    return Ok(n);
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    fn end_of_stream(&mut self) -> FrameError {
        match self.decoder.finish() {
            Err(err) => err,
            Ok(()) => FrameError::ConnectionClosed,
        }
    }

    // Reported once per idle period; the clock restarts so a caller that
    // keeps reading gets the next report one period later.
    fn check_stalled(&mut self) -> Result<()> {
        if let Some(idle) = self.config.idle_timeout {
            if self.last_activity.elapsed() >= idle {
                self.last_activity = Instant::now();
                return Err(FrameError::Stalled(idle));
            }
        }
        Ok(())
    }
}

impl<T: Read + Transport> FrameReader<T> {
    /// Create a frame reader for a transport and apply the read timeout.
    ///
    /// With only an idle timeout configured, reads wake up at that interval
    /// so a stall can be detected.
    pub fn with_transport(inner: T, config: FrameConfig) -> Result<Self> {
        inner
            .set_read_timeout(config.read_timeout.or(config.idle_timeout))
            .map_err(transport_to_frame_error)?;
        Ok(Self::with_config(inner, config))
    }

    /// Drop everything buffered here and everything the transport has queued.
    pub fn discard_backlog(&mut self) -> Result<usize> {
        let mut dropped = self.discard_buffered();
        let mut pending = self.inner.available().map_err(transport_to_frame_error)?;
        let mut chunk = [0u8; READ_CHUNK_SIZE];
        while pending > 0 {
            let want = pending.min(READ_CHUNK_SIZE);
            match self.inner.read(&mut chunk[..want]) {
                Ok(0) => break,
                Ok(n) => {
                    dropped += n;
                    pending -= n;
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if is_idle(&err) => break,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
        Ok(dropped)
    }
}

fn is_idle(err: &std::io::Error) -> bool {
    matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut)
}

pub(crate) fn transport_to_frame_error(err: sensorbridge_transport::TransportError) -> FrameError {
    match err {
        sensorbridge_transport::TransportError::Io(io) => FrameError::Io(io),
        sensorbridge_transport::TransportError::Open { source, .. }
        | sensorbridge_transport::TransportError::Configure { source, .. }
        | sensorbridge_transport::TransportError::Connect { source, .. } => FrameError::Io(source),
        other => FrameError::Io(std::io::Error::other(other.to_string())),
    }
}
