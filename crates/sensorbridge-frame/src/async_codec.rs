//! `tokio_util::codec` adapter for the frame format.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use crate::codec::{encode_frame, EscapeMode, Frame, FrameDecoder, DEFAULT_MAX_FRAME_SIZE};
use crate::error::FrameError;

/// Frame codec for `Framed` async streams.
#[derive(Debug)]
pub struct FrameCodec {
    decoder: FrameDecoder,
    escape_mode: EscapeMode,
    max_frame_size: usize,
}

impl FrameCodec {
    /// Create a codec with explicit limits.
    pub fn new(max_frame_size: usize, escape_mode: EscapeMode) -> Self {
        Self {
            decoder: FrameDecoder::new(max_frame_size),
            escape_mode,
            max_frame_size,
        }
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_SIZE, EscapeMode::Both)
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        self.decoder.decode(src)
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(frame) = self.decoder.decode(buf)? {
            return Ok(Some(frame));
        }
        self.decoder.finish()?;
        Ok(None)
    }
}

impl<T: AsRef<[u8]>> Encoder<T> for FrameCodec {
    type Error = FrameError;

    fn encode(&mut self, item: T, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let payload = item.as_ref();
        if payload.len() > self.max_frame_size {
            return Err(FrameError::FrameTooLarge {
                size: payload.len(),
                max: self.max_frame_size,
            });
        }
        encode_frame(payload, self.escape_mode, dst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use futures_util::{SinkExt, StreamExt};
    use tokio_util::codec::{FramedRead, FramedWrite};

    use super::*;

    #[tokio::test]
    async fn framed_roundtrip_over_duplex() {
        let (client, server) = tokio::io::duplex(64);
        let mut sink = FramedWrite::new(client, FrameCodec::default());
        let mut stream = FramedRead::new(server, FrameCodec::default());

        sink.send(vec![27u8, 0x01, 0x2C]).await.unwrap();
        sink.send(vec![99u8, 0xFF, 0xFE]).await.unwrap();
        drop(sink);

        let f1 = stream.next().await.unwrap().unwrap();
        let f2 = stream.next().await.unwrap().unwrap();
        assert_eq!(f1.payload.as_ref(), [27, 0x01, 0x2C]);
        assert_eq!(f2.payload.as_ref(), [99, 0xFF, 0xFE]);
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn eof_after_escape_is_malformed() {
        let (mut client, server) = tokio::io::duplex(64);
        tokio::io::AsyncWriteExt::write_all(&mut client, &[27, 0xFE])
            .await
            .unwrap();
        drop(client);

        let mut stream = FramedRead::new(server, FrameCodec::default());
        let err = stream.next().await.unwrap().unwrap_err();
        assert!(matches!(err, FrameError::DanglingEscape));
    }
}
