use std::time::Duration;

/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The stream ended right after an escape byte, so the frame can't be resolved.
    #[error("malformed frame: stream ended after escape byte")]
    DanglingEscape,

    /// The frame grew past the configured maximum before a terminator arrived.
    #[error("frame too large ({size} bytes, max {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// No bytes arrived within the configured idle timeout.
    #[error("transport stalled (no data for {0:?})")]
    Stalled(Duration),

    /// The connection was closed.
    #[error("connection closed")]
    ConnectionClosed,
}

impl FrameError {
    /// True for errors after which the reader can keep going.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, FrameError::FrameTooLarge { .. })
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
