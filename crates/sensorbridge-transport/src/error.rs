use std::path::PathBuf;

/// Errors that can occur in transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to open the serial device.
    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to apply line settings to the serial device.
    #[error("failed to configure {path}: {source}")]
    Configure {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The requested baud rate has no termios equivalent on this platform.
    #[error("unsupported baud rate: {0}")]
    UnsupportedBaud(u32),

    /// Failed to connect to the network endpoint.
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        source: std::io::Error,
    },

    /// An I/O error occurred on the transport stream.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The operation is not available for this transport on this platform.
    #[error("{0} is not supported on this platform")]
    Unsupported(&'static str),
}

pub type Result<T> = std::result::Result<T, TransportError>;
