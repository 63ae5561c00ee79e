/// Errors that can occur while encoding, decoding, or moving OSC packets.
#[derive(Debug, thiserror::Error)]
pub enum OscError {
    /// The packet ended before a field was complete.
    #[error("truncated OSC packet (needed {needed} more bytes)")]
    Truncated { needed: usize },

    /// The address pattern doesn't start with `/`.
    #[error("invalid OSC address: {0:?}")]
    InvalidAddress(String),

    /// A string field isn't NUL terminated or isn't UTF-8.
    #[error("invalid OSC string")]
    InvalidString,

    /// The type tag string names a type this bus doesn't carry.
    #[error("unsupported OSC type tag '{0}'")]
    UnsupportedTag(char),

    /// OSC bundles aren't used on this bus.
    #[error("OSC bundles are not supported")]
    UnsupportedBundle,

    /// Failed to bind or connect the UDP socket.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    /// An I/O error occurred on the socket.
    #[error("OSC I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, OscError>;
