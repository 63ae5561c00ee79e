use std::path::PathBuf;

/// Errors that can occur while running the bridge.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] sensorbridge_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] sensorbridge_frame::FrameError),

    /// OSC bus error.
    #[error("osc error: {0}")]
    Osc(#[from] sensorbridge_osc::OscError),

    /// Control message could not be turned into a command.
    #[error("command error: {0}")]
    Command(#[from] crate::command::CommandError),

    /// The address map is unusable.
    #[error("invalid address map: {0}")]
    Config(String),

    /// The address map file couldn't be read.
    #[error("failed to read {path}: {source}")]
    ReadConfig {
        path: PathBuf,
        source: std::io::Error,
    },

    /// JSON serialization/deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, BridgeError>;
