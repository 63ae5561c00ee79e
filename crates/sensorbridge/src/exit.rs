use std::fmt;
use std::io;

use sensorbridge_bridge::BridgeError;
use sensorbridge_frame::FrameError;
use sensorbridge_osc::OscError;
use sensorbridge_transport::TransportError;

// Exit code constants aligned with rsfulmen/DDR-0002 semantics.
pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn usage(message: impl Into<String>) -> Self {
        Self::new(USAGE, message)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::ConnectionRefused
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::BrokenPipe
        | io::ErrorKind::NotFound
        | io::ErrorKind::AddrInUse
        | io::ErrorKind::AddrNotAvailable => TRANSPORT_ERROR,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Open { ref source, .. } | TransportError::Connect { ref source, .. }
            if source.kind() == io::ErrorKind::PermissionDenied =>
        {
            CliError::new(PERMISSION_DENIED, format!("{context}: {err}"))
        }
        TransportError::Io(source) => io_error(context, source),
        TransportError::UnsupportedBaud(_) | TransportError::Unsupported(_) => {
            CliError::new(USAGE, format!("{context}: {err}"))
        }
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::Io(source) => io_error(context, source),
        FrameError::FrameTooLarge { .. } | FrameError::DanglingEscape => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        FrameError::Stalled(_) => CliError::new(TIMEOUT, format!("{context}: {err}")),
        FrameError::ConnectionClosed => CliError::new(FAILURE, format!("{context}: {err}")),
    }
}

pub fn osc_error(context: &str, err: OscError) -> CliError {
    match err {
        OscError::Bind { ref source, .. } if source.kind() == io::ErrorKind::PermissionDenied => {
            CliError::new(PERMISSION_DENIED, format!("{context}: {err}"))
        }
        OscError::Bind { .. } => CliError::new(TRANSPORT_ERROR, format!("{context}: {err}")),
        OscError::Io(source) => io_error(context, source),
        other => CliError::new(DATA_INVALID, format!("{context}: {other}")),
    }
}

pub fn bridge_error(context: &str, err: BridgeError) -> CliError {
    match err {
        BridgeError::Transport(err) => transport_error(context, err),
        BridgeError::Frame(err) => frame_error(context, err),
        BridgeError::Osc(err) => osc_error(context, err),
        BridgeError::Command(err) => CliError::new(USAGE, format!("{context}: {err}")),
        BridgeError::Config(_) | BridgeError::Json(_) => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        BridgeError::ReadConfig { source, path } => {
            io_error(&format!("{context}: {}", path.display()), source)
        }
    }
}
