use std::path::PathBuf;

use crate::error::Result;
use crate::traits::Channel;

/// Baud rate used by the sensor firmware.
pub const DEFAULT_BAUD: u32 = 115_200;

/// Serial line settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialConfig {
    /// Line speed in bits per second.
    pub baud: u32,
    /// Discard whatever the device buffered before we opened it.
    pub flush_on_open: bool,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            baud: DEFAULT_BAUD,
            flush_on_open: true,
        }
    }
}

/// Which transport to open, and where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportConfig {
    /// A tty device such as `/dev/ttyUSB0` or `/dev/cu.SLAB_USBtoUART`.
    Serial { path: PathBuf, config: SerialConfig },
    /// A `host:port` TCP endpoint.
    Tcp { addr: String },
}

impl TransportConfig {
    /// Open the configured transport.
    pub fn open(&self) -> Result<Channel> {
        match self {
            #[cfg(unix)]
            TransportConfig::Serial { path, config } => {
                crate::serial::SerialLine::open(path, config).map(Channel::from_serial)
            }
            #[cfg(not(unix))]
            TransportConfig::Serial { .. } => {
                Err(crate::error::TransportError::Unsupported("serial transport"))
            }
            TransportConfig::Tcp { addr } => crate::tcp::connect(addr),
        }
    }

    /// Human-readable endpoint for logs.
    pub fn endpoint(&self) -> String {
        match self {
            TransportConfig::Serial { path, config } => {
                format!("{} @ {} baud", path.display(), config.baud)
            }
            TransportConfig::Tcp { addr } => addr.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serial_defaults_match_firmware() {
        let config = SerialConfig::default();
        assert_eq!(config.baud, 115_200);
        assert!(config.flush_on_open);
    }

    #[test]
    fn endpoint_descriptions() {
        let serial = TransportConfig::Serial {
            path: PathBuf::from("/dev/ttyUSB0"),
            config: SerialConfig::default(),
        };
        assert_eq!(serial.endpoint(), "/dev/ttyUSB0 @ 115200 baud");

        let tcp = TransportConfig::Tcp {
            addr: "192.168.4.1:1234".to_string(),
        };
        assert_eq!(tcp.endpoint(), "192.168.4.1:1234");
    }
}
