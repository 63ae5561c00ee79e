//! Byte transport abstraction for sensorbridge.
//!
//! Provides a unified read/write/available interface over the two ways a
//! microcontroller can be reached:
//! - a serial line (USB-UART adapter, configured raw 8N1 via termios)
//! - a TCP socket (firmware running the network bus)
//!
//! This is the lowest layer of sensorbridge. Everything else builds on top of
//! the [`Channel`] type provided here.

pub mod config;
pub mod error;
#[cfg(unix)]
pub mod ports;
#[cfg(unix)]
pub mod serial;
#[cfg(unix)]
mod sys;
pub mod tcp;
pub mod traits;

pub use config::{SerialConfig, TransportConfig, DEFAULT_BAUD};
pub use error::{Result, TransportError};
#[cfg(unix)]
pub use ports::{list_serial_ports, PortInfo};
#[cfg(unix)]
pub use serial::SerialLine;
pub use traits::{Channel, Transport};
