//! Bridge a microcontroller's sensor stream to OSC, and OSC control
//! messages back to the microcontroller.
//!
//! The device speaks a byte-stuffed, terminator-delimited framing over a
//! serial line or TCP socket. Each frame carries an address byte and a 16-bit
//! big-endian value; the bridge looks the address up, optionally runs opto
//! readings through smoothing and a Schmitt trigger, and publishes the result
//! as OSC over UDP.
//!
//! # Crate Structure
//!
//! - [`transport`]: serial line and TCP byte channels
//! - [`frame`]: the frame codec, buffered reader, and serialized writer
//! - [`osc`]: OSC message codec, UDP publisher, and control listener
//! - [`bridge`]: address table, opto mapping, commands, and the bridge loop
//!   (behind the `bridge` feature)

/// Re-export transport types.
pub mod transport {
    pub use sensorbridge_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use sensorbridge_frame::*;
}

/// Re-export OSC types.
pub mod osc {
    pub use sensorbridge_osc::*;
}

/// Re-export bridge types (requires `bridge` feature).
#[cfg(feature = "bridge")]
pub mod bridge {
    pub use sensorbridge_bridge::*;
}
