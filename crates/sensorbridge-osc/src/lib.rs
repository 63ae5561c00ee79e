//! OSC 1.0 messages over UDP.
//!
//! The bridge publishes decoded sensor values as OSC messages and listens
//! for OSC control messages on a second port. Only what that bus needs is
//! implemented: single messages (no bundles) with int32, float32, string and
//! boolean arguments.

pub mod error;
pub mod listener;
pub mod message;
pub mod publisher;

pub use error::{OscError, Result};
pub use listener::{OscListener, DEFAULT_CONTROL_ADDR};
pub use message::{decode_message, encode_message, OscArg, OscMessage};
pub use publisher::{OscPublisher, Publish, DEFAULT_PUBLISH_ADDR};
