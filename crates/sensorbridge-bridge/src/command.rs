//! Commands sent back to the microcontroller, and the control-address table
//! that turns incoming OSC control messages into them.

use std::collections::HashMap;
use std::io::Write;
use std::sync::{Arc, Mutex, MutexGuard};

use sensorbridge_frame::{FrameError, FrameWriter};
use sensorbridge_osc::{OscArg, OscMessage};
use tracing::debug;

/// Opcode for setting the opto sampling on/off interval.
pub const OPCODE_OPTO_INTERVAL: u8 = 200;
/// Opcode for changing the device's reporting rate.
pub const OPCODE_SERIAL_RATE: u8 = 0;
/// Largest rate `SerialRate` can carry (15 bits).
pub const MAX_SERIAL_RATE: u16 = 0x7FFF;

pub const CONTROL_OPTO_INTERVAL: &str = "/optoInterval";
pub const CONTROL_SERIAL_RATE: &str = "/serialRate";
pub const CONTROL_RAW: &str = "/raw";

/// A command for the microcontroller: opcode byte plus parameter bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundCommand {
    /// Opto sensor on/off interval.
    OptoInterval { on: u8, off: u8 },
    /// Reporting rate; the high bit of the rate is dropped.
    SerialRate { rate: u16 },
    /// Periodic liveness byte.
    Heartbeat { sequence: u8 },
    /// Arbitrary opcode and parameters.
    Raw { opcode: u8, params: Vec<u8> },
}

impl OutboundCommand {
    /// Bytes to frame and send.
    pub fn payload(&self) -> Vec<u8> {
        match self {
            OutboundCommand::OptoInterval { on, off } => vec![OPCODE_OPTO_INTERVAL, *on, *off],
            OutboundCommand::SerialRate { rate } => vec![
                OPCODE_SERIAL_RATE,
                ((rate >> 8) & 0x7F) as u8,
                (rate & 0xFF) as u8,
            ],
            OutboundCommand::Heartbeat { sequence } => vec![*sequence],
            OutboundCommand::Raw { opcode, params } => {
                let mut out = Vec::with_capacity(1 + params.len());
                out.push(*opcode);
                out.extend_from_slice(params);
                out
            }
        }
    }

    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            OutboundCommand::OptoInterval { .. } => "opto_interval",
            OutboundCommand::SerialRate { .. } => "serial_rate",
            OutboundCommand::Heartbeat { .. } => "heartbeat",
            OutboundCommand::Raw { .. } => "raw",
        }
    }
}

/// Why a control message couldn't become a command.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CommandError {
    /// No handler is registered for the address.
    #[error("unknown control address {0}")]
    UnknownAddress(String),

    /// Wrong number of arguments.
    #[error("{address} expects {expected} argument(s), got {got}")]
    ArgumentCount {
        address: String,
        expected: &'static str,
        got: usize,
    },

    /// Argument isn't a number.
    #[error("{address} argument {index} is not a number")]
    NotNumeric { address: String, index: usize },

    /// Argument doesn't fit the field.
    #[error("{address} argument {index} = {value} out of range 0..={max}")]
    OutOfRange {
        address: String,
        index: usize,
        value: i64,
        max: i64,
    },
}

/// Kinds of control message the bridge understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlKind {
    /// Two byte arguments: on, off.
    OptoInterval,
    /// One argument: rate, 0..=32767.
    SerialRate,
    /// Opcode followed by any number of byte parameters.
    Raw,
}

impl ControlKind {
    /// Build the command for `msg`, validating its arguments.
    pub fn parse(self, msg: &OscMessage) -> Result<OutboundCommand, CommandError> {
        let args = Args {
            address: &msg.address,
            args: &msg.args,
        };
        match self {
            ControlKind::OptoInterval => {
                args.expect_count(2, "2")?;
                Ok(OutboundCommand::OptoInterval {
                    on: args.byte(0)?,
                    off: args.byte(1)?,
                })
            }
            ControlKind::SerialRate => {
                args.expect_count(1, "1")?;
                let rate = args.int(0, i64::from(MAX_SERIAL_RATE))?;
                Ok(OutboundCommand::SerialRate { rate: rate as u16 })
            }
            ControlKind::Raw => {
                if args.args.is_empty() {
                    return Err(args.count_error("at least 1"));
                }
                let opcode = args.byte(0)?;
                let params = (1..args.args.len())
                    .map(|i| args.byte(i))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(OutboundCommand::Raw { opcode, params })
            }
        }
    }
}

struct Args<'a> {
    address: &'a str,
    args: &'a [OscArg],
}

impl Args<'_> {
    fn expect_count(&self, n: usize, expected: &'static str) -> Result<(), CommandError> {
        if self.args.len() != n {
            return Err(self.count_error(expected));
        }
        Ok(())
    }

    fn count_error(&self, expected: &'static str) -> CommandError {
        CommandError::ArgumentCount {
            address: self.address.to_string(),
            expected,
            got: self.args.len(),
        }
    }

    fn int(&self, index: usize, max: i64) -> Result<i64, CommandError> {
        let value = self.args[index]
            .as_i64()
            .ok_or_else(|| CommandError::NotNumeric {
                address: self.address.to_string(),
                index,
            })?;
        if !(0..=max).contains(&value) {
            return Err(CommandError::OutOfRange {
                address: self.address.to_string(),
                index,
                value,
                max,
            });
        }
        Ok(value)
    }

    fn byte(&self, index: usize) -> Result<u8, CommandError> {
        self.int(index, i64::from(u8::MAX)).map(|v| v as u8)
    }
}

/// Control address to handler lookup, built once at startup.
#[derive(Debug, Clone)]
pub struct ControlTable {
    handlers: HashMap<String, ControlKind>,
}

impl Default for ControlTable {
    fn default() -> Self {
        let mut table = Self {
            handlers: HashMap::new(),
        };
        table.register(CONTROL_OPTO_INTERVAL, ControlKind::OptoInterval);
        table.register(CONTROL_SERIAL_RATE, ControlKind::SerialRate);
        table.register(CONTROL_RAW, ControlKind::Raw);
        table
    }
}

impl ControlTable {
    /// Route `address` to `kind`, replacing any previous handler.
    pub fn register(&mut self, address: impl Into<String>, kind: ControlKind) {
        self.handlers.insert(address.into(), kind);
    }

    pub fn get(&self, address: &str) -> Option<ControlKind> {
        self.handlers.get(address).copied()
    }

    /// Turn a control message into a command.
    pub fn resolve(&self, msg: &OscMessage) -> Result<OutboundCommand, CommandError> {
        let kind = self
            .get(&msg.address)
            .ok_or_else(|| CommandError::UnknownAddress(msg.address.clone()))?;
        kind.parse(msg)
    }

    /// Registered addresses, sorted.
    pub fn addresses(&self) -> Vec<&str> {
        let mut out: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        out.sort_unstable();
        out
    }
}

/// Cloneable handle for sending commands through one shared frame writer.
///
/// Every send holds the writer lock for the whole frame, so concurrent
/// senders never interleave bytes on the wire.
pub struct CommandSender<W> {
    writer: Arc<Mutex<FrameWriter<W>>>,
}

impl<W> Clone for CommandSender<W> {
    fn clone(&self) -> Self {
        Self {
            writer: Arc::clone(&self.writer),
        }
    }
}

impl<W: Write> CommandSender<W> {
    pub fn new(writer: FrameWriter<W>) -> Self {
        Self {
            writer: Arc::new(Mutex::new(writer)),
        }
    }

    /// Encode and write one command.
    pub fn send(&self, cmd: &OutboundCommand) -> Result<(), FrameError> {
        let payload = cmd.payload();
        self.lock().send(&payload)?;
        debug!(command = cmd.name(), bytes = payload.len(), "sent command");
        Ok(())
    }

    /// Run `f` with exclusive access to the writer.
    pub fn with_writer<R>(&self, f: impl FnOnce(&mut FrameWriter<W>) -> R) -> R {
        f(&mut self.lock())
    }

    fn lock(&self) -> MutexGuard<'_, FrameWriter<W>> {
        // A panic mid-send leaves at worst a truncated frame; the next
        // terminator resynchronizes the device, so keep going.
        self.writer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<W> std::fmt::Debug for CommandSender<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandSender").finish_non_exhaustive()
    }
}
