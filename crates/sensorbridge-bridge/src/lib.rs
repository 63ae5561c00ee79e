//! Sensor bridge core.
//!
//! Interprets frames from the microcontroller into addressed readings,
//! publishes them on the OSC bus, and turns OSC control messages back into
//! framed commands for the device.

pub mod command;
pub mod dispatcher;
pub mod error;
pub mod interpreter;
pub mod mapping;

pub use command::{
    CommandError, CommandSender, ControlKind, ControlTable, OutboundCommand, CONTROL_OPTO_INTERVAL,
    CONTROL_RAW, CONTROL_SERIAL_RATE,
};
pub use dispatcher::{
    spawn_heartbeat, Bridge, BridgeConfig, BridgeState, BridgeStats, ControlService, RejectReason,
    RunExit, StallPolicy, StatsSnapshot, StepOutcome, SCRIPT_NAME_ADDRESS,
};
pub use error::{BridgeError, Result};
pub use interpreter::{AddressTable, ChannelEntry, ChannelKind, InterpretError, Message};
pub use mapping::{
    pitch_for, OptoConfig, OptoContext, OptoReading, OptoState, SchmittTrigger, TriggerState,
    GRAY_CODE, PITCHES,
};
