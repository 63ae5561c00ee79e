use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Subcommand, ValueEnum};
use sensorbridge_bridge::AddressTable;
use sensorbridge_frame::{EscapeMode, FrameConfig};
use sensorbridge_osc::{DEFAULT_CONTROL_ADDR, DEFAULT_PUBLISH_ADDR};
use sensorbridge_transport::{SerialConfig, TransportConfig, DEFAULT_BAUD};
use tracing::info;

use crate::exit::{bridge_error, CliError, CliResult, INTERNAL};
use crate::output::OutputFormat;

pub mod bridge;
pub mod channels;
pub mod monitor;
#[cfg(unix)]
pub mod ports;
pub mod send;
pub mod version;

/// Read timeout for the transport, so loops notice Ctrl-C promptly.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the bridge: publish sensor frames as OSC, forward OSC control to the device.
    Bridge(BridgeArgs),
    /// Print decoded sensor messages without publishing.
    Monitor(MonitorArgs),
    /// Send one control command to the device.
    Send(SendArgs),
    /// List the address table the bridge decodes with.
    Channels(ChannelsArgs),
    /// List candidate serial devices.
    #[cfg(unix)]
    Ports(PortsArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Bridge(args) => bridge::run(args, format),
        Command::Monitor(args) => monitor::run(args, format),
        Command::Send(args) => send::run(args, format),
        Command::Channels(args) => channels::run(args, format),
        #[cfg(unix)]
        Command::Ports(args) => ports::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum TransportKind {
    Serial,
    Tcp,
}

/// How to reach the microcontroller.
#[derive(Args, Debug)]
pub struct TransportArgs {
    /// Transport to the device.
    #[arg(long, value_enum, default_value = "serial", env = "SENSORBRIDGE_TRANSPORT")]
    pub transport: TransportKind,
    /// Serial device path. Default: the first USB serial adapter found.
    #[arg(long, short = 'd', env = "SENSORBRIDGE_DEVICE")]
    pub device: Option<PathBuf>,
    /// Serial line speed.
    #[arg(long, default_value_t = DEFAULT_BAUD, env = "SENSORBRIDGE_BAUD")]
    pub baud: u32,
    /// Device network endpoint (host:port) for the tcp transport.
    #[arg(long, env = "SENSORBRIDGE_ADDR")]
    pub addr: Option<String>,
    /// Escape only the terminator byte when encoding, for older firmware.
    #[arg(long, env = "SENSORBRIDGE_COMPAT_ESCAPE")]
    pub compat_escape: bool,
}

impl TransportArgs {
    pub fn to_config(&self) -> CliResult<TransportConfig> {
        match self.transport {
            TransportKind::Tcp => {
                let addr = self
                    .addr
                    .clone()
                    .ok_or_else(|| CliError::usage("--addr is required with --transport tcp"))?;
                Ok(TransportConfig::Tcp { addr })
            }
            TransportKind::Serial => {
                let path = match &self.device {
                    Some(path) => path.clone(),
                    None => default_device()?,
                };
                Ok(TransportConfig::Serial {
                    path,
                    config: SerialConfig {
                        baud: self.baud,
                        ..SerialConfig::default()
                    },
                })
            }
        }
    }

    pub fn escape_mode(&self) -> EscapeMode {
        if self.compat_escape {
            EscapeMode::TerminatorOnly
        } else {
            EscapeMode::Both
        }
    }

    pub fn frame_config(&self, idle_timeout: Option<Duration>) -> FrameConfig {
        FrameConfig {
            escape_mode: self.escape_mode(),
            read_timeout: Some(POLL_INTERVAL),
            idle_timeout,
            ..FrameConfig::default()
        }
    }
}

#[cfg(unix)]
fn default_device() -> CliResult<PathBuf> {
    let ports = sensorbridge_transport::list_serial_ports()
        .map_err(|err| crate::exit::transport_error("listing serial ports failed", err))?;
    let port = ports
        .into_iter()
        .find(|p| p.usb)
        .ok_or_else(|| CliError::usage("no USB serial device found; pass --device"))?;
    info!(device = %port.path.display(), "using detected serial device");
    Ok(port.path)
}

#[cfg(not(unix))]
fn default_device() -> CliResult<PathBuf> {
    Err(CliError::usage("--device is required on this platform"))
}

#[derive(Args, Debug)]
pub struct BridgeArgs {
    #[command(flatten)]
    pub transport: TransportArgs,
    /// Where to publish OSC messages (host:port).
    #[arg(long, default_value = DEFAULT_PUBLISH_ADDR, env = "SENSORBRIDGE_PUBLISH")]
    pub publish: String,
    /// Where to listen for OSC control messages (host:port).
    #[arg(long, default_value = DEFAULT_CONTROL_ADDR, env = "SENSORBRIDGE_CONTROL")]
    pub control: String,
    /// Don't listen for control messages.
    #[arg(long)]
    pub no_control: bool,
    /// JSON address map replacing the built-in one.
    #[arg(long, value_name = "FILE", env = "SENSORBRIDGE_ADDRESS_MAP")]
    pub address_map: Option<PathBuf>,
    /// Treat the device as stalled after this long without data (e.g. 5s, 500ms).
    #[arg(long, value_name = "DURATION", env = "SENSORBRIDGE_IDLE_TIMEOUT")]
    pub idle_timeout: Option<String>,
    /// What to do when the device stalls.
    #[arg(long, value_enum, default_value = "exit")]
    pub on_stall: StallArg,
    /// Send a heartbeat byte to the device at this interval (e.g. 500ms).
    #[arg(long, value_name = "DURATION", env = "SENSORBRIDGE_HEARTBEAT")]
    pub heartbeat: Option<String>,
    /// Name announced on /scriptName.
    #[arg(long, default_value = "sensorbridge", env = "SENSORBRIDGE_SCRIPT_NAME")]
    pub script_name: String,
    /// Keep the transport backlog after a malformed frame.
    #[arg(long)]
    pub keep_backlog: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum StallArg {
    Exit,
    Continue,
}

#[derive(Args, Debug)]
pub struct MonitorArgs {
    #[command(flatten)]
    pub transport: TransportArgs,
    /// JSON address map replacing the built-in one.
    #[arg(long, value_name = "FILE", env = "SENSORBRIDGE_ADDRESS_MAP")]
    pub address_map: Option<PathBuf>,
    /// Exit after printing N messages.
    #[arg(long)]
    pub count: Option<usize>,
    /// Give up after this long without data (e.g. 5s, 500ms).
    #[arg(long, value_name = "DURATION", env = "SENSORBRIDGE_IDLE_TIMEOUT")]
    pub idle_timeout: Option<String>,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    #[command(flatten)]
    pub transport: TransportArgs,
    /// Control address: /optoInterval, /serialRate, or /raw.
    pub address: String,
    /// Numeric arguments for the command.
    #[arg(allow_negative_numbers = true)]
    pub args: Vec<String>,
}

#[derive(Args, Debug, Default)]
pub struct ChannelsArgs {
    /// JSON address map replacing the built-in one.
    #[arg(long, value_name = "FILE", env = "SENSORBRIDGE_ADDRESS_MAP")]
    pub address_map: Option<PathBuf>,
}

#[derive(Args, Debug, Default)]
pub struct PortsArgs {
    /// Include non-USB serial devices.
    #[arg(long)]
    pub all: bool,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub fn load_address_table(path: Option<&PathBuf>) -> CliResult<AddressTable> {
    match path {
        Some(path) => {
            let table = AddressTable::from_file(path)
                .map_err(|err| bridge_error("address map", err))?;
            info!(path = %path.display(), channels = table.len(), "loaded address map");
            Ok(table)
        }
        None => Ok(AddressTable::default()),
    }
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::usage("duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::usage(format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::usage("duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}

pub fn parse_optional_duration(input: Option<&str>) -> CliResult<Option<Duration>> {
    input.map(parse_duration).transpose()
}

pub fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_seconds_and_millis() {
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
        assert_eq!(parse_duration("3").unwrap(), Duration::from_secs(3));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert!(parse_duration("0s").is_err());
        assert!(parse_duration("bad").is_err());
        assert!(parse_duration("").is_err());
        assert_eq!(parse_optional_duration(None).unwrap(), None);
    }

    fn transport(kind: TransportKind) -> TransportArgs {
        TransportArgs {
            transport: kind,
            device: Some(PathBuf::from("/dev/ttyUSB0")),
            baud: 9600,
            addr: None,
            compat_escape: false,
        }
    }

    #[test]
    fn tcp_requires_addr() {
        let err = transport(TransportKind::Tcp).to_config().unwrap_err();
        assert_eq!(err.code, crate::exit::USAGE);
    }

    #[test]
    fn serial_config_carries_baud() {
        let cfg = transport(TransportKind::Serial).to_config().unwrap();
        assert_eq!(
            cfg,
            TransportConfig::Serial {
                path: PathBuf::from("/dev/ttyUSB0"),
                config: SerialConfig {
                    baud: 9600,
                    ..SerialConfig::default()
                },
            }
        );
    }

    #[test]
    fn compat_escape_selects_terminator_only() {
        let mut args = transport(TransportKind::Serial);
        assert_eq!(args.frame_config(None).escape_mode, EscapeMode::Both);
        args.compat_escape = true;
        let cfg = args.frame_config(Some(Duration::from_secs(1)));
        assert_eq!(cfg.escape_mode, EscapeMode::TerminatorOnly);
        assert_eq!(cfg.idle_timeout, Some(Duration::from_secs(1)));
        assert_eq!(cfg.read_timeout, Some(POLL_INTERVAL));
    }
}
