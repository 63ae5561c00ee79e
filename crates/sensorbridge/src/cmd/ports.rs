use sensorbridge_transport::list_serial_ports;

use crate::cmd::PortsArgs;
use crate::exit::{transport_error, CliResult, FAILURE, SUCCESS};
use crate::output::{print_ports, OutputFormat};

pub fn run(args: PortsArgs, format: OutputFormat) -> CliResult<i32> {
    let mut ports =
        list_serial_ports().map_err(|err| transport_error("listing serial ports failed", err))?;
    if !args.all {
        ports.retain(|p| p.usb);
    }
    print_ports(&ports, format);

    // Non-zero when nothing usable is attached, for scripts.
    Ok(if ports.is_empty() { FAILURE } else { SUCCESS })
}
