use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use sensorbridge_bridge::{AddressTable, InterpretError};
use sensorbridge_frame::{Frame, FrameError, FrameReader};
use tracing::{debug, info, warn};

use crate::cmd::{install_ctrlc_handler, load_address_table, parse_optional_duration, MonitorArgs};
use crate::exit::{frame_error, transport_error, CliResult, SUCCESS};
use crate::output::{print_message, OutputFormat};

pub fn run(args: MonitorArgs, format: OutputFormat) -> CliResult<i32> {
    let idle_timeout = parse_optional_duration(args.idle_timeout.as_deref())?;
    let table = load_address_table(args.address_map.as_ref())?;

    let transport = args.transport.to_config()?;
    let channel = transport
        .open()
        .map_err(|err| transport_error("open failed", err))?;
    info!(endpoint = %transport.endpoint(), "monitoring");
    let mut reader = FrameReader::with_transport(channel, args.transport.frame_config(idle_timeout))
        .map_err(|err| frame_error("configure reader failed", err))?;

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let mut printed = 0usize;
    while running.load(Ordering::SeqCst) {
        let frame = match reader.try_read_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => continue,
            Err(err) if err.is_recoverable() => {
                warn!(error = %err, "skipping frame");
                continue;
            }
            Err(FrameError::ConnectionClosed) => {
                info!("device closed the connection");
                break;
            }
            Err(err) => return Err(frame_error("receive failed", err)),
        };

        if !show(&table, &frame, format) {
            continue;
        }
        printed = printed.saturating_add(1);
        if let Some(count) = args.count {
            if printed >= count {
                break;
            }
        }
    }

    Ok(SUCCESS)
}

/// Print the frame if it decodes. Returns whether anything was printed.
fn show(table: &AddressTable, frame: &Frame, format: OutputFormat) -> bool {
    match table.interpret(frame.as_ref()) {
        Ok(msg) => {
            print_message(&msg, frame.as_ref(), format);
            true
        }
        Err(err @ InterpretError::MalformedFrame { .. }) => {
            warn!(error = %err, "skipping frame");
            false
        }
        Err(err @ InterpretError::UnknownAddress(_)) => {
            debug!(error = %err, "skipping frame");
            false
        }
    }
}
