use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use sensorbridge_bridge::{
    spawn_heartbeat, Bridge, BridgeConfig, BridgeStats, CommandSender, ControlService,
    ControlTable, RunExit, StallPolicy,
};
use sensorbridge_frame::{FrameReader, FrameWriter};
use sensorbridge_osc::{OscListener, OscPublisher};
use tracing::{info, warn};

use crate::cmd::{
    install_ctrlc_handler, load_address_table, parse_optional_duration, BridgeArgs, StallArg,
};
use crate::exit::{
    bridge_error, frame_error, io_error, osc_error, transport_error, CliResult, SUCCESS,
};
use crate::output::{print_stats, OutputFormat};

pub fn run(args: BridgeArgs, format: OutputFormat) -> CliResult<i32> {
    let idle_timeout = parse_optional_duration(args.idle_timeout.as_deref())?;
    let heartbeat = parse_optional_duration(args.heartbeat.as_deref())?;
    let table = load_address_table(args.address_map.as_ref())?;

    let transport = args.transport.to_config()?;
    let frame_config = args.transport.frame_config(idle_timeout);
    let channel = transport
        .open()
        .map_err(|err| transport_error("open failed", err))?;
    let write_channel = channel
        .try_clone()
        .map_err(|err| transport_error("open failed", err))?;
    info!(endpoint = %transport.endpoint(), "device connected");

    let reader = FrameReader::with_transport(channel, frame_config.clone())
        .map_err(|err| frame_error("configure reader failed", err))?;
    let sender = CommandSender::new(FrameWriter::with_config(write_channel, frame_config));

    let publisher =
        OscPublisher::connect(args.publish.as_str()).map_err(|err| osc_error("publish", err))?;

    let config = BridgeConfig {
        script_name: args.script_name,
        discard_on_malformed: !args.keep_backlog,
        stall_policy: match args.on_stall {
            StallArg::Exit => StallPolicy::Exit,
            StallArg::Continue => StallPolicy::Continue,
        },
        ..BridgeConfig::default()
    };
    let poll_interval = config.poll_interval;
    let stats = Arc::new(BridgeStats::default());
    let mut bridge = Bridge::new(reader, table, publisher, config).with_stats(Arc::clone(&stats));

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let control = if args.no_control {
        None
    } else {
        let listener =
            OscListener::bind(&args.control).map_err(|err| osc_error("control listen", err))?;
        let service =
            ControlService::new(listener, ControlTable::default(), sender.clone(), Arc::clone(&stats))
                .with_poll_interval(poll_interval);
        Some(
            service
                .spawn(Arc::clone(&running))
                .map_err(|err| io_error("control thread", err))?,
        )
    };

    let heartbeat = match heartbeat {
        Some(interval) => Some(
            spawn_heartbeat(sender, interval, Arc::clone(&running), Arc::clone(&stats))
                .map_err(|err| io_error("heartbeat thread", err))?,
        ),
        None => None,
    };

    let result = bridge.run(&running);
    running.store(false, Ordering::SeqCst);

    if let Some(handle) = control {
        match handle.join() {
            Ok(Ok(())) => {}
            Ok(Err(err)) => warn!(error = %err, "control service ended with error"),
            Err(_) => warn!("control thread panicked"),
        }
    }
    if let Some(handle) = heartbeat {
        if handle.join().is_err() {
            warn!("heartbeat thread panicked");
        }
    }

    print_stats(&stats.snapshot(), format);

    match result {
        Ok(RunExit::Shutdown) => {
            info!("shutting down");
            Ok(SUCCESS)
        }
        Ok(RunExit::Closed) => Ok(SUCCESS),
        Err(err) => Err(bridge_error("bridge failed", err)),
    }
}
