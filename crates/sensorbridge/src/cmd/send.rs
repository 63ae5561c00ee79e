use sensorbridge_bridge::{ControlTable, OutboundCommand};
use sensorbridge_frame::FrameWriter;
use sensorbridge_osc::{OscArg, OscMessage};

use crate::cmd::SendArgs;
use crate::exit::{frame_error, transport_error, CliError, CliResult, SUCCESS};
use crate::output::{print_command, OutputFormat};

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let cmd = resolve_command(&args.address, &args.args)?;

    let transport = args.transport.to_config()?;
    let channel = transport
        .open()
        .map_err(|err| transport_error("open failed", err))?;
    let mut writer = FrameWriter::with_config(channel, args.transport.frame_config(None));
    writer
        .send(&cmd.payload())
        .map_err(|err| frame_error("send failed", err))?;

    print_command(&cmd, &transport.endpoint(), format);
    Ok(SUCCESS)
}

/// Build the command the bridge would send for this control message.
fn resolve_command(address: &str, raw_args: &[String]) -> CliResult<OutboundCommand> {
    let args = raw_args
        .iter()
        .map(String::as_str)
        .map(parse_arg)
        .collect::<CliResult<Vec<_>>>()?;
    ControlTable::default()
        .resolve(&OscMessage::with_args(address, args))
        .map_err(|err| CliError::usage(err.to_string()))
}

fn parse_arg(input: &str) -> CliResult<OscArg> {
    if let Ok(v) = input.parse::<i32>() {
        return Ok(OscArg::Int(v));
    }
    input
        .parse::<f32>()
        .map(OscArg::Float)
        .map_err(|_| CliError::usage(format!("argument {input:?} is not a number")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn resolves_opto_interval() {
        let cmd = resolve_command("/optoInterval", &strings(&["10", "20"])).unwrap();
        assert_eq!(cmd, OutboundCommand::OptoInterval { on: 10, off: 20 });
    }

    #[test]
    fn float_args_are_accepted() {
        let cmd = resolve_command("/serialRate", &strings(&["9600.0"])).unwrap();
        assert_eq!(cmd, OutboundCommand::SerialRate { rate: 9600 });
    }

    #[test]
    fn bad_input_is_usage_error() {
        let err = resolve_command("/optoInterval", &strings(&["ten", "20"])).unwrap_err();
        assert_eq!(err.code, crate::exit::USAGE);
        let err = resolve_command("/bogus", &[]).unwrap_err();
        assert_eq!(err.code, crate::exit::USAGE);
        let err = resolve_command("/raw", &strings(&["300"])).unwrap_err();
        assert_eq!(err.code, crate::exit::USAGE);
    }
}
