use crate::cmd::{load_address_table, ChannelsArgs};
use crate::exit::{CliResult, SUCCESS};
use crate::output::{print_channels, OutputFormat};

pub fn run(args: ChannelsArgs, format: OutputFormat) -> CliResult<i32> {
    let table = load_address_table(args.address_map.as_ref())?;
    print_channels(&table, format);
    Ok(SUCCESS)
}
