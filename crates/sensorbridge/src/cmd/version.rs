use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("sensorbridge {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: sensorbridge");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!(
        "target: {}",
        option_env!("SENSORBRIDGE_BUILD_TARGET").unwrap_or("unknown")
    );
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!(
        "rustc: {}",
        option_env!("RUSTC_VERSION").unwrap_or("unknown")
    );
    println!("git_hash: {}", option_env!("GIT_HASH").unwrap_or("unknown"));
    println!(
        "features: bridge={}, async={}, cli=true",
        cfg!(feature = "bridge"),
        cfg!(feature = "async")
    );
    println!(
        "wire: terminator=0x{:02X} escape=0x{:02X} max_frame={}",
        sensorbridge_frame::TERMINATOR,
        sensorbridge_frame::ESCAPE,
        sensorbridge_frame::DEFAULT_MAX_FRAME_SIZE
    );

    Ok(SUCCESS)
}
