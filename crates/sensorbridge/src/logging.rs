use clap::ValueEnum;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

/// Our crates all share this target prefix.
const TARGET_PREFIX: &str = "sensorbridge";

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_filter(self) -> LevelFilter {
        match self {
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

/// Install the stderr subscriber.
///
/// `level` applies to the bridge's own crates; everything else stays at
/// warn so dependencies don't flood the frame-rate log.
pub fn init_logging(format: LogFormat, level: LogLevel) {
    let level = level.as_filter();
    let filter = Targets::new()
        .with_default(LevelFilter::WARN.min(level))
        .with_target(TARGET_PREFIX, level);
    // Module paths only help once per-frame detail is on.
    let show_target = level >= LevelFilter::DEBUG;

    let layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(show_target);

    match format {
        LogFormat::Text => {
            let _ = tracing_subscriber::registry()
                .with(layer.with_filter(filter))
                .try_init();
        }
        LogFormat::Json => {
            let _ = tracing_subscriber::registry()
                .with(layer.json().with_filter(filter))
                .try_init();
        }
    }
}
