use tracing_subscriber::{filter::LevelFilter, EnvFilter};

/// Arguments which control logging of the process.
/// Logs are always written to stderr.
#[derive(Debug, Clone, clap::Args)]
pub struct LogArgs {
    /// Level at and above which events are logged.
    /// Directives of RUST_LOG, if set, take precedence.
    #[clap(
        long = "log.level",
        value_enum,
        default_value = "warn",
        env = "DETECTOR_LOG_LEVEL",
        global = true
    )]
    pub level: LogLevel,
    /// Format of logged events.
    #[clap(
        long = "log.format",
        value_enum,
        default_value = "text",
        env = "DETECTOR_LOG_FORMAT",
        global = true
    )]
    pub format: LogFormat,
}

#[derive(clap::ValueEnum, Debug, Copy, Clone, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Off,
}

#[derive(clap::ValueEnum, Debug, Copy, Clone, PartialEq, Eq)]
pub enum LogFormat {
    /// Plain text lines.
    Text,
    /// Newline-delimited JSON events.
    Json,
    /// Text lines with ANSI colors.
    Color,
}

impl LogLevel {
    pub fn filter(&self) -> LevelFilter {
        match self {
            LogLevel::Trace => LevelFilter::TRACE,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Off => LevelFilter::OFF,
        }
    }
}

/// Install the global tracing subscriber. Must be called at most once.
pub fn init_logging(args: &LogArgs) {
    let env_filter = EnvFilter::builder()
        .with_default_directive(args.level.filter().into())
        .from_env_lossy();

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);

    match args.format {
        LogFormat::Json => builder
            .json()
            // Keep the message and fields at the top level of each event.
            .flatten_event(true)
            .with_current_span(true)
            .with_span_list(false)
            .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
            .init(),
        LogFormat::Text => builder.with_ansi(false).init(),
        LogFormat::Color => builder.with_ansi(true).init(),
    }
}
