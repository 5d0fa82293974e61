use std::io::IsTerminal;
use tracing_subscriber::util::SubscriberInitExt;

/// The basic subscriber
macro_rules! subscriber_builder {
    () => {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_ansi(std::io::stderr().is_terminal() && yansi::Condition::no_color())
            .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
    };
}

#[derive(clap::Args, Debug, Clone, Copy, Default)]
pub struct LogConfigArgs {
    /// Turn-on the DEBUG log level.
    ///
    /// If off only reports ERROR, WARN, and INFO, if on also reports DEBUG
    #[clap(long, global = true)]
    pub debug: bool,

    /// Configures the logging level.
    ///
    /// One of error/warn/info/debug/trace.
    /// Overrides `--debug`
    #[clap(long, global = true)]
    pub log_level: Option<tracing::Level>,
}

const DEFAULT_MAX_LEVEL: tracing::Level = tracing::Level::INFO;

/// Configures and enables logging taking into account flags, env variables and file config.
///
/// 1. If `--debug` or `--log-level` flags are set, these are used
/// 2. Else, if `RUST_LOG` variable is set, it is used as an env filter
/// 3. Else, the `log.level` of the configuration file is used, if any
/// 4. Else, INFO is the max level
pub fn log_init(flags: &LogConfigArgs, file_level: Option<tracing::Level>) {
    let subscriber = subscriber_builder!();

    let log_level = flags
        .log_level
        .or(flags.debug.then_some(tracing::Level::DEBUG));

    if let Some(log_level) = log_level {
        subscriber.with_max_level(log_level).finish().init();
        return;
    }

    if std::env::var("RUST_LOG").is_ok() {
        subscriber
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_file(true)
            .with_line_number(true)
            .finish()
            .init();
        return;
    }

    subscriber
        .with_max_level(file_level.unwrap_or(DEFAULT_MAX_LEVEL))
        .finish()
        .init();
}
