use reqmon_clap_blocks::logging::{LogFormat, LoggingConfig};
use tracing_subscriber::EnvFilter;

#[derive(Debug, thiserror::Error)]
pub(crate) enum Error {
    #[error("invalid log filter: {0}")]
    Filter(#[from] tracing_subscriber::filter::ParseError),

    #[error("cannot install the log subscriber: {0}")]
    Install(Box<dyn std::error::Error + Send + Sync + 'static>),
}

/// Install the global log subscriber
///
/// Logs are written to stderr, leaving stdout to sinks that write samples there.
pub(crate) fn init_logs(config: &LoggingConfig) -> Result<(), Error> {
    let filter = EnvFilter::try_new(config.filter_directive())?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match config.log_format {
        LogFormat::Full => builder.try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Compact => builder.compact().try_init(),
    }
    .map_err(Error::Install)
}
