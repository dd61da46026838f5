//! Config for the process logs.

/// Filter used when neither `--log-filter` nor `-v` is given
pub const DEFAULT_LOG_FILTER: &str = "warn";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Full,
    Pretty,
    Json,
    Compact,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "full" => Ok(Self::Full),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            "compact" => Ok(Self::Compact),
            _ => Err(format!(
                "Invalid log format '{s}'. Valid options: full, pretty, json, compact"
            )),
        }
    }
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Full => write!(f, "full"),
            Self::Pretty => write!(f, "pretty"),
            Self::Json => write!(f, "json"),
            Self::Compact => write!(f, "compact"),
        }
    }
}

/// CLI config for logging
#[derive(Debug, Clone, clap::Parser)]
pub struct LoggingConfig {
    /// Logs: filter directive
    ///
    /// Configures log severity level filter, by target.
    ///
    /// Simplest options: error, warn, info, debug, trace
    ///
    /// Levels for different modules can be specified. For example
    /// `debug,reqmon_telemetry=info` specifies debug logging for all modules
    /// except for the `reqmon_telemetry` crate which will only display info
    /// level logging.
    ///
    /// Overridden by `-v`.
    #[clap(long = "log-filter", env = "LOG_FILTER", action)]
    pub log_filter: Option<String>,

    /// Logs: filter short-hand
    ///
    /// Convenient way to set log severity level filter.
    /// Overrides `--log-filter`.
    ///
    /// -v   'info'
    ///
    /// -vv  'debug'
    ///
    /// -vvv 'trace'
    #[clap(
        short = 'v',
        long = "verbose",
        action = clap::ArgAction::Count,
        verbatim_doc_comment
    )]
    pub log_verbose_count: u8,

    /// Logs: message format
    ///
    /// Can be one of: full, pretty, json, compact
    #[clap(long = "log-format", env = "LOG_FORMAT", default_value = "full", action)]
    pub log_format: LogFormat,
}

impl LoggingConfig {
    /// The filter directive in effect
    pub fn filter_directive(&self) -> &str {
        match self.log_verbose_count {
            0 => self.log_filter.as_deref().unwrap_or(DEFAULT_LOG_FILTER),
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[test]
    fn test_filter_directive() {
        let config = LoggingConfig::try_parse_from([""]).unwrap();
        assert_eq!(config.filter_directive(), "warn");
        assert_eq!(config.log_format, LogFormat::Full);

        let config =
            LoggingConfig::try_parse_from(["", "--log-filter", "reqmon=debug"]).unwrap();
        assert_eq!(config.filter_directive(), "reqmon=debug");

        // -v wins over --log-filter
        let config =
            LoggingConfig::try_parse_from(["", "--log-filter", "reqmon=debug", "-vv"]).unwrap();
        assert_eq!(config.filter_directive(), "debug");

        let config = LoggingConfig::try_parse_from(["", "-vvvv"]).unwrap();
        assert_eq!(config.filter_directive(), "trace");
    }

    #[test]
    fn test_log_format() {
        let config = LoggingConfig::try_parse_from(["", "--log-format", "JSON"]).unwrap();
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.log_format.to_string(), "json");

        assert!(LoggingConfig::try_parse_from(["", "--log-format", "logfmt"]).is_err());
    }
}
