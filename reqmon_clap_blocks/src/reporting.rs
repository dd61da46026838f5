//! Config for metric reporting and the heartbeat.

/// CLI config for the reporter and heartbeat loops
#[derive(Debug, Clone, clap::Parser)]
pub struct ReportingConfig {
    /// How often the collected metrics are flushed to the sink.
    #[clap(
        long = "reporting-interval",
        env = "REQMON_REPORTING_INTERVAL",
        default_value = "5s",
        action
    )]
    pub reporting_interval: humantime::Duration,

    /// How often a heartbeat is sent.
    #[clap(
        long = "heartbeat-interval",
        env = "REQMON_HEARTBEAT_INTERVAL",
        default_value = "5m",
        action
    )]
    pub heartbeat_interval: humantime::Duration,

    /// Prefix of every reported metric name.
    ///
    /// An empty prefix reports names unchanged.
    #[clap(
        long = "metric-prefix",
        env = "REQMON_METRIC_PREFIX",
        default_value = "http.server",
        action
    )]
    pub metric_prefix: String,

    /// Component name, used in the heartbeat and in the handler tag keys
    /// (`<component>.resource.module`, `<component>.resource.func`).
    #[clap(
        long = "component",
        env = "REQMON_COMPONENT",
        default_value = "http",
        action
    )]
    pub component: String,

    /// Source (host) reported with every sample.
    #[clap(
        long = "source",
        env = "REQMON_SOURCE",
        default_value = "localhost",
        action
    )]
    pub source: String,

    /// Open a tracing span for every request.
    #[clap(long = "trace-all", env = "REQMON_TRACE_ALL", action)]
    pub trace_all: bool,
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use clap::Parser;

    use super::*;

    #[test]
    fn test_defaults() {
        let config = ReportingConfig::try_parse_from([""]).unwrap();
        assert_eq!(
            *config.reporting_interval,
            reqmon_telemetry::DEFAULT_REPORTING_INTERVAL
        );
        assert_eq!(
            *config.heartbeat_interval,
            reqmon_telemetry::DEFAULT_HEARTBEAT_INTERVAL
        );
        assert_eq!(config.metric_prefix, reqmon_telemetry::DEFAULT_METRIC_PREFIX);
        assert_eq!(config.component, reqmon_instrument::DEFAULT_COMPONENT);
        assert_eq!(config.source, "localhost");
        assert!(!config.trace_all);
    }

    #[test]
    fn test_overrides() {
        let config = ReportingConfig::try_parse_from([
            "",
            "--reporting-interval",
            "1m 30s",
            "--metric-prefix",
            "",
            "--trace-all",
        ])
        .unwrap();
        assert_eq!(*config.reporting_interval, Duration::from_secs(90));
        assert_eq!(config.metric_prefix, "");
        assert!(config.trace_all);
    }
}
