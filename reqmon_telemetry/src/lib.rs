//! Delivery of registry contents to an external telemetry backend
//!
//! Two background loops run outside the request path, each on its own interval and in
//! its own failure domain:
//!
//! - the reporter loop ([`PeriodicReporter`]) flushes the [`Registry`] into a
//!   [`MetricSink`]
//! - the heartbeat ([`HeartbeatService`]) emits a liveness sample tagged with the
//!   application identity
//!
//! Delivery failures are logged and retried on the next tick, they are never returned to
//! request handling code. Both loops are spawned on [`BackgroundTasks`], which is used to
//! stop them at process shutdown.
//!
//! [`Registry`]: reqmon_metric::Registry
use thiserror::Error;

mod heartbeat;
mod reporter;
mod sample;
mod sink;
mod tasks;

pub use heartbeat::{DEFAULT_HEARTBEAT_INTERVAL, HEARTBEAT_METRIC, HeartbeatService};
pub use reporter::{
    DEFAULT_METRIC_PREFIX, DEFAULT_REPORTING_INTERVAL, PeriodicReporter, ReporterHandle,
};
pub use sample::{MetricSample, SampleKind};
pub use sink::{JsonLinesSink, LogSink, MemorySink, MetricSink};
pub use tasks::BackgroundTasks;

/// Failure to hand samples to the backend
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("cannot write samples: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot serialize sample: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("telemetry backend unavailable: {0}")]
    Unavailable(String),
}

pub type Result<T, E = SinkError> = std::result::Result<T, E>;
