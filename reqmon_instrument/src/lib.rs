//! Request lifecycle instrumentation
//!
//! [`RequestMetrics`] receives two callbacks per request from the routing layer:
//! [`on_start`](RequestMetrics::on_start) before the handler runs and
//! [`on_complete`](RequestMetrics::on_complete) once the response status is known. Each
//! pair is translated into updates of a shared [`Registry`]:
//!
//! - `request.<entity>.<method>.inflight` and `total_requests.inflight` gauges, +1 on
//!   start and -1 on completion
//! - `response.<entity>.<method>.<status>.cumulative` and its per-shard, per-service,
//!   per-cluster and per-application delta rollups
//! - for 4xx and 5xx responses, `request.<entity>.<method>.errors`, `response.errors` and
//!   its rollups
//! - `response.completed.*` rollups, see [`CompletionRollup`]
//! - `.latency` (milliseconds) and `.cpu_ns` histograms for the response
//!
//! Per-shard and per-cluster series only exist when the identity has a shard or cluster.
//!
//! The registry is flushed by the configured
//! [`ReporterHandle`](reqmon_telemetry::ReporterHandle), which is started together with a
//! heartbeat when the instrumentation is built.
//!
//! [`Registry`]: reqmon_metric::Registry
use thiserror::Error;

mod cpu;
mod engine;
mod route;
mod scope;
mod tracer;

pub use engine::{
    CompletionRollup, DEFAULT_COMPONENT, RequestContext, RequestMetrics, RequestMetricsBuilder,
};
pub use route::{
    REQUEST_PREFIX, RESPONSE_PREFIX, RequestInfo, RouteMatch, UNKNOWN_ENTITY, is_error_status,
    sanitize_entity_name,
};
pub use scope::{AggregationScope, SERVER_PROVIDED_SOURCE, ScopeTags, func_tag_key, module_tag_key};
pub use tracer::{ActiveSpan, RequestTracer, TracingSpans};

/// Reasons the instrumentation runs disabled
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("application tags not configured")]
    MissingIdentity,

    #[error("application tags not correctly configured: {0}")]
    InvalidIdentity(#[from] reqmon_tags::Error),

    #[error("metrics reporter not configured")]
    MissingReporter,
}

pub type Result<T, E = ConfigurationError> = std::result::Result<T, E>;
