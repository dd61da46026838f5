use std::sync::Arc;
use std::time::{Duration, Instant};

use reqmon_metric::Registry;
use reqmon_tags::{ApplicationTags, COMPONENT_TAG_KEY};
use reqmon_telemetry::{
    BackgroundTasks, DEFAULT_HEARTBEAT_INTERVAL, HeartbeatService, ReporterHandle,
};
use tracing::{info, warn};

use crate::cpu::process_cpu_time;
use crate::scope::{AggregationScope, ScopeTags, func_tag_key, module_tag_key};
use crate::{ActiveSpan, ConfigurationError, RequestInfo, RequestTracer, RouteMatch, is_error_status};

/// Component name used when none is configured
pub const DEFAULT_COMPONENT: &str = "http";

const TOTAL_INFLIGHT: &str = "total_requests.inflight";
const RESPONSE_ERRORS: &str = "response.errors";
const RESPONSE_COMPLETED: &str = "response.completed";

/// How the `response.completed.*` rollups are gated on the optional identity dimensions
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum CompletionRollup {
    /// `aggregated_per_source` always. The per-shard delta and a cumulative per-service
    /// counter only when a shard is configured, the per-cluster delta and a cumulative
    /// per-application counter only when a cluster is configured.
    ///
    /// This couples per-service to shard and per-application to cluster, unlike every
    /// other rollup.
    #[default]
    Faithful,

    /// Same gating as the response and error rollups: per-service and per-application
    /// always, per-shard and per-cluster when their dimension is configured. All
    /// rollups except per-source are delta counters.
    Independent,
}

/// Builds a [`RequestMetrics`], falling back to a disabled instance when the
/// configuration is incomplete
#[derive(Debug)]
pub struct RequestMetricsBuilder {
    registry: Arc<Registry>,
    identity: Option<reqmon_tags::Result<ApplicationTags>>,
    reporter: Option<Arc<dyn ReporterHandle>>,
    tracer: Option<Arc<dyn RequestTracer>>,
    component: String,
    trace_all: bool,
    heartbeat_interval: Duration,
    completion_rollup: CompletionRollup,
}

impl Default for RequestMetricsBuilder {
    fn default() -> Self {
        Self {
            registry: Default::default(),
            identity: None,
            reporter: None,
            tracer: None,
            component: DEFAULT_COMPONENT.to_string(),
            trace_all: false,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            completion_rollup: Default::default(),
        }
    }
}

impl RequestMetricsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use an existing registry instead of a fresh one
    pub fn registry(self, registry: Arc<Registry>) -> Self {
        Self { registry, ..self }
    }

    pub fn identity(self, identity: ApplicationTags) -> Self {
        self.identity_result(Ok(identity))
    }

    /// Provide the outcome of building the identity, an error disables the instrumentation
    pub fn identity_result(self, identity: reqmon_tags::Result<ApplicationTags>) -> Self {
        Self {
            identity: Some(identity),
            ..self
        }
    }

    pub fn reporter(self, reporter: Arc<dyn ReporterHandle>) -> Self {
        Self {
            reporter: Some(reporter),
            ..self
        }
    }

    pub fn tracer(self, tracer: Arc<dyn RequestTracer>) -> Self {
        Self {
            tracer: Some(tracer),
            ..self
        }
    }

    pub fn component(self, component: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            ..self
        }
    }

    /// Open a span for every request, requires a [`tracer`](Self::tracer)
    pub fn trace_all(self, trace_all: bool) -> Self {
        Self { trace_all, ..self }
    }

    pub fn heartbeat_interval(self, heartbeat_interval: Duration) -> Self {
        Self {
            heartbeat_interval,
            ..self
        }
    }

    pub fn completion_rollup(self, completion_rollup: CompletionRollup) -> Self {
        Self {
            completion_rollup,
            ..self
        }
    }

    /// Validate the configuration, then start the reporter and heartbeat on `tasks`
    ///
    /// Invalid configuration is logged once and yields a disabled [`RequestMetrics`] on
    /// which every call is a no-op. Must be called within a tokio runtime.
    pub fn start(self, tasks: &BackgroundTasks) -> RequestMetrics {
        let identity = match self.identity {
            None => return RequestMetrics::disabled(ConfigurationError::MissingIdentity),
            Some(Err(e)) => return RequestMetrics::disabled(e.into()),
            Some(Ok(identity)) => identity,
        };
        let Some(reporter) = self.reporter else {
            return RequestMetrics::disabled(ConfigurationError::MissingReporter);
        };

        reporter.start(Arc::clone(&self.registry), tasks);
        HeartbeatService::new(reporter.sink(), &identity, &self.component, reporter.source())
            .with_interval(self.heartbeat_interval)
            .start(tasks);

        info!(
            application = identity.application(),
            service = identity.service(),
            cluster = identity.cluster(),
            shard = identity.shard(),
            component = %self.component,
            "request metrics enabled"
        );

        RequestMetrics {
            mode: Mode::Enabled(Instrumentor {
                registry: self.registry,
                tags: ScopeTags::new(&identity, &self.component),
                identity,
                tracer: self.tracer.filter(|_| self.trace_all),
                module_key: module_tag_key(&self.component),
                func_key: func_tag_key(&self.component),
                component: self.component,
                completion_rollup: self.completion_rollup,
            }),
        }
    }
}

/// Per-request state carried from [`RequestMetrics::on_start`] to
/// [`RequestMetrics::on_complete`]
///
/// Dropping a context without completing it leaves the inflight gauges incremented.
#[derive(Debug)]
pub struct RequestContext {
    request: RequestInfo,
    start: Option<Instant>,
    cpu_start: Option<Duration>,
    span: Option<Box<dyn ActiveSpan>>,
}

impl RequestContext {
    /// A context for a request that was never passed to [`RequestMetrics::on_start`]
    ///
    /// Completing it records the response counters but neither touches the inflight
    /// gauges nor records latency.
    pub fn unstarted(request: RequestInfo) -> Self {
        Self {
            request,
            start: None,
            cpu_start: None,
            span: None,
        }
    }

    pub fn request(&self) -> &RequestInfo {
        &self.request
    }

    pub fn is_started(&self) -> bool {
        self.start.is_some()
    }

    pub fn is_traced(&self) -> bool {
        self.span.is_some()
    }
}

/// Translates request start and completion into registry updates
///
/// A disabled instance, see [`RequestMetricsBuilder::start`], ignores every call. Disabling
/// is permanent for the lifetime of the instance.
#[derive(Debug)]
pub struct RequestMetrics {
    mode: Mode,
}

#[derive(Debug)]
enum Mode {
    Enabled(Instrumentor),
    Disabled(ConfigurationError),
}

impl RequestMetrics {
    pub fn builder() -> RequestMetricsBuilder {
        RequestMetricsBuilder::new()
    }

    pub fn disabled(reason: ConfigurationError) -> Self {
        warn!(error = %reason, "request metrics not enabled");
        Self {
            mode: Mode::Disabled(reason),
        }
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self.mode, Mode::Enabled(_))
    }

    pub fn disabled_reason(&self) -> Option<&ConfigurationError> {
        match &self.mode {
            Mode::Enabled(_) => None,
            Mode::Disabled(reason) => Some(reason),
        }
    }

    /// The registry the instrumentation writes to, `None` when disabled
    pub fn registry(&self) -> Option<&Arc<Registry>> {
        match &self.mode {
            Mode::Enabled(instrumentor) => Some(&instrumentor.registry),
            Mode::Disabled(_) => None,
        }
    }

    pub fn identity(&self) -> Option<&ApplicationTags> {
        match &self.mode {
            Mode::Enabled(instrumentor) => Some(&instrumentor.identity),
            Mode::Disabled(_) => None,
        }
    }

    /// Call before the request handler runs
    pub fn on_start(&self, request: RequestInfo) -> RequestContext {
        match &self.mode {
            Mode::Enabled(instrumentor) => instrumentor.start(request),
            Mode::Disabled(_) => RequestContext::unstarted(request),
        }
    }

    /// Call after the request handler produced a response with `status`
    pub fn on_complete(&self, ctx: RequestContext, status: u16) {
        if let Mode::Enabled(instrumentor) = &self.mode {
            instrumentor.complete(ctx, status)
        }
    }
}

#[derive(Debug)]
struct Instrumentor {
    registry: Arc<Registry>,
    identity: ApplicationTags,
    tags: ScopeTags,
    tracer: Option<Arc<dyn RequestTracer>>,
    component: String,
    module_key: String,
    func_key: String,
    completion_rollup: CompletionRollup,
}

impl Instrumentor {
    fn start(&self, request: RequestInfo) -> RequestContext {
        let start = Instant::now();
        let cpu_start = process_cpu_time();

        self.adjust_inflight(&request, 1.0);

        let span = self.tracer.as_ref().map(|tracer| tracer.start_span(&request));

        RequestContext {
            request,
            start: Some(start),
            cpu_start,
            span,
        }
    }

    fn complete(&self, ctx: RequestContext, status: u16) {
        let RequestContext {
            request,
            start,
            cpu_start,
            span,
        } = ctx;
        let is_error = is_error_status(status);

        if let Some(mut span) = span {
            self.finish_span(span.as_mut(), &request, status, is_error);
            span.finish();
        }

        if start.is_some() {
            self.adjust_inflight(&request, -1.0);
        }

        let route = request.route();
        let response_name = request.response_metric_name(status);
        let full = self.tags.attributes(AggregationScope::PerRequest, route);

        self.registry
            .counter(format!("{response_name}.cumulative"), full.clone())
            .inc(1);
        self.delta_rollups(&response_name, route);

        if is_error {
            self.registry
                .counter(format!("{}.errors", request.request_metric_name()), full.clone())
                .inc(1);
            self.registry.counter(RESPONSE_ERRORS, full.clone()).inc(1);
            self.registry
                .counter(
                    format!("{RESPONSE_ERRORS}.aggregated_per_source"),
                    self.tags.attributes(AggregationScope::PerSource, None),
                )
                .inc(1);
            self.delta_rollups(RESPONSE_ERRORS, None);
        }

        self.completed_rollups();

        if let Some(start) = start {
            let latency_ms = start.elapsed().as_secs_f64() * 1_000.0;
            self.registry
                .histogram(format!("{response_name}.latency"), full.clone())
                .record(latency_ms);

            if let (Some(cpu_start), Some(cpu_end)) = (cpu_start, process_cpu_time()) {
                let cpu_ns = cpu_end.saturating_sub(cpu_start).as_nanos() as f64;
                self.registry
                    .histogram(format!("{response_name}.cpu_ns"), full)
                    .record(cpu_ns);
            }
        }
    }

    /// Both inflight gauges: per handler and per process
    fn adjust_inflight(&self, request: &RequestInfo, delta: f64) {
        self.registry
            .gauge(
                format!("{}.inflight", request.request_metric_name()),
                self.tags.route_attributes(request.route()),
            )
            .add(delta);
        self.registry
            .gauge(
                TOTAL_INFLIGHT,
                self.tags.attributes(AggregationScope::PerSource, None),
            )
            .add(delta);
    }

    /// `<prefix>.aggregated_per_{shard,service,cluster,application}` delta counters
    fn delta_rollups(&self, prefix: &str, route: Option<&RouteMatch>) {
        if self.tags.has_shard() {
            self.delta(prefix, AggregationScope::PerShard, route);
        }
        self.delta(prefix, AggregationScope::PerService, route);
        if self.tags.has_cluster() {
            self.delta(prefix, AggregationScope::PerCluster, route);
        }
        self.delta(prefix, AggregationScope::PerApplication, route);
    }

    fn completed_rollups(&self) {
        self.cumulative(RESPONSE_COMPLETED, AggregationScope::PerSource);
        match self.completion_rollup {
            CompletionRollup::Faithful => {
                if self.tags.has_shard() {
                    self.delta(RESPONSE_COMPLETED, AggregationScope::PerShard, None);
                    self.cumulative(RESPONSE_COMPLETED, AggregationScope::PerService);
                }
                if self.tags.has_cluster() {
                    self.delta(RESPONSE_COMPLETED, AggregationScope::PerCluster, None);
                    self.cumulative(RESPONSE_COMPLETED, AggregationScope::PerApplication);
                }
            }
            CompletionRollup::Independent => self.delta_rollups(RESPONSE_COMPLETED, None),
        }
    }

    fn delta(&self, prefix: &str, scope: AggregationScope, route: Option<&RouteMatch>) {
        self.registry
            .delta_counter(
                format!("{prefix}.{}", scope.suffix()),
                self.tags.attributes(scope, route),
            )
            .inc(1);
    }

    fn cumulative(&self, prefix: &str, scope: AggregationScope) {
        self.registry
            .counter(
                format!("{prefix}.{}", scope.suffix()),
                self.tags.attributes(scope, None),
            )
            .inc(1);
    }

    fn finish_span(
        &self,
        span: &mut dyn ActiveSpan,
        request: &RequestInfo,
        status: u16,
        is_error: bool,
    ) {
        span.set_tag("http.status_code", &status.to_string());
        if is_error {
            span.set_tag("error", "true");
        }
        span.set_tag("span.kind", "server");
        if let Some(route) = request.route() {
            span.set_tag(&self.module_key, route.module());
            span.set_tag(&self.func_key, route.func());
        }
        span.set_tag(COMPONENT_TAG_KEY, &self.component);
        span.set_tag("http.method", request.method().as_str());
        span.set_tag("http.url", request.url());
    }
}
