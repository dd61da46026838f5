//! Implementation of command line option for running the engine against synthetic traffic

use std::future::Future;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use http::Method;
use rand::{Rng, SeedableRng, rngs::StdRng, seq::SliceRandom};
use reqmon_clap_blocks::{identity::IdentityConfig, reporting::ReportingConfig};
use reqmon_instrument::{
    RequestInfo, RequestMetrics, RequestTracer, RouteMatch, TracingSpans, sanitize_entity_name,
};
use reqmon_telemetry::{
    BackgroundTasks, JsonLinesSink, LogSink, MetricSink, PeriodicReporter,
};
use tokio::task::JoinSet;
use tracing::{info, warn};

#[derive(Debug, thiserror::Error)]
pub(crate) enum Error {
    #[error("at least one route is required")]
    NoRoutes,

    #[error("invalid error ratio {0}, expected a value between 0 and 1")]
    InvalidErrorRatio(f64),

    #[error("rate {0} is too high, at most one request per nanosecond is supported")]
    InvalidRate(u32),
}

pub(crate) type Result<T, E = Error> = std::result::Result<T, E>;

/// Where flushed samples are written
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub(crate) enum SinkType {
    /// One structured log event per sample
    Log,
    /// One JSON object per sample on stdout
    Json,
}

#[derive(Debug, clap::Parser)]
pub(crate) struct Config {
    #[clap(flatten)]
    identity: IdentityConfig,

    #[clap(flatten)]
    reporting: ReportingConfig,

    /// Destination of the flushed samples.
    #[clap(
        long = "sink",
        env = "REQMON_SINK",
        default_value = "log",
        value_enum,
        action
    )]
    sink: SinkType,

    /// Route templates requests are spread across.
    #[clap(
        long = "routes",
        env = "REQMON_ROUTES",
        default_values = ["make", "ship", "styles/{style_id}"],
        num_args = 1..,
        value_delimiter = ',',
        action
    )]
    routes: Vec<String>,

    /// Requests per second.
    #[clap(long = "rate", default_value = "20", action)]
    rate: NonZeroU32,

    /// Share of requests answered with an error status, between 0 and 1.
    #[clap(long = "error-ratio", default_value = "0.05", action)]
    error_ratio: f64,

    /// Stop after this long. Runs until SIGINT or SIGTERM if not given.
    #[clap(long = "duration", action)]
    duration: Option<humantime::Duration>,
}

pub(crate) async fn command(config: Config) -> Result<()> {
    let traffic = Traffic::new(
        &config.routes,
        config.rate,
        config.error_ratio,
        &config.reporting.source,
    )?;

    let sink: Arc<dyn MetricSink> = match config.sink {
        SinkType::Log => Arc::new(LogSink::new()),
        SinkType::Json => Arc::new(JsonLinesSink::new(std::io::stdout())),
    };

    let tasks = BackgroundTasks::new();
    let identity = config.identity.application_tags();
    let mut builder = RequestMetrics::builder()
        .component(config.reporting.component.as_str())
        .heartbeat_interval(*config.reporting.heartbeat_interval)
        .tracer(Arc::new(TracingSpans::new()) as Arc<dyn RequestTracer>)
        .trace_all(config.reporting.trace_all);
    if let Ok(identity) = &identity {
        let reporter = PeriodicReporter::new(sink, identity, config.reporting.source.as_str())
            .with_prefix(config.reporting.metric_prefix.as_str())
            .with_interval(*config.reporting.reporting_interval);
        builder = builder.reporter(Arc::new(reporter));
    }
    let metrics = Arc::new(builder.identity_result(identity).start(&tasks));

    let duration = config.duration.map(Into::into);
    let stop = async move {
        match duration {
            Some(duration) => {
                tokio::select! {
                    _ = tokio::time::sleep(duration) => info!(?duration, "duration elapsed"),
                    _ = wait_for_signal() => {}
                }
            }
            None => wait_for_signal().await,
        }
    };

    info!(
        rate = config.rate.get(),
        routes = ?config.routes,
        enabled = metrics.is_enabled(),
        "driving synthetic requests"
    );
    let sent = drive(Arc::clone(&metrics), traffic, stop).await;
    info!(sent, "traffic stopped, flushing");

    tasks.shutdown().await;
    Ok(())
}

/// Shape of the synthetic request stream
#[derive(Debug)]
struct Traffic {
    routes: Vec<RouteMatch>,
    interval: Duration,
    error_ratio: f64,
    host: String,
}

impl Traffic {
    fn new(routes: &[String], rate: NonZeroU32, error_ratio: f64, host: &str) -> Result<Self> {
        if routes.is_empty() {
            return Err(Error::NoRoutes);
        }
        if !(0.0..=1.0).contains(&error_ratio) {
            return Err(Error::InvalidErrorRatio(error_ratio));
        }

        let interval = Duration::from_secs(1) / rate.get();
        if interval.is_zero() {
            return Err(Error::InvalidRate(rate.get()));
        }

        let routes = routes
            .iter()
            .map(|route| {
                let func = format!("handle_{}", sanitize_entity_name(route).replace('.', "_"));
                RouteMatch::new(route.as_str(), "reqmon.synthetic", func)
            })
            .collect();

        Ok(Self {
            routes,
            interval,
            error_ratio,
            host: host.to_string(),
        })
    }

    /// A random request, its response status and how long handling it takes
    fn next_request(&self, rng: &mut StdRng) -> (RequestInfo, u16, Duration) {
        let route = self.routes.choose(rng).unwrap_or(&self.routes[0]);
        let method = if rng.gen_bool(0.8) {
            Method::GET
        } else {
            Method::POST
        };
        let path = route
            .view_name()
            .replace("{style_id}", &rng.gen_range(1..1000).to_string());
        let request = RequestInfo::new(method.clone(), format!("http://{}/{path}", self.host))
            .with_route(route.clone());

        let status = if rng.gen_bool(self.error_ratio) {
            *[404, 500, 503].choose(rng).unwrap_or(&500)
        } else if method == Method::POST {
            201
        } else {
            200
        };
        let latency = Duration::from_millis(rng.gen_range(1..=40));

        (request, status, latency)
    }
}

/// Feed requests through `metrics` until `stop` completes, then wait for the requests in
/// flight. Returns the number of requests sent.
async fn drive(
    metrics: Arc<RequestMetrics>,
    traffic: Traffic,
    stop: impl Future<Output = ()> + Send,
) -> usize {
    let mut rng = StdRng::from_entropy();
    let mut interval = tokio::time::interval(traffic.interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut requests = JoinSet::new();
    let mut sent = 0;
    tokio::pin!(stop);

    loop {
        tokio::select! {
            _ = &mut stop => break,
            _ = interval.tick() => {
                // reap finished requests
                while requests.try_join_next().is_some() {}

                let (request, status, latency) = traffic.next_request(&mut rng);
                let metrics = Arc::clone(&metrics);
                requests.spawn(async move {
                    let ctx = metrics.on_start(request);
                    tokio::time::sleep(latency).await;
                    metrics.on_complete(ctx, status);
                });
                sent += 1;
            }
        }
    }

    // let requests in flight complete so the inflight gauges settle
    while requests.join_next().await.is_some() {}
    sent
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let (mut term, mut int) = match (
        signal(SignalKind::terminate()),
        signal(SignalKind::interrupt()),
    ) {
        (Ok(term), Ok(int)) => (term, int),
        (Err(e), _) | (_, Err(e)) => {
            warn!(error = %e, "cannot register signal handlers");
            return std::future::pending().await;
        }
    };

    tokio::select! {
        _ = term.recv() => info!("Received SIGTERM"),
        _ = int.recv() => info!("Received SIGINT"),
    }
}

#[cfg(windows)]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("Received SIGINT");
}

#[cfg(test)]
mod tests {
    use clap::Parser;
    use reqmon_tags::ApplicationTags;
    use reqmon_telemetry::MemorySink;

    use super::*;

    fn traffic(error_ratio: f64) -> Traffic {
        Traffic::new(
            &["make".to_string(), "styles/{style_id}".to_string()],
            NonZeroU32::new(200).unwrap(),
            error_ratio,
            "localhost",
        )
        .unwrap()
    }

    #[test]
    fn test_config() {
        let config = Config::try_parse_from([
            "run",
            "--application",
            "beachshirts",
            "--service",
            "styling",
            "--routes",
            "make,ship",
            "--duration",
            "10s",
        ])
        .unwrap();
        assert_eq!(config.routes, vec!["make", "ship"]);
        assert_eq!(config.sink, SinkType::Log);
        assert_eq!(config.rate.get(), 20);
        assert_eq!(
            config.duration.map(Duration::from),
            Some(Duration::from_secs(10))
        );
    }

    #[test]
    fn test_invalid_traffic() {
        let rate = NonZeroU32::new(1).unwrap();
        assert!(matches!(
            Traffic::new(&[], rate, 0.0, "h"),
            Err(Error::NoRoutes)
        ));
        assert!(matches!(
            Traffic::new(&["make".to_string()], rate, 1.5, "h"),
            Err(Error::InvalidErrorRatio(_))
        ));
        assert!(matches!(
            Traffic::new(&["make".to_string()], NonZeroU32::MAX, 0.0, "h"),
            Err(Error::InvalidRate(u32::MAX))
        ));

        let fastest = Traffic::new(
            &["make".to_string()],
            NonZeroU32::new(1_000_000_000).unwrap(),
            0.0,
            "h",
        )
        .unwrap();
        assert_eq!(fastest.interval, Duration::from_nanos(1));
    }

    #[test]
    fn test_next_request() {
        let traffic = traffic(1.0);
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let (request, status, latency) = traffic.next_request(&mut rng);
            assert!([404, 500, 503].contains(&status));
            assert!(latency >= Duration::from_millis(1));
            assert!(request.url().starts_with("http://localhost/"));
            assert!(!request.url().contains('{'));
            let route = request.route().unwrap();
            assert_eq!(route.module(), "reqmon.synthetic");
            assert!(["handle_make", "handle_styles__style_id_"].contains(&route.func()));
        }
    }

    #[test_log::test(tokio::test)]
    async fn test_drive() {
        let sink = Arc::new(MemorySink::new());
        let identity = ApplicationTags::new("beachshirts", "styling").unwrap();
        let reporter = Arc::new(PeriodicReporter::new(
            Arc::clone(&sink) as Arc<dyn MetricSink>,
            &identity,
            "test",
        ));
        let tasks = BackgroundTasks::new();
        let metrics = Arc::new(
            RequestMetrics::builder()
                .identity(identity)
                .reporter(reporter)
                .start(&tasks),
        );

        let sent = drive(
            Arc::clone(&metrics),
            traffic(0.5),
            tokio::time::sleep(Duration::from_millis(100)),
        )
        .await;
        assert!(sent > 0);
        tasks.shutdown().await;

        let completed = sink.samples_named("http.server.response.completed.aggregated_per_source");
        assert_eq!(completed.last().unwrap().value, sent as f64);

        let inflight = sink.samples_named("http.server.total_requests.inflight");
        assert_eq!(inflight.last().unwrap().value, 0.0);
    }
}
