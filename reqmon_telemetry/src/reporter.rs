use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use reqmon_metric::{MetricKey, Observation, Registry};
use reqmon_tags::{APPLICATION_TAG_KEY, ApplicationTags};
use tracing::{debug, info, warn};

use crate::sample::now_millis;
use crate::{BackgroundTasks, MetricSample, MetricSink, Result, SampleKind};

/// Prefix of every sample name flushed by a [`PeriodicReporter`]
pub const DEFAULT_METRIC_PREFIX: &str = "http.server";

pub const DEFAULT_REPORTING_INTERVAL: Duration = Duration::from_secs(5);

/// Capabilities the request instrumentation needs from its reporter
///
/// The reporter periodically ships the contents of a [`Registry`] to its sink. Other
/// background services, such as the heartbeat, share the same sink and source.
pub trait ReporterHandle: std::fmt::Debug + Send + Sync + 'static {
    /// Spawn the reporting loop for `registry` on `tasks`
    fn start(&self, registry: Arc<Registry>, tasks: &BackgroundTasks);

    fn sink(&self) -> Arc<dyn MetricSink>;

    /// Host name attached to every sample
    fn source(&self) -> &str;
}

/// Flushes a [`Registry`] into a [`MetricSink`] on a fixed interval
///
/// Each sample is named `<prefix>.<metric name>` and tagged with the application name and
/// custom tags of the identity it was created with. Metric attributes win over these
/// global tags when a key is present in both.
///
/// A flush that the sink rejects is folded back into the registry, so delta counts and
/// histogram samples are delivered on the next tick instead of being lost.
#[derive(Debug, Clone)]
pub struct PeriodicReporter {
    sink: Arc<dyn MetricSink>,
    prefix: Arc<str>,
    source: Arc<str>,
    interval: Duration,
    global_tags: BTreeMap<String, String>,
}

impl PeriodicReporter {
    pub fn new(
        sink: Arc<dyn MetricSink>,
        identity: &ApplicationTags,
        source: impl Into<Arc<str>>,
    ) -> Self {
        let mut global_tags: BTreeMap<String, String> = identity
            .custom_tags()
            .iter()
            .map(|tag| (tag.key.clone(), tag.value.clone()))
            .collect();
        global_tags.insert(
            APPLICATION_TAG_KEY.to_string(),
            identity.application().to_string(),
        );

        Self {
            sink,
            prefix: Arc::from(DEFAULT_METRIC_PREFIX),
            source: source.into(),
            interval: DEFAULT_REPORTING_INTERVAL,
            global_tags,
        }
    }

    /// Use `prefix` instead of [`DEFAULT_METRIC_PREFIX`], an empty prefix leaves names as is
    pub fn with_prefix(self, prefix: impl Into<Arc<str>>) -> Self {
        Self {
            prefix: prefix.into(),
            ..self
        }
    }

    pub fn with_interval(self, interval: Duration) -> Self {
        Self { interval, ..self }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Drain `registry` and deliver its contents to the sink, returning the number of
    /// samples sent
    ///
    /// On failure the drained values are restored into `registry` before the error is
    /// returned.
    pub async fn flush(&self, registry: &Registry) -> Result<usize> {
        let flushed = registry.flush();
        if flushed.is_empty() {
            return Ok(0);
        }

        let samples = self.samples(&flushed, now_millis());
        if let Err(e) = self.sink.send(&samples).await {
            registry.restore(&flushed);
            return Err(e);
        }
        Ok(samples.len())
    }

    fn samples(&self, flushed: &[(MetricKey, Observation)], timestamp_ms: u64) -> Vec<MetricSample> {
        let mut samples = Vec::with_capacity(flushed.len());
        for (key, observation) in flushed {
            let name = self.sample_name(key.name());
            let mut tags = self.global_tags.clone();
            tags.extend(
                key.attributes()
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string())),
            );
            let sample = |name: String, value: f64, kind: SampleKind| MetricSample {
                name,
                tags: tags.clone(),
                value,
                kind,
                source: self.source.to_string(),
                timestamp_ms,
            };

            match observation {
                Observation::Gauge(v) => samples.push(sample(name, *v, SampleKind::Gauge)),
                Observation::CumulativeCounter(v) => {
                    samples.push(sample(name, *v as f64, SampleKind::CumulativeCounter))
                }
                Observation::DeltaCounter(v) => {
                    samples.push(sample(name, *v as f64, SampleKind::DeltaCounter))
                }
                Observation::Histogram(summary) => {
                    let mut stats = vec![
                        ("count", summary.count as f64),
                        ("sum", summary.sum),
                        ("min", summary.min),
                        ("max", summary.max),
                    ];
                    if let Some(mean) = summary.mean() {
                        stats.push(("mean", mean));
                    }
                    for (stat, value) in stats {
                        samples.push(sample(
                            format!("{name}.{stat}"),
                            value,
                            SampleKind::HistogramSummary,
                        ));
                    }
                }
            }
        }
        samples
    }

    fn sample_name(&self, name: &str) -> String {
        if self.prefix.is_empty() {
            name.to_string()
        } else {
            format!("{}.{name}", self.prefix)
        }
    }

    async fn report(&self, registry: &Registry) {
        match self.flush(registry).await {
            Ok(samples) => debug!(samples, "flushed metrics"),
            // Delivery failures are not fatal, the next tick retries
            Err(e) => warn!(error = %e, "cannot deliver metrics"),
        }
    }

    async fn run(self, registry: Arc<Registry>, tasks: BackgroundTasks) {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // the first tick completes immediately
        interval.tick().await;

        loop {
            tokio::select! {
                _ = tasks.cancelled() => {
                    self.report(&registry).await;
                    info!("metrics reporter stopped");
                    return;
                }
                _ = interval.tick() => self.report(&registry).await,
            }
        }
    }
}

impl ReporterHandle for PeriodicReporter {
    fn start(&self, registry: Arc<Registry>, tasks: &BackgroundTasks) {
        info!(
            interval = ?self.interval,
            prefix = %self.prefix,
            source = %self.source,
            "starting metrics reporter"
        );
        tasks.spawn(self.clone().run(registry, tasks.clone()));
    }

    fn sink(&self) -> Arc<dyn MetricSink> {
        Arc::clone(&self.sink)
    }

    fn source(&self) -> &str {
        &self.source
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use reqmon_metric::Attributes;
    use reqmon_tags::CustomTag;

    use super::*;
    use crate::{MemorySink, SinkError};

    fn identity() -> ApplicationTags {
        ApplicationTags::new("beachshirts", "styling")
            .unwrap()
            .with_custom_tags(["env=prod".parse::<CustomTag>().unwrap()])
    }

    /// Rejects every batch while `failing` is set, otherwise forwards to a [`MemorySink`]
    #[derive(Debug, Default)]
    struct FlakySink {
        failing: AtomicBool,
        inner: MemorySink,
    }

    #[async_trait]
    impl MetricSink for FlakySink {
        async fn send(&self, samples: &[MetricSample]) -> Result<()> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(SinkError::Unavailable("connection refused".to_string()));
            }
            self.inner.send(samples).await
        }
    }

    #[tokio::test]
    async fn test_flush_samples() {
        let registry = Registry::new();
        registry
            .counter("response.make.GET.200.cumulative", [("service", "styling")])
            .inc(2);
        registry
            .delta_counter("response.completed.aggregated_per_source", [("env", "test")])
            .inc(1);
        let latency = registry.histogram("response.make.GET.200.latency", Attributes::default());
        latency.record(10.0);
        latency.record(30.0);

        let sink = Arc::new(MemorySink::new());
        let reporter = PeriodicReporter::new(
            Arc::clone(&sink) as Arc<dyn MetricSink>,
            &identity(),
            "host-1",
        );
        assert_eq!(reporter.flush(&registry).await.unwrap(), 7);

        let cumulative = sink.samples_named("http.server.response.make.GET.200.cumulative");
        assert_eq!(cumulative.len(), 1);
        assert_eq!(cumulative[0].value, 2.0);
        assert_eq!(cumulative[0].kind, SampleKind::CumulativeCounter);
        assert_eq!(cumulative[0].source, "host-1");
        assert_eq!(
            cumulative[0].tags,
            BTreeMap::from([
                ("application".to_string(), "beachshirts".to_string()),
                ("env".to_string(), "prod".to_string()),
                ("service".to_string(), "styling".to_string()),
            ])
        );

        // metric attributes win over global tags
        let delta = sink.samples_named("http.server.response.completed.aggregated_per_source");
        assert_eq!(delta[0].tag("env"), Some("test"));
        assert_eq!(delta[0].kind, SampleKind::DeltaCounter);

        let stat = |stat: &str| {
            let name = format!("http.server.response.make.GET.200.latency.{stat}");
            let samples = sink.samples_named(&name);
            assert_eq!(samples.len(), 1, "{name}");
            assert_eq!(samples[0].kind, SampleKind::HistogramSummary);
            samples[0].value
        };
        assert_eq!(stat("count"), 2.0);
        assert_eq!(stat("sum"), 40.0);
        assert_eq!(stat("min"), 10.0);
        assert_eq!(stat("max"), 30.0);
        assert_eq!(stat("mean"), 20.0);

        // drained values are not sent again
        sink.take_batches();
        assert_eq!(reporter.flush(&registry).await.unwrap(), 1);
        assert_eq!(sink.samples()[0].kind, SampleKind::CumulativeCounter);
    }

    #[tokio::test]
    async fn test_flush_empty_registry_sends_nothing() {
        let sink = Arc::new(MemorySink::new());
        let reporter =
            PeriodicReporter::new(Arc::clone(&sink) as Arc<dyn MetricSink>, &identity(), "h");
        assert_eq!(reporter.flush(&Registry::new()).await.unwrap(), 0);
        assert_eq!(sink.batch_count(), 0);
    }

    #[tokio::test]
    async fn test_prefix() {
        let registry = Registry::new();
        registry.counter("total", Attributes::default()).inc(1);
        let sink = Arc::new(MemorySink::new());

        let reporter =
            PeriodicReporter::new(Arc::clone(&sink) as Arc<dyn MetricSink>, &identity(), "h")
                .with_prefix("django.server");
        reporter.flush(&registry).await.unwrap();
        let reporter = reporter.with_prefix("");
        reporter.flush(&registry).await.unwrap();

        let names: Vec<_> = sink.samples().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["django.server.total", "total"]);
    }

    #[test_log::test(tokio::test)]
    async fn test_failed_flush_is_retried() {
        let registry = Registry::new();
        let delta = registry.delta_counter("delta", Attributes::default());
        delta.inc(3);

        let sink = Arc::new(FlakySink::default());
        sink.failing.store(true, Ordering::SeqCst);
        let reporter =
            PeriodicReporter::new(Arc::clone(&sink) as Arc<dyn MetricSink>, &identity(), "h");

        let err = reporter.flush(&registry).await.unwrap_err();
        assert!(matches!(err, SinkError::Unavailable(_)));
        assert_eq!(delta.fetch(), 3);

        delta.inc(2);
        sink.failing.store(false, Ordering::SeqCst);
        assert_eq!(reporter.flush(&registry).await.unwrap(), 1);
        let samples = sink.inner.samples_named("http.server.delta");
        assert_eq!(samples[0].value, 5.0);
        assert_eq!(delta.fetch(), 0);
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn test_reporter_loop() {
        let registry = Arc::new(Registry::new());
        let delta = registry.delta_counter("delta", Attributes::default());
        let sink = Arc::new(MemorySink::new());
        let tasks = BackgroundTasks::new();

        let reporter =
            PeriodicReporter::new(Arc::clone(&sink) as Arc<dyn MetricSink>, &identity(), "h")
                .with_interval(Duration::from_secs(5));
        reporter.start(Arc::clone(&registry), &tasks);

        delta.inc(1);
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(sink.batch_count(), 1);

        delta.inc(2);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(sink.batch_count(), 2);

        // a tick with nothing drained does not send
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(sink.batch_count(), 2);

        // shutdown delivers what is left
        delta.inc(4);
        tasks.shutdown().await;
        let values: Vec<_> = sink
            .samples_named("http.server.delta")
            .into_iter()
            .map(|s| s.value)
            .collect();
        assert_eq!(values, vec![1.0, 2.0, 4.0]);
    }
}
