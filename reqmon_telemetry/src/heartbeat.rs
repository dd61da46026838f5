use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use reqmon_tags::{ApplicationTags, COMPONENT_TAG_KEY};
use tracing::{debug, info, warn};

use crate::sample::now_millis;
use crate::{BackgroundTasks, MetricSample, MetricSink, Result, SampleKind};

pub const HEARTBEAT_METRIC: &str = "~component.heartbeat";

pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Emits a liveness sample for this process on a fixed interval, independent of traffic
///
/// The sample carries the full identity list (absent cluster or shard reported as
/// [`NULL_TAG_VAL`](reqmon_tags::NULL_TAG_VAL)), the custom tags and the component name.
#[derive(Debug, Clone)]
pub struct HeartbeatService {
    sink: Arc<dyn MetricSink>,
    tags: BTreeMap<String, String>,
    source: Arc<str>,
    interval: Duration,
}

impl HeartbeatService {
    pub fn new(
        sink: Arc<dyn MetricSink>,
        identity: &ApplicationTags,
        component: &str,
        source: impl Into<Arc<str>>,
    ) -> Self {
        let mut tags: BTreeMap<String, String> = identity
            .as_list()
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        tags.extend(
            identity
                .custom_tags()
                .iter()
                .map(|tag| (tag.key.clone(), tag.value.clone())),
        );
        tags.insert(COMPONENT_TAG_KEY.to_string(), component.to_string());

        Self {
            sink,
            tags,
            source: source.into(),
            interval: DEFAULT_HEARTBEAT_INTERVAL,
        }
    }

    pub fn with_interval(self, interval: Duration) -> Self {
        Self { interval, ..self }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    fn sample(&self) -> MetricSample {
        MetricSample {
            name: HEARTBEAT_METRIC.to_string(),
            tags: self.tags.clone(),
            value: 1.0,
            kind: SampleKind::Gauge,
            source: self.source.to_string(),
            timestamp_ms: now_millis(),
        }
    }

    /// Send a single heartbeat
    pub async fn beat(&self) -> Result<()> {
        self.sink.send(&[self.sample()]).await
    }

    /// Spawn the heartbeat loop on `tasks`, the first beat is sent immediately
    pub fn start(&self, tasks: &BackgroundTasks) {
        info!(interval = ?self.interval, "starting heartbeat");
        let heartbeat = self.clone();
        let shutdown = tasks.clone();
        tasks.spawn(async move {
            let mut interval = tokio::time::interval(heartbeat.interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        debug!("heartbeat stopped");
                        return;
                    }
                    _ = interval.tick() => {
                        if let Err(e) = heartbeat.beat().await {
                            warn!(error = %e, "cannot send heartbeat");
                        }
                    }
                }
            }
        });
    }
}
