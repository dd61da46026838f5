use std::io::Write;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::info;

use crate::{MetricSample, Result};

/// Destination for flushed samples
///
/// Implementations own the wire format and transport. A failed `send` is retried by the
/// caller on its next tick.
#[async_trait]
pub trait MetricSink: std::fmt::Debug + Send + Sync + 'static {
    async fn send(&self, samples: &[MetricSample]) -> Result<()>;
}

/// Emits every sample as a structured `info` log event
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl LogSink {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl MetricSink for LogSink {
    async fn send(&self, samples: &[MetricSample]) -> Result<()> {
        for sample in samples {
            info!(
                name = %sample.name,
                kind = ?sample.kind,
                value = sample.value,
                source = %sample.source,
                tags = ?sample.tags,
                "metric sample"
            );
        }
        Ok(())
    }
}

/// Writes one JSON object per sample, newline delimited
#[derive(Debug)]
pub struct JsonLinesSink<W> {
    writer: Mutex<W>,
}

impl<W: Write + Send + 'static> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

#[async_trait]
impl<W> MetricSink for JsonLinesSink<W>
where
    W: Write + std::fmt::Debug + Send + 'static,
{
    async fn send(&self, samples: &[MetricSample]) -> Result<()> {
        let mut buf = Vec::with_capacity(samples.len() * 128);
        for sample in samples {
            serde_json::to_writer(&mut buf, sample)?;
            buf.push(b'\n');
        }
        let mut writer = self.writer.lock();
        writer.write_all(&buf)?;
        writer.flush()?;
        Ok(())
    }
}

/// Keeps every batch it receives in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    batches: Mutex<Vec<Vec<MetricSample>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every sample received so far, in arrival order
    pub fn samples(&self) -> Vec<MetricSample> {
        self.batches.lock().iter().flatten().cloned().collect()
    }

    /// Samples received so far with the given name
    pub fn samples_named(&self, name: &str) -> Vec<MetricSample> {
        self.batches
            .lock()
            .iter()
            .flatten()
            .filter(|s| s.name == name)
            .cloned()
            .collect()
    }

    pub fn batch_count(&self) -> usize {
        self.batches.lock().len()
    }

    /// Remove and return every batch received so far
    pub fn take_batches(&self) -> Vec<Vec<MetricSample>> {
        std::mem::take(&mut *self.batches.lock())
    }
}

#[async_trait]
impl MetricSink for MemorySink {
    async fn send(&self, samples: &[MetricSample]) -> Result<()> {
        self.batches.lock().push(samples.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SampleKind;

    fn sample(name: &str, value: f64) -> MetricSample {
        MetricSample {
            name: name.to_string(),
            tags: Default::default(),
            value,
            kind: SampleKind::Gauge,
            source: "test".to_string(),
            timestamp_ms: 0,
        }
    }

    #[tokio::test]
    async fn test_json_lines_sink() {
        let sink = JsonLinesSink::new(Vec::new());
        sink.send(&[sample("a", 1.0), sample("b", 2.5)])
            .await
            .unwrap();

        let written = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<_> = written.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["name"], "a");
        assert_eq!(first["kind"], "gauge");
        let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second["value"], 2.5);
    }

    #[tokio::test]
    async fn test_memory_sink() {
        let sink = MemorySink::new();
        sink.send(&[sample("a", 1.0)]).await.unwrap();
        sink.send(&[sample("a", 2.0), sample("b", 3.0)])
            .await
            .unwrap();

        assert_eq!(sink.batch_count(), 2);
        assert_eq!(sink.samples().len(), 3);
        assert_eq!(sink.samples_named("a").len(), 2);

        let batches = sink.take_batches();
        assert_eq!(batches.len(), 2);
        assert_eq!(sink.batch_count(), 0);
    }

    #[test_log::test(tokio::test)]
    async fn test_log_sink() {
        LogSink::new().send(&[sample("a", 1.0)]).await.unwrap();
    }
}
