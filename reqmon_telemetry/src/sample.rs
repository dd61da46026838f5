use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

/// How the backend should interpret a [`MetricSample`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SampleKind {
    Gauge,
    CumulativeCounter,
    DeltaCounter,
    HistogramSummary,
}

/// A named, tagged value handed to a [`MetricSink`](crate::MetricSink)
///
/// The wire encoding is up to the sink.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricSample {
    pub name: String,
    pub tags: BTreeMap<String, String>,
    pub value: f64,
    pub kind: SampleKind,
    pub source: String,
    pub timestamp_ms: u64,
}

impl MetricSample {
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }
}

/// Milliseconds since the Unix epoch, zero if the clock is set before it
pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialize_sample() {
        let sample = MetricSample {
            name: "http.server.response.errors".to_string(),
            tags: [("service".to_string(), "styling".to_string())].into(),
            value: 1.0,
            kind: SampleKind::DeltaCounter,
            source: "host-1".to_string(),
            timestamp_ms: 1_700_000_000_000,
        };
        let json = serde_json::to_string(&sample).unwrap();
        assert_eq!(
            json,
            r#"{"name":"http.server.response.errors","tags":{"service":"styling"},"value":1.0,"kind":"delta-counter","source":"host-1","timestamp_ms":1700000000000}"#
        );
        assert_eq!(sample.tag("service"), Some("styling"));
        assert_eq!(sample.tag("cluster"), None);
    }
}
