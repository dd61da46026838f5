use crate::{Instrument, MetricKind, MetricObserver, Observation};
use parking_lot::Mutex;
use std::sync::Arc;

/// Summary statistics of the values recorded into a [`Histogram`] over one flush interval
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct HistogramSummary {
    pub count: u64,
    pub sum: f64,
    pub min: f64,
    pub max: f64,
}

impl HistogramSummary {
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Arithmetic mean of the recorded values, `None` when nothing was recorded
    pub fn mean(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }

    fn record(&mut self, value: f64) {
        if self.count == 0 {
            self.min = value;
            self.max = value;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }
        self.count = self.count.wrapping_add(1);
        self.sum += value;
    }

    fn merge(&mut self, other: &Self) {
        if other.is_empty() {
            return;
        }
        if self.is_empty() {
            *self = *other;
            return;
        }
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
        self.count = self.count.wrapping_add(other.count);
        self.sum += other.sum;
    }
}

/// A `Histogram` accumulates the distribution of observed values between flushes
///
/// Values are summarised rather than bucketed: a flush reports the count, sum, min,
/// max and mean of everything recorded since the previous flush.
#[derive(Debug, Clone, Default)]
pub struct Histogram {
    shared: Arc<Mutex<HistogramSummary>>,
}

impl Histogram {
    pub fn record(&self, value: f64) {
        if value.is_nan() {
            return;
        }
        self.shared.lock().record(value);
    }

    pub fn fetch(&self) -> HistogramSummary {
        *self.shared.lock()
    }

    /// Drain the summary accumulated since the last call
    pub fn take(&self) -> HistogramSummary {
        std::mem::take(&mut *self.shared.lock())
    }

    /// Fold a previously drained summary back in
    pub fn merge(&self, summary: &HistogramSummary) {
        self.shared.lock().merge(summary);
    }

    pub fn reset(&self) {
        *self.shared.lock() = HistogramSummary::default();
    }
}

impl MetricObserver for Histogram {
    fn kind() -> MetricKind {
        MetricKind::Histogram
    }

    fn into_instrument(self) -> Instrument {
        Instrument::Histogram(self)
    }

    fn from_instrument(instrument: &Instrument) -> Option<Self> {
        match instrument {
            Instrument::Histogram(histogram) => Some(histogram.clone()),
            _ => None,
        }
    }

    fn observe(&self) -> Option<Observation> {
        Some(Observation::Histogram(self.fetch()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_histogram() {
        let histogram = Histogram::default();
        assert_eq!(histogram.fetch(), HistogramSummary::default());
        assert_eq!(histogram.fetch().mean(), None);

        histogram.record(30.0);
        histogram.record(50.0);
        histogram.record(10.0);

        let summary = histogram.fetch();
        assert_eq!(summary.count, 3);
        assert_eq!(summary.sum, 90.0);
        assert_eq!(summary.min, 10.0);
        assert_eq!(summary.max, 50.0);
        assert_eq!(summary.mean(), Some(30.0));

        // NaN samples are ignored
        histogram.record(f64::NAN);
        assert_eq!(histogram.fetch().count, 3);

        histogram.reset();
        assert!(histogram.fetch().is_empty());
    }

    #[test]
    fn test_take_and_merge() {
        let histogram = Histogram::default();
        histogram.record(4.0);
        histogram.record(8.0);

        let drained = histogram.take();
        assert_eq!(drained.count, 2);
        assert!(histogram.fetch().is_empty());

        histogram.record(1.0);
        histogram.merge(&drained);

        let summary = histogram.fetch();
        assert_eq!(summary.count, 3);
        assert_eq!(summary.sum, 13.0);
        assert_eq!(summary.min, 1.0);
        assert_eq!(summary.max, 8.0);

        // merging an empty summary is a no-op
        histogram.merge(&HistogramSummary::default());
        assert_eq!(histogram.fetch(), summary);
    }
}
