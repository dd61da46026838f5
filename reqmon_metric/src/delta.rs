use crate::{Instrument, MetricKind, MetricObserver, Observation};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// A counter that reports only the change since the last flush
///
/// The backend rebuilds cumulative totals by summing the deltas, so nothing has to be
/// recovered from it after a restart. [`DeltaCounter::take`] hands out the accumulated
/// value and resets it in a single atomic step, so increments racing with a flush are
/// carried into the next one rather than lost.
#[derive(Debug, Clone, Default)]
pub struct DeltaCounter {
    state: Arc<AtomicU64>,
}

impl DeltaCounter {
    pub fn inc(&self, count: u64) {
        self.state.fetch_add(count, Ordering::Relaxed);
    }

    /// The value accumulated since the last [`take`](Self::take), without resetting it
    pub fn fetch(&self) -> u64 {
        self.state.load(Ordering::Relaxed)
    }

    /// Drain the accumulated value
    pub fn take(&self) -> u64 {
        self.state.swap(0, Ordering::Relaxed)
    }

    /// Give back a value previously drained with [`take`](Self::take), e.g. after a
    /// failed delivery
    pub fn restore(&self, count: u64) {
        self.inc(count)
    }
}

impl MetricObserver for DeltaCounter {
    fn kind() -> MetricKind {
        MetricKind::DeltaCounter
    }

    fn into_instrument(self) -> Instrument {
        Instrument::DeltaCounter(self)
    }

    fn from_instrument(instrument: &Instrument) -> Option<Self> {
        match instrument {
            Instrument::DeltaCounter(counter) => Some(counter.clone()),
            _ => None,
        }
    }

    fn observe(&self) -> Option<Observation> {
        Some(Observation::DeltaCounter(self.fetch()))
    }
}
