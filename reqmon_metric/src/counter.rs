use crate::{Instrument, MetricKind, MetricObserver, Observation};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// A monotonic counter, reported as its absolute running total
#[derive(Debug, Clone, Default)]
pub struct U64Counter {
    state: Arc<AtomicU64>,
}

impl U64Counter {
    pub fn inc(&self, count: u64) {
        self.state.fetch_add(count, Ordering::Relaxed);
    }

    pub fn fetch(&self) -> u64 {
        self.state.load(Ordering::Relaxed)
    }
}

impl MetricObserver for U64Counter {
    fn kind() -> MetricKind {
        MetricKind::CumulativeCounter
    }

    fn into_instrument(self) -> Instrument {
        Instrument::CumulativeCounter(self)
    }

    fn from_instrument(instrument: &Instrument) -> Option<Self> {
        match instrument {
            Instrument::CumulativeCounter(counter) => Some(counter.clone()),
            _ => None,
        }
    }

    fn observe(&self) -> Option<Observation> {
        Some(Observation::CumulativeCounter(self.fetch()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter() {
        let counter = U64Counter::default();
        assert_eq!(counter.fetch(), 0);
        counter.inc(12);
        assert_eq!(counter.fetch(), 12);
        counter.inc(34);
        assert_eq!(counter.fetch(), 46);

        assert_eq!(counter.observe(), Some(Observation::CumulativeCounter(46)));

        // clones share state
        let other = counter.clone();
        other.inc(4);
        assert_eq!(counter.fetch(), 50);

        // Expect counter to wrap around
        counter.inc(u64::MAX);
        assert_eq!(counter.observe(), Some(Observation::CumulativeCounter(49)));
    }
}
