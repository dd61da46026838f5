use crate::{Instrument, MetricKind, MetricObserver, Observation};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// An observation of a single f64 value
///
/// A gauge starts out unset (NaN) and is not observed until it is first written. The
/// first [`F64Gauge::add`] treats the unset value as zero.
///
/// NOTE: If the same `F64Gauge` is [`set`](Self::set) from multiple locations, the
/// reported value will oscillate between those reported by the separate locations.
#[derive(Debug, Clone)]
pub struct F64Gauge {
    state: Arc<AtomicU64>,
}

impl Default for F64Gauge {
    fn default() -> Self {
        Self {
            state: Arc::new(AtomicU64::new(f64::NAN.to_bits())),
        }
    }
}

impl F64Gauge {
    /// Sets the value of this F64Gauge
    pub fn set(&self, value: f64) {
        self.state.store(value.to_bits(), Ordering::Relaxed);
    }

    /// Fetches the value of this F64Gauge, NaN if it was never written
    pub fn fetch(&self) -> f64 {
        f64::from_bits(self.state.load(Ordering::Relaxed))
    }

    pub fn is_set(&self) -> bool {
        !self.fetch().is_nan()
    }

    /// Atomically add `delta` to the current value
    ///
    /// Concurrent increments and decrements never lose updates.
    pub fn add(&self, delta: f64) {
        // the closure never returns None, so this cannot fail
        let _ = self
            .state
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |bits| {
                let current = f64::from_bits(bits);
                let current = if current.is_nan() { 0.0 } else { current };
                Some((current + delta).to_bits())
            });
    }

    pub fn inc(&self) {
        self.add(1.0)
    }

    pub fn dec(&self) {
        self.add(-1.0)
    }
}

impl MetricObserver for F64Gauge {
    fn kind() -> MetricKind {
        MetricKind::Gauge
    }

    fn into_instrument(self) -> Instrument {
        Instrument::Gauge(self)
    }

    fn from_instrument(instrument: &Instrument) -> Option<Self> {
        match instrument {
            Instrument::Gauge(gauge) => Some(gauge.clone()),
            _ => None,
        }
    }

    fn observe(&self) -> Option<Observation> {
        self.is_set().then(|| Observation::Gauge(self.fetch()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gauge() {
        let gauge = F64Gauge::default();
        assert!(!gauge.is_set());
        assert_eq!(gauge.observe(), None);

        gauge.set(345.0);
        assert_eq!(gauge.observe(), Some(Observation::Gauge(345.0)));

        gauge.set(23.0);
        assert_eq!(gauge.observe(), Some(Observation::Gauge(23.0)));

        let r2 = gauge.clone();

        r2.set(34.0);
        assert_eq!(gauge.observe(), Some(Observation::Gauge(34.0)));

        std::mem::drop(r2);

        assert_eq!(gauge.observe(), Some(Observation::Gauge(34.0)));
    }

    #[test]
    fn test_add_from_unset() {
        let gauge = F64Gauge::default();
        gauge.inc();
        assert_eq!(gauge.fetch(), 1.0);
        gauge.dec();
        gauge.dec();
        assert_eq!(gauge.fetch(), -1.0);
        gauge.add(1.0);
        assert_eq!(gauge.observe(), Some(Observation::Gauge(0.0)));
    }

    #[test]
    fn test_concurrent_inc_dec_nets_zero() {
        let gauge = F64Gauge::default();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let gauge = gauge.clone();
                std::thread::spawn(move || {
                    for _ in 0..1_000 {
                        gauge.inc();
                        gauge.dec();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(gauge.fetch(), 0.0);
    }
}
