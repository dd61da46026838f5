//! A concurrent registry of tagged request metrics
//!
//! The [`Registry`] owns every instrument for the lifetime of the process. Callers obtain
//! an instrument with [`Registry::get_or_create`] (or one of the typed shorthands), keyed
//! by the instrument's [`MetricKind`], a name and a set of [`Attributes`]. Repeated lookups
//! with an identical key return handles to the same underlying instrument, so request
//! handlers never need to keep them around.
//!
//! Four kinds of instrument are supported:
//!
//! - [`F64Gauge`]: a current value, adjusted atomically
//! - [`U64Counter`]: a cumulative counter, reported as its running total
//! - [`DeltaCounter`]: a counter reported as the change since the previous flush
//! - [`Histogram`]: a distribution summarised and reset at each flush
//!
//! Reporting is either a read-only visit with [`Registry::report`], or a draining
//! [`Registry::flush`] which hands out delta counter values and histogram summaries and
//! resets them. A flush that could not be delivered can be folded back in with
//! [`Registry::restore`].
use dashmap::DashMap;
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt::Debug;

mod counter;
mod delta;
mod gauge;
mod histogram;
mod reporter;

pub use counter::U64Counter;
pub use delta::DeltaCounter;
pub use gauge::F64Gauge;
pub use histogram::{Histogram, HistogramSummary};
pub use reporter::{RawReporter, Reporter};

/// The kind of an instrument
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MetricKind {
    Gauge,
    CumulativeCounter,
    DeltaCounter,
    Histogram,
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Gauge => write!(f, "gauge"),
            Self::CumulativeCounter => write!(f, "cumulative-counter"),
            Self::DeltaCounter => write!(f, "delta-counter"),
            Self::Histogram => write!(f, "histogram"),
        }
    }
}

/// A point-in-time value read from an instrument
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Observation {
    Gauge(f64),
    CumulativeCounter(u64),
    DeltaCounter(u64),
    Histogram(HistogramSummary),
}

/// A set of key-value pairs, unique by key, that identifies one time series of a metric
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Attributes(BTreeMap<Cow<'static, str>, Cow<'static, str>>);

impl Attributes {
    /// Insert a key-value pair, replacing any existing value for `key`
    pub fn insert(
        &mut self,
        key: impl Into<Cow<'static, str>>,
        value: impl Into<Cow<'static, str>>,
    ) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(|v| v.as_ref())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_ref(), v.as_ref()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(|k| k.as_ref())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<const N: usize> From<[(&'static str, &'static str); N]> for Attributes {
    fn from(pairs: [(&'static str, &'static str); N]) -> Self {
        Self(
            pairs
                .into_iter()
                .map(|(k, v)| (Cow::Borrowed(k), Cow::Borrowed(v)))
                .collect(),
        )
    }
}

impl From<&[(&'static str, &'static str)]> for Attributes {
    fn from(pairs: &[(&'static str, &'static str)]) -> Self {
        Self(
            pairs
                .iter()
                .map(|&(k, v)| (Cow::Borrowed(k), Cow::Borrowed(v)))
                .collect(),
        )
    }
}

impl<K, V> FromIterator<(K, V)> for Attributes
where
    K: Into<Cow<'static, str>>,
    V: Into<Cow<'static, str>>,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Identity of a single instrument in the [`Registry`]
///
/// Two instruments with the same name but different attributes are distinct time series.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MetricKey {
    kind: MetricKind,
    name: Cow<'static, str>,
    attributes: Attributes,
}

impl MetricKey {
    pub fn new(
        kind: MetricKind,
        name: impl Into<Cow<'static, str>>,
        attributes: Attributes,
    ) -> Self {
        Self {
            kind,
            name: name.into(),
            attributes,
        }
    }

    pub fn kind(&self) -> MetricKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }
}

/// Storage for any instrument held by the [`Registry`]
#[derive(Debug, Clone)]
pub enum Instrument {
    Gauge(F64Gauge),
    CumulativeCounter(U64Counter),
    DeltaCounter(DeltaCounter),
    Histogram(Histogram),
}

impl Instrument {
    fn observe(&self) -> Option<Observation> {
        match self {
            Self::Gauge(g) => g.observe(),
            Self::CumulativeCounter(c) => c.observe(),
            Self::DeltaCounter(d) => d.observe(),
            Self::Histogram(h) => h.observe(),
        }
    }

    fn drain(&self) -> Option<Observation> {
        match self {
            Self::Gauge(g) => g.observe(),
            Self::CumulativeCounter(c) => c.observe(),
            Self::DeltaCounter(d) => match d.take() {
                0 => None,
                delta => Some(Observation::DeltaCounter(delta)),
            },
            Self::Histogram(h) => {
                let summary = h.take();
                (!summary.is_empty()).then_some(Observation::Histogram(summary))
            }
        }
    }

    fn restore(&self, observation: &Observation) {
        match (self, observation) {
            (Self::DeltaCounter(d), Observation::DeltaCounter(delta)) => d.restore(*delta),
            (Self::Histogram(h), Observation::Histogram(summary)) => h.merge(summary),
            // gauges and cumulative counters are read, not drained
            _ => {}
        }
    }
}

/// Types that can be stored in the [`Registry`]
pub trait MetricObserver: Clone + Default + Debug + Send + Sync + 'static {
    fn kind() -> MetricKind;

    fn into_instrument(self) -> Instrument;

    /// Returns a handle sharing state with `instrument` if it is of this type
    fn from_instrument(instrument: &Instrument) -> Option<Self>;

    /// Read the current value without resetting it, `None` if there is nothing to report
    fn observe(&self) -> Option<Observation>;
}

/// A concurrent key to instrument store
///
/// Lookup-or-create is safe from any number of threads: the first writer for a key
/// creates the instrument and every other caller receives a handle to it. Instruments
/// live for as long as the registry does, there is no deletion.
#[derive(Debug, Default)]
pub struct Registry {
    metrics: DashMap<MetricKey, Instrument>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the instrument identified by (`T::kind()`, `name`, `attributes`), creating it
    /// if it does not exist yet
    pub fn get_or_create<T: MetricObserver>(
        &self,
        name: impl Into<Cow<'static, str>>,
        attributes: impl Into<Attributes>,
    ) -> T {
        let key = MetricKey::new(T::kind(), name, attributes.into());
        // read lock first, the key exists for every request after warm-up
        if let Some(existing) = self.metrics.get(&key) {
            if let Some(instrument) = T::from_instrument(existing.value()) {
                return instrument;
            }
        }
        let entry = self
            .metrics
            .entry(key)
            .or_insert_with(|| T::default().into_instrument());
        match T::from_instrument(entry.value()) {
            Some(instrument) => instrument,
            None => unreachable!("metric kind is part of the registry key"),
        }
    }

    /// Look up an existing instrument without creating it
    pub fn get<T: MetricObserver>(
        &self,
        name: impl Into<Cow<'static, str>>,
        attributes: impl Into<Attributes>,
    ) -> Option<T> {
        let key = MetricKey::new(T::kind(), name, attributes.into());
        self.metrics
            .get(&key)
            .and_then(|entry| T::from_instrument(entry.value()))
    }

    pub fn gauge(
        &self,
        name: impl Into<Cow<'static, str>>,
        attributes: impl Into<Attributes>,
    ) -> F64Gauge {
        self.get_or_create(name, attributes)
    }

    pub fn counter(
        &self,
        name: impl Into<Cow<'static, str>>,
        attributes: impl Into<Attributes>,
    ) -> U64Counter {
        self.get_or_create(name, attributes)
    }

    pub fn delta_counter(
        &self,
        name: impl Into<Cow<'static, str>>,
        attributes: impl Into<Attributes>,
    ) -> DeltaCounter {
        self.get_or_create(name, attributes)
    }

    pub fn histogram(
        &self,
        name: impl Into<Cow<'static, str>>,
        attributes: impl Into<Attributes>,
    ) -> Histogram {
        self.get_or_create(name, attributes)
    }

    /// Number of distinct instruments
    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    /// Visit every instrument in key order without modifying it
    pub fn report(&self, reporter: &mut dyn Reporter) {
        for (key, instrument) in self.sorted_instruments() {
            if let Some(observation) = instrument.observe() {
                reporter.report_observation(&key, observation);
            }
        }
    }

    /// Read every instrument, draining delta counters and histograms
    ///
    /// Delta counters with nothing accumulated, empty histograms and gauges that were
    /// never written are left out of the result.
    pub fn flush(&self) -> Vec<(MetricKey, Observation)> {
        self.sorted_instruments()
            .into_iter()
            .filter_map(|(key, instrument)| instrument.drain().map(|o| (key, o)))
            .collect()
    }

    /// Fold drained values from a [`flush`](Self::flush) back into their instruments
    pub fn restore(&self, flushed: &[(MetricKey, Observation)]) {
        for (key, observation) in flushed {
            if let Some(entry) = self.metrics.get(key) {
                entry.value().restore(observation);
            }
        }
    }

    // Handles are cloned out so no shard lock is held while observing.
    fn sorted_instruments(&self) -> Vec<(MetricKey, Instrument)> {
        let mut instruments: Vec<_> = self
            .metrics
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        instruments.sort_unstable_by(|a, b| a.0.cmp(&b.0));
        instruments
    }
}
