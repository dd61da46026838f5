use crate::{Attributes, MetricKey, MetricKind, Observation};

/// Visitor over the instruments of a [`Registry`](crate::Registry)
pub trait Reporter {
    fn report_observation(&mut self, key: &MetricKey, observation: Observation);
}

/// A [`Reporter`] that keeps the most recent observation of every instrument it visits
///
/// Mostly useful for asserting on registry contents in tests.
#[derive(Debug, Default)]
pub struct RawReporter {
    observations: Vec<(MetricKey, Observation)>,
}

impl RawReporter {
    pub fn observation(
        &self,
        kind: MetricKind,
        name: &str,
        attributes: &Attributes,
    ) -> Option<&Observation> {
        self.observations
            .iter()
            .find(|(key, _)| {
                key.kind() == kind && key.name() == name && key.attributes() == attributes
            })
            .map(|(_, observation)| observation)
    }

    /// All observations of metrics called `name`, across every attribute set
    pub fn observations_named<'a>(
        &'a self,
        name: &'a str,
    ) -> impl Iterator<Item = (&'a MetricKey, &'a Observation)> + 'a {
        self.observations
            .iter()
            .filter(move |(key, _)| key.name() == name)
            .map(|(key, observation)| (key, observation))
    }

    /// Distinct metric names, in report order
    pub fn metric_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for (key, _) in &self.observations {
            if !names.contains(&key.name()) {
                names.push(key.name());
            }
        }
        names
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }
}

impl Reporter for RawReporter {
    fn report_observation(&mut self, key: &MetricKey, observation: Observation) {
        match self.observations.iter_mut().find(|(k, _)| k == key) {
            Some((_, existing)) => *existing = observation,
            None => self.observations.push((key.clone(), observation)),
        }
    }
}
