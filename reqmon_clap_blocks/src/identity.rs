//! Config for the application identity attached to every metric.
use reqmon_tags::{ApplicationTags, CustomTag};

/// CLI config for the application identity
#[derive(Debug, Clone, Default, clap::Parser)]
pub struct IdentityConfig {
    /// Name of the application, e.g. `beachshirts`.
    ///
    /// Required for metrics to be recorded.
    #[clap(long = "application", env = "REQMON_APPLICATION", action)]
    pub application: Option<String>,

    /// Name of the service within the application, e.g. `styling`.
    ///
    /// Required for metrics to be recorded.
    #[clap(long = "service", env = "REQMON_SERVICE", action)]
    pub service: Option<String>,

    /// Cluster the service runs in.
    ///
    /// Per-cluster rollups are only recorded when set.
    #[clap(long = "cluster", env = "REQMON_CLUSTER", action)]
    pub cluster: Option<String>,

    /// Shard of the service.
    ///
    /// Per-shard rollups are only recorded when set.
    #[clap(long = "shard", env = "REQMON_SHARD", action)]
    pub shard: Option<String>,

    /// Additional tags as comma separated `key=value` pairs.
    ///
    /// Example: "env=prod,region=eu"
    #[clap(
        long = "custom-tags",
        env = "REQMON_CUSTOM_TAGS",
        num_args = 1..,
        value_delimiter = ',',
        action
    )]
    pub custom_tags: Vec<CustomTag>,
}

impl IdentityConfig {
    /// Build the identity, failing if application or service is missing
    pub fn application_tags(&self) -> reqmon_tags::Result<ApplicationTags> {
        let tags = ApplicationTags::new(
            self.application.clone().unwrap_or_default(),
            self.service.clone().unwrap_or_default(),
        )?;
        Ok(tags
            .with_cluster(self.cluster.as_deref())
            .with_shard(self.shard.as_deref())
            .with_custom_tags(self.custom_tags.iter().cloned()))
    }
}
