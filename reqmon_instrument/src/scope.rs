use reqmon_metric::Attributes;
use reqmon_tags::{
    ApplicationTags, CLUSTER_TAG_KEY, SERVICE_TAG_KEY, SHARD_TAG_KEY, SOURCE_TAG_KEY,
};

use crate::RouteMatch;

/// Value of the `source` tag on server computed rollups
pub const SERVER_PROVIDED_SOURCE: &str = "server-provided";

/// Granularity of a time series, each a projection of the full tag set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregationScope {
    /// cluster, service, shard and the handler
    PerRequest,
    PerShard,
    PerService,
    PerCluster,
    PerApplication,
    /// cluster, service and shard, without a `source` override
    PerSource,
}

impl AggregationScope {
    /// Suffix appended to rollup metric names, e.g. `aggregated_per_shard`
    pub fn suffix(&self) -> &'static str {
        match self {
            Self::PerRequest => "cumulative",
            Self::PerShard => "aggregated_per_shard",
            Self::PerService => "aggregated_per_service",
            Self::PerCluster => "aggregated_per_cluster",
            Self::PerApplication => "aggregated_per_application",
            Self::PerSource => "aggregated_per_source",
        }
    }

    fn has_cluster(&self) -> bool {
        !matches!(self, Self::PerApplication)
    }

    fn has_service(&self) -> bool {
        matches!(
            self,
            Self::PerRequest | Self::PerShard | Self::PerService | Self::PerSource
        )
    }

    fn has_shard(&self) -> bool {
        matches!(self, Self::PerRequest | Self::PerShard | Self::PerSource)
    }

    fn has_source(&self) -> bool {
        !matches!(self, Self::PerRequest | Self::PerSource)
    }
}

/// Builds tag sets for each [`AggregationScope`]
///
/// The identity fragments are resolved once, only the handler tags vary per request.
/// Absent or empty values are left out of the tag set rather than sent empty.
#[derive(Debug, Clone)]
pub struct ScopeTags {
    service: String,
    cluster: Option<String>,
    shard: Option<String>,
    module_key: String,
    func_key: String,
}

impl ScopeTags {
    pub fn new(identity: &ApplicationTags, component: &str) -> Self {
        Self {
            service: identity.service().to_string(),
            cluster: identity.cluster().map(ToString::to_string),
            shard: identity.shard().map(ToString::to_string),
            module_key: module_tag_key(component),
            func_key: func_tag_key(component),
        }
    }

    pub fn has_cluster(&self) -> bool {
        self.cluster.is_some()
    }

    pub fn has_shard(&self) -> bool {
        self.shard.is_some()
    }

    /// Tags of `scope`, including the handler tags of `route` if given
    pub fn attributes(&self, scope: AggregationScope, route: Option<&RouteMatch>) -> Attributes {
        let mut attributes = Attributes::default();
        if scope.has_cluster() {
            insert_non_empty(&mut attributes, CLUSTER_TAG_KEY, self.cluster.as_deref());
        }
        if scope.has_service() {
            insert_non_empty(&mut attributes, SERVICE_TAG_KEY, Some(&self.service));
        }
        if scope.has_shard() {
            insert_non_empty(&mut attributes, SHARD_TAG_KEY, self.shard.as_deref());
        }
        if scope != AggregationScope::PerSource {
            self.insert_route(&mut attributes, route);
        }
        if scope.has_source() {
            attributes.insert(SOURCE_TAG_KEY, SERVER_PROVIDED_SOURCE);
        }
        attributes
    }

    /// Only the handler tags of `route`
    pub fn route_attributes(&self, route: Option<&RouteMatch>) -> Attributes {
        let mut attributes = Attributes::default();
        self.insert_route(&mut attributes, route);
        attributes
    }

    fn insert_route(&self, attributes: &mut Attributes, route: Option<&RouteMatch>) {
        if let Some(route) = route {
            insert_non_empty(attributes, self.module_key.clone(), Some(route.module()));
            insert_non_empty(attributes, self.func_key.clone(), Some(route.func()));
        }
    }
}

/// `<component>.resource.module`
pub fn module_tag_key(component: &str) -> String {
    format!("{component}.resource.module")
}

/// `<component>.resource.func`
pub fn func_tag_key(component: &str) -> String {
    format!("{component}.resource.func")
}

fn insert_non_empty(
    attributes: &mut Attributes,
    key: impl Into<std::borrow::Cow<'static, str>>,
    value: Option<&str>,
) {
    if let Some(value) = value.filter(|v| !v.is_empty()) {
        attributes.insert(key, value.to_string());
    }
}
