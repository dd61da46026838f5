//! Process identity used to tag every metric: application, service, cluster, shard and
//! any custom tags.
//!
//! [`ApplicationTags`] is resolved once at startup and is read-only afterwards. Cluster
//! and shard are optional and have two serializations:
//!
//! - [`ApplicationTags::as_list`] always lists all four identity dimensions, using
//!   [`NULL_TAG_VAL`] for an absent cluster or shard.
//! - Rollup tag sets built by the request instrumentation omit an absent dimension
//!   entirely, see [`ApplicationTags::cluster`] and [`ApplicationTags::shard`].
use std::str::FromStr;

use serde::Serialize;
use thiserror::Error;

pub const APPLICATION_TAG_KEY: &str = "application";
pub const SERVICE_TAG_KEY: &str = "service";
pub const CLUSTER_TAG_KEY: &str = "cluster";
pub const SHARD_TAG_KEY: &str = "shard";
pub const COMPONENT_TAG_KEY: &str = "component";
pub const SOURCE_TAG_KEY: &str = "source";

/// Placeholder for an absent optional dimension in the list form
pub const NULL_TAG_VAL: &str = "none";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    #[error("missing \"application\" in application tags")]
    MissingApplication,

    #[error("missing \"service\" in application tags")]
    MissingService,

    #[error("invalid custom tag {0:?}, expected key=value with a non-empty key")]
    InvalidCustomTag(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// A single `key=value` custom tag
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CustomTag {
    pub key: String,
    pub value: String,
}

impl FromStr for CustomTag {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (key, value) = s
            .split_once('=')
            .ok_or_else(|| Error::InvalidCustomTag(s.to_string()))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(Error::InvalidCustomTag(s.to_string()));
        }
        Ok(Self {
            key: key.to_string(),
            value: value.trim().to_string(),
        })
    }
}

impl std::fmt::Display for CustomTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}={}", self.key, self.value)
    }
}

/// Identity of this process
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApplicationTags {
    application: String,
    service: String,
    cluster: Option<String>,
    shard: Option<String>,
    custom_tags: Vec<CustomTag>,
}

impl ApplicationTags {
    /// Create the identity, failing if `application` or `service` is empty
    pub fn new(application: impl Into<String>, service: impl Into<String>) -> Result<Self> {
        let application = application.into();
        if application.trim().is_empty() {
            return Err(Error::MissingApplication);
        }
        let service = service.into();
        if service.trim().is_empty() {
            return Err(Error::MissingService);
        }
        Ok(Self {
            application,
            service,
            cluster: None,
            shard: None,
            custom_tags: vec![],
        })
    }

    /// Set the cluster, an empty value counts as absent
    pub fn with_cluster(self, cluster: Option<impl Into<String>>) -> Self {
        Self {
            cluster: non_empty(cluster),
            ..self
        }
    }

    /// Set the shard, an empty value counts as absent
    pub fn with_shard(self, shard: Option<impl Into<String>>) -> Self {
        Self {
            shard: non_empty(shard),
            ..self
        }
    }

    pub fn with_custom_tags(self, custom_tags: impl IntoIterator<Item = CustomTag>) -> Self {
        Self {
            custom_tags: custom_tags.into_iter().collect(),
            ..self
        }
    }

    pub fn application(&self) -> &str {
        &self.application
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn cluster(&self) -> Option<&str> {
        self.cluster.as_deref()
    }

    pub fn shard(&self) -> Option<&str> {
        self.shard.as_deref()
    }

    pub fn custom_tags(&self) -> &[CustomTag] {
        &self.custom_tags
    }

    /// The four identity dimensions, with [`NULL_TAG_VAL`] standing in for an absent
    /// cluster or shard
    pub fn as_list(&self) -> [(&'static str, &str); 4] {
        [
            (APPLICATION_TAG_KEY, self.application()),
            (SERVICE_TAG_KEY, self.service()),
            (CLUSTER_TAG_KEY, self.cluster().unwrap_or(NULL_TAG_VAL)),
            (SHARD_TAG_KEY, self.shard().unwrap_or(NULL_TAG_VAL)),
        ]
    }
}

fn non_empty(value: Option<impl Into<String>>) -> Option<String> {
    value.map(Into::into).filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_requires_application_and_service() {
        assert_eq!(
            ApplicationTags::new("", "styling").unwrap_err(),
            Error::MissingApplication
        );
        assert_eq!(
            ApplicationTags::new("beachshirts", "  ").unwrap_err(),
            Error::MissingService
        );
        assert!(ApplicationTags::new("beachshirts", "styling").is_ok());
    }

    #[test]
    fn test_as_list_uses_sentinel() {
        let tags = ApplicationTags::new("beachshirts", "styling").unwrap();
        assert_eq!(tags.cluster(), None);
        assert_eq!(tags.shard(), None);
        assert_eq!(
            tags.as_list(),
            [
                ("application", "beachshirts"),
                ("service", "styling"),
                ("cluster", "none"),
                ("shard", "none"),
            ]
        );

        let tags = tags
            .with_cluster(Some("us-west"))
            .with_shard(Some("primary"));
        assert_eq!(
            tags.as_list(),
            [
                ("application", "beachshirts"),
                ("service", "styling"),
                ("cluster", "us-west"),
                ("shard", "primary"),
            ]
        );
    }

    #[test]
    fn test_empty_optional_dimensions_are_absent() {
        let tags = ApplicationTags::new("beachshirts", "styling")
            .unwrap()
            .with_cluster(Some(""))
            .with_shard(None::<String>);
        assert_eq!(tags.cluster(), None);
        assert_eq!(tags.shard(), None);
    }

    #[test]
    fn test_parse_custom_tag() {
        let tag: CustomTag = "env = prod".parse().unwrap();
        assert_eq!(tag.key, "env");
        assert_eq!(tag.value, "prod");
        assert_eq!(tag.to_string(), "env=prod");

        // values may contain '='
        let tag: CustomTag = "q=a=b".parse().unwrap();
        assert_eq!(tag.value, "a=b");

        assert!("novalue".parse::<CustomTag>().is_err());
        assert!("=prod".parse::<CustomTag>().is_err());
    }

    #[test]
    fn test_serialize() {
        let tags = ApplicationTags::new("beachshirts", "styling")
            .unwrap()
            .with_custom_tags(["env=prod".parse::<CustomTag>().unwrap()]);
        let json = serde_json::to_value(&tags).unwrap();
        assert_eq!(json["application"], "beachshirts");
        assert_eq!(json["cluster"], serde_json::Value::Null);
        assert_eq!(json["custom_tags"][0]["key"], "env");
    }
}
