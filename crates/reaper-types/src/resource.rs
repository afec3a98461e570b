//! Expirable resources
//!
//! An ExpirableResource is any stored resource the reaper may garbage collect.
//! Only resources carrying the TTL annotation are ever considered.

use crate::ResourceKey;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Well-known annotation carrying the resource time-to-live
pub const TTL_ANNOTATION: &str = "starboard.aquasecurity.github.io/report-ttl";

/// A resource as observed in the store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpirableResource {
    /// Namespaced identity
    pub key: ResourceKey,

    /// Free-form annotations
    #[serde(default)]
    pub annotations: HashMap<String, String>,

    /// Free-form labels
    #[serde(default)]
    pub labels: HashMap<String, String>,

    /// When the resource content was last computed; the TTL window starts here
    pub update_timestamp: DateTime<Utc>,

    /// Set once some actor has started terminating the resource
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletion_timestamp: Option<DateTime<Utc>>,
}

impl ExpirableResource {
    pub fn new(key: ResourceKey, update_timestamp: DateTime<Utc>) -> Self {
        Self {
            key,
            annotations: HashMap::new(),
            labels: HashMap::new(),
            update_timestamp,
            deletion_timestamp: None,
        }
    }

    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }

    /// Shorthand for annotating with [`TTL_ANNOTATION`]
    pub fn with_ttl(self, ttl: impl Into<String>) -> Self {
        self.with_annotation(TTL_ANNOTATION, ttl)
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn with_deletion_timestamp(mut self, at: DateTime<Utc>) -> Self {
        self.deletion_timestamp = Some(at);
        self
    }

    /// Raw annotation value, if present
    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.annotations.get(key).map(String::as_str)
    }

    pub fn is_being_terminated(&self) -> bool {
        self.deletion_timestamp.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_sets_ttl_annotation() {
        let resource = ExpirableResource::new(ResourceKey::new("ns", "r"), Utc::now()).with_ttl("1h");
        assert_eq!(resource.annotation(TTL_ANNOTATION), Some("1h"));
        assert!(!resource.is_being_terminated());
    }

    #[test]
    fn test_deserialize_defaults() {
        let json = r#"{
            "key": {"namespace": "default", "name": "vuln-report"},
            "update_timestamp": "2023-01-01T00:00:00Z"
        }"#;
        let resource: ExpirableResource = serde_json::from_str(json).unwrap();
        assert!(resource.annotations.is_empty());
        assert!(resource.deletion_timestamp.is_none());
        assert_eq!(resource.key.to_string(), "default/vuln-report");
    }
}
