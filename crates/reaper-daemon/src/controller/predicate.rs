//! Admission predicates for watch events
//!
//! Predicates decide which resource changes reach the work queue at all.

use crate::config::NamespaceConfig;
use crate::error::{DaemonError, DaemonResult};
use reaper_types::ExpirableResource;
use std::fmt;

/// Filter applied to every observed resource before it is enqueued
pub trait Predicate: Send + Sync + fmt::Debug {
    fn admit(&self, resource: &ExpirableResource) -> bool;
}

/// Rejects resources that are already being terminated
#[derive(Debug, Default, Clone, Copy)]
pub struct NotBeingTerminated;

impl Predicate for NotBeingTerminated {
    fn admit(&self, resource: &ExpirableResource) -> bool {
        !resource.is_being_terminated()
    }
}

/// Which namespaces the reaper is responsible for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallMode {
    /// Only the namespace the reaper runs in
    OwnNamespace { namespace: String },
    /// A single namespace other than the reaper's own
    SingleNamespace { target: String },
    /// An explicit set of namespaces
    MultiNamespace { targets: Vec<String> },
    /// Every namespace
    AllNamespaces,
}

impl InstallMode {
    /// Derive the mode from the operator namespace and target namespaces
    pub fn resolve(operator_namespace: &str, target_namespaces: &[String]) -> DaemonResult<Self> {
        let operator_namespace = operator_namespace.trim();
        match target_namespaces {
            [] => Ok(InstallMode::AllNamespaces),
            [target] => {
                if operator_namespace.is_empty() {
                    return Err(DaemonError::Config(
                        "operator namespace must be set when targeting a single namespace"
                            .to_string(),
                    ));
                }
                if target == operator_namespace {
                    Ok(InstallMode::OwnNamespace {
                        namespace: target.clone(),
                    })
                } else {
                    Ok(InstallMode::SingleNamespace {
                        target: target.clone(),
                    })
                }
            }
            targets => Ok(InstallMode::MultiNamespace {
                targets: targets.to_vec(),
            }),
        }
    }

    pub fn from_config(config: &NamespaceConfig) -> DaemonResult<Self> {
        Self::resolve(&config.operator_namespace, &config.target_namespace_list())
    }

    pub fn covers(&self, namespace: &str) -> bool {
        match self {
            InstallMode::OwnNamespace { namespace: own } => own == namespace,
            InstallMode::SingleNamespace { target } => target == namespace,
            InstallMode::MultiNamespace { targets } => targets.iter().any(|t| t == namespace),
            InstallMode::AllNamespaces => true,
        }
    }
}

impl Predicate for InstallMode {
    fn admit(&self, resource: &ExpirableResource) -> bool {
        self.covers(&resource.key.namespace)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reaper_types::ResourceKey;

    fn resource_in(namespace: &str) -> ExpirableResource {
        ExpirableResource::new(ResourceKey::new(namespace, "report"), chrono::Utc::now())
    }

    fn targets(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_not_being_terminated() {
        let live = resource_in("default");
        let dying = resource_in("default").with_deletion_timestamp(chrono::Utc::now());
        assert!(NotBeingTerminated.admit(&live));
        assert!(!NotBeingTerminated.admit(&dying));
    }

    #[test]
    fn test_resolve_install_modes() {
        assert_eq!(
            InstallMode::resolve("reaper", &[]).unwrap(),
            InstallMode::AllNamespaces
        );
        assert_eq!(
            InstallMode::resolve("reaper", &targets(&["reaper"])).unwrap(),
            InstallMode::OwnNamespace {
                namespace: "reaper".to_string()
            }
        );
        assert_eq!(
            InstallMode::resolve("reaper", &targets(&["apps"])).unwrap(),
            InstallMode::SingleNamespace {
                target: "apps".to_string()
            }
        );
        assert_eq!(
            InstallMode::resolve("", &targets(&["a", "b"])).unwrap(),
            InstallMode::MultiNamespace {
                targets: targets(&["a", "b"])
            }
        );
        assert!(InstallMode::resolve("", &targets(&["apps"])).is_err());
    }

    #[test]
    fn test_install_mode_admission() {
        let multi = InstallMode::MultiNamespace {
            targets: targets(&["a", "b"]),
        };
        assert!(multi.admit(&resource_in("a")));
        assert!(!multi.admit(&resource_in("c")));

        let single = InstallMode::SingleNamespace {
            target: "apps".to_string(),
        };
        assert!(single.admit(&resource_in("apps")));
        assert!(!single.admit(&resource_in("reaper")));

        assert!(InstallMode::AllNamespaces.admit(&resource_in("anything")));
    }
}
