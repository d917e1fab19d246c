//! Cluster client seam.
//!
//! The orchestrator never constructs or authenticates a cluster connection;
//! it receives an `Arc<dyn ClusterClient>` and hands it to every test. The
//! trait covers what the orchestrator and the built-in smoke tests need:
//! namespaces and generic routing-API resources.

mod memory;

pub use memory::MemoryCluster;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::ClusterResult;

/// Identity of a namespaced resource.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResourceKey {
    pub kind: String,
    pub namespace: String,
    pub name: String,
}

impl ResourceKey {
    pub fn new(
        kind: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            kind: kind.into(),
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}/{}", self.kind, self.namespace, self.name)
    }
}

/// A routing-API object: `spec` is desired state, `status` is written by the
/// implementation's controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub key: ResourceKey,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    pub spec: serde_json::Value,
    #[serde(default)]
    pub status: serde_json::Value,
}

impl Resource {
    pub fn new(key: ResourceKey, spec: serde_json::Value) -> Self {
        Self {
            key,
            labels: BTreeMap::new(),
            spec,
            status: serde_json::Value::Null,
        }
    }

    /// Look up a status condition by type, e.g. `Accepted`.
    pub fn condition(&self, condition_type: &str) -> Option<&serde_json::Value> {
        self.status
            .get("conditions")?
            .as_array()?
            .iter()
            .find(|c| c.get("type").and_then(|t| t.as_str()) == Some(condition_type))
    }

    /// Whether the named condition is present with status `True`.
    pub fn condition_true(&self, condition_type: &str) -> bool {
        self.condition(condition_type)
            .and_then(|c| c.get("status"))
            .and_then(|s| s.as_str())
            == Some("True")
    }
}

/// Operations the orchestrator and tests perform against the cluster.
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Cheap round trip used to verify credentials and reachability.
    async fn check_connection(&self) -> ClusterResult<()>;

    async fn create_namespace(
        &self,
        name: &str,
        labels: &BTreeMap<String, String>,
    ) -> ClusterResult<()>;

    /// Request namespace deletion. Deletion may complete asynchronously; poll
    /// [`namespace_exists`](Self::namespace_exists) to observe it.
    async fn delete_namespace(&self, name: &str) -> ClusterResult<()>;

    async fn namespace_exists(&self, name: &str) -> ClusterResult<bool>;

    /// Create or replace a resource.
    async fn apply(&self, resource: Resource) -> ClusterResult<()>;

    async fn get(&self, key: &ResourceKey) -> ClusterResult<Option<Resource>>;

    async fn delete(&self, key: &ResourceKey) -> ClusterResult<()>;

    async fn list(&self, kind: &str, namespace: &str) -> ClusterResult<Vec<Resource>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_condition_lookup() {
        let mut resource = Resource::new(
            ResourceKey::new("Gateway", "gateway-conformance-infra", "same-namespace"),
            json!({ "gatewayClassName": "acme" }),
        );
        resource.status = json!({
            "conditions": [
                { "type": "Accepted", "status": "True" },
                { "type": "Programmed", "status": "False" }
            ]
        });

        assert!(resource.condition_true("Accepted"));
        assert!(!resource.condition_true("Programmed"));
        assert!(resource.condition("ResolvedRefs").is_none());
    }

    #[test]
    fn test_key_display() {
        let key = ResourceKey::new("HTTPRoute", "infra", "exact-path");
        assert_eq!(key.to_string(), "HTTPRoute infra/exact-path");
    }
}
