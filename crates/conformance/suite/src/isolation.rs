//! Isolation units.
//!
//! Tests that mutate cluster state get a dedicated namespace from the
//! [`IsolationArena`]. The arena records every namespace it hands out, so
//! anything a test path failed to release is still torn down at the end of
//! the run.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::cluster::ClusterClient;
use crate::error::{ClusterError, ClusterResult};

/// Kubernetes namespace names are DNS-1123 labels.
const MAX_NAMESPACE_LEN: usize = 63;

/// A dedicated namespace owned by one test execution.
#[derive(Debug, PartialEq, Eq)]
#[must_use = "isolation units must be released or retained"]
pub struct IsolationUnit {
    namespace: String,
}

impl IsolationUnit {
    pub fn namespace(&self) -> &str {
        &self.namespace
    }
}

/// Allocates and tears down isolation units for a run.
pub struct IsolationArena {
    cluster: Arc<dyn ClusterClient>,
    labels: BTreeMap<String, String>,
    prefix: String,
    teardown_timeout: Duration,
    poll_interval: Duration,
    held: Mutex<BTreeSet<String>>,
    next_id: AtomicU64,
}

impl IsolationArena {
    pub fn new(
        cluster: Arc<dyn ClusterClient>,
        labels: BTreeMap<String, String>,
        teardown_timeout: Duration,
        poll_interval: Duration,
    ) -> Self {
        Self {
            cluster,
            labels,
            prefix: "gateway-conformance".to_string(),
            teardown_timeout,
            poll_interval,
            held: Mutex::new(BTreeSet::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Create a fresh namespace for `test_name`.
    pub async fn acquire(&self, test_name: &str) -> ClusterResult<IsolationUnit> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let namespace = namespace_name(&self.prefix, test_name, id);

        self.cluster.create_namespace(&namespace, &self.labels).await?;
        self.lock_held().insert(namespace.clone());
        debug!(namespace = %namespace, test = test_name, "acquired isolation unit");

        Ok(IsolationUnit { namespace })
    }

    /// Delete the unit's namespace and wait until it is gone.
    pub async fn release(&self, unit: IsolationUnit) -> ClusterResult<()> {
        let namespace = unit.namespace;
        let result = delete_namespace_and_wait(
            self.cluster.as_ref(),
            &namespace,
            self.teardown_timeout,
            self.poll_interval,
        )
        .await;

        // A timed-out teardown still counts as released; the namespace is
        // already terminating.
        if result.is_ok() || matches!(result, Err(ClusterError::Timeout(_))) {
            self.lock_held().remove(&namespace);
        }
        debug!(namespace = %namespace, ok = result.is_ok(), "released isolation unit");
        result
    }

    /// Keep the unit's namespace in the cluster for post-run debugging.
    pub fn retain(&self, unit: IsolationUnit) {
        self.lock_held().remove(&unit.namespace);
        debug!(namespace = %unit.namespace, "retaining isolation unit (cleanup disabled)");
    }

    /// Release every unit still held. Returns the namespaces that could not
    /// be removed.
    pub async fn release_all(&self) -> Vec<(String, ClusterError)> {
        let leftover: Vec<String> = self.lock_held().iter().cloned().collect();
        let mut failures = Vec::new();

        for namespace in leftover {
            warn!(namespace = %namespace, "releasing leaked isolation unit");
            let unit = IsolationUnit { namespace: namespace.clone() };
            if let Err(err) = self.release(unit).await {
                failures.push((namespace, err));
            }
        }

        failures
    }

    /// Namespaces currently held by the arena.
    pub fn held(&self) -> Vec<String> {
        self.lock_held().iter().cloned().collect()
    }

    fn lock_held(&self) -> std::sync::MutexGuard<'_, BTreeSet<String>> {
        self.held.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Delete `namespace` and poll until the cluster reports it gone.
pub async fn delete_namespace_and_wait(
    cluster: &dyn ClusterClient,
    namespace: &str,
    timeout: Duration,
    poll_interval: Duration,
) -> ClusterResult<()> {
    match cluster.delete_namespace(namespace).await {
        Ok(()) | Err(ClusterError::NotFound { .. }) => {}
        Err(err) => return Err(err),
    }

    let start = Instant::now();
    loop {
        if !cluster.namespace_exists(namespace).await? {
            return Ok(());
        }
        if start.elapsed() >= timeout {
            warn!(namespace, ?timeout, "namespace teardown did not complete");
            return Err(ClusterError::Timeout(timeout));
        }
        tokio::time::sleep(poll_interval).await;
    }
}

/// Build a DNS-1123 compliant namespace name.
fn namespace_name(prefix: &str, test_name: &str, id: u64) -> String {
    let mut slug = String::with_capacity(test_name.len());
    let mut last_dash = false;
    for ch in test_name.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }

    let suffix = format!("-{}", id);
    let budget = MAX_NAMESPACE_LEN - prefix.len() - suffix.len() - 1;
    let slug: String = slug.trim_matches('-').chars().take(budget).collect();
    let slug = slug.trim_end_matches('-');

    if slug.is_empty() {
        format!("{}{}", prefix, suffix)
    } else {
        format!("{}-{}{}", prefix, slug, suffix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::MemoryCluster;

    fn arena(cluster: Arc<MemoryCluster>) -> IsolationArena {
        IsolationArena::new(
            cluster,
            BTreeMap::from([("team".to_string(), "net".to_string())]),
            Duration::from_secs(1),
            Duration::from_millis(1),
        )
    }

    #[test]
    fn test_namespace_name_is_dns_label() {
        let name = namespace_name(
            "gateway-conformance",
            "HTTPRouteRequestMultipleMirrors_With/Weird Chars And A Very Long Suffix",
            42,
        );
        assert!(name.len() <= MAX_NAMESPACE_LEN);
        assert!(name.ends_with("-42"));
        assert!(name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'));
        assert!(!name.contains("--"));
    }

    #[test]
    fn test_namespace_name_empty_slug() {
        assert_eq!(namespace_name("gc", "___", 3), "gc-3");
    }

    #[tokio::test]
    async fn test_acquire_release() {
        let cluster = Arc::new(MemoryCluster::new());
        let arena = arena(cluster.clone());

        let unit = arena.acquire("HTTPRouteSimpleSameNamespace").await.unwrap();
        let namespace = unit.namespace().to_string();
        assert_eq!(cluster.active_namespaces().await, vec![namespace.clone()]);
        assert_eq!(
            cluster.namespace_labels(&namespace).await.unwrap().get("team"),
            Some(&"net".to_string())
        );

        arena.release(unit).await.unwrap();
        assert!(cluster.active_namespaces().await.is_empty());
        assert!(arena.held().is_empty());
    }

    #[tokio::test]
    async fn test_release_waits_for_termination() {
        let cluster = Arc::new(MemoryCluster::new().with_deletion_delay(3));
        let arena = arena(cluster.clone());

        let unit = arena.acquire("t").await.unwrap();
        let namespace = unit.namespace().to_string();
        arena.release(unit).await.unwrap();
        assert!(!cluster.namespace_exists(&namespace).await.unwrap());
    }

    #[tokio::test]
    async fn test_release_times_out() {
        let cluster = Arc::new(MemoryCluster::new().with_deletion_delay(u32::MAX));
        let arena = IsolationArena::new(
            cluster,
            BTreeMap::new(),
            Duration::from_millis(5),
            Duration::from_millis(1),
        );

        let unit = arena.acquire("t").await.unwrap();
        let err = arena.release(unit).await.unwrap_err();
        assert!(matches!(err, ClusterError::Timeout(_)));
        assert!(arena.held().is_empty());
    }

    #[tokio::test]
    async fn test_retain_keeps_namespace() {
        let cluster = Arc::new(MemoryCluster::new());
        let arena = arena(cluster.clone());

        let unit = arena.acquire("debug-me").await.unwrap();
        arena.retain(unit);
        assert_eq!(cluster.active_namespaces().await.len(), 1);
        assert!(arena.held().is_empty());
    }

    #[tokio::test]
    async fn test_release_all_cleans_leaks() {
        let cluster = Arc::new(MemoryCluster::new());
        let arena = arena(cluster.clone());

        let first = arena.acquire("a").await.unwrap();
        let second = arena.acquire("b").await.unwrap();
        // Simulate a path that lost track of its units.
        std::mem::forget(first);
        std::mem::forget(second);

        assert!(arena.release_all().await.is_empty());
        assert!(cluster.active_namespaces().await.is_empty());
    }
}
