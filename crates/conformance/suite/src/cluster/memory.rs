//! In-memory cluster.
//!
//! Backs the crate's own tests and the CLI's simulate mode. A minimal
//! controller marks applied objects `Accepted` so status polling has
//! something to observe.

use async_trait::async_trait;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::RwLock;
use tracing::debug;

use super::{ClusterClient, Resource, ResourceKey};
use crate::error::{ClusterError, ClusterResult};

#[derive(Debug, Default)]
struct NamespaceEntry {
    labels: BTreeMap<String, String>,
    /// Remaining `namespace_exists` polls before a terminating namespace
    /// disappears. `None` while active.
    terminating: Option<u32>,
}

#[derive(Debug, Default)]
struct State {
    namespaces: BTreeMap<String, NamespaceEntry>,
    resources: BTreeMap<ResourceKey, Resource>,
}

/// A [`ClusterClient`] holding everything in process memory.
#[derive(Debug)]
pub struct MemoryCluster {
    state: RwLock<State>,
    revoked: AtomicBool,
    revoke_reason: std::sync::Mutex<String>,
    auto_accept: bool,
    deletion_polls: u32,
    calls: AtomicU64,
}

impl MemoryCluster {
    /// Cluster whose controller accepts every applied object.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(State::default()),
            revoked: AtomicBool::new(false),
            revoke_reason: std::sync::Mutex::new(String::new()),
            auto_accept: true,
            deletion_polls: 0,
            calls: AtomicU64::new(0),
        }
    }

    /// Disable the built-in controller; applied objects keep an empty status.
    pub fn without_controller(mut self) -> Self {
        self.auto_accept = false;
        self
    }

    /// Keep deleted namespaces visible for `polls` existence checks.
    pub fn with_deletion_delay(mut self, polls: u32) -> Self {
        self.deletion_polls = polls;
        self
    }

    /// Simulate credential expiry: every later call fails with
    /// [`ClusterError::Unauthorized`].
    pub fn revoke(&self, reason: impl Into<String>) {
        if let Ok(mut slot) = self.revoke_reason.lock() {
            *slot = reason.into();
        }
        self.revoked.store(true, Ordering::SeqCst);
    }

    /// Number of client calls served so far.
    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Names of namespaces that exist and are not terminating.
    pub async fn active_namespaces(&self) -> Vec<String> {
        let state = self.state.read().await;
        state
            .namespaces
            .iter()
            .filter(|(_, entry)| entry.terminating.is_none())
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Labels of an active namespace.
    pub async fn namespace_labels(&self, name: &str) -> Option<BTreeMap<String, String>> {
        let state = self.state.read().await;
        state.namespaces.get(name).map(|entry| entry.labels.clone())
    }

    fn enter(&self) -> ClusterResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.revoked.load(Ordering::SeqCst) {
            let reason = self
                .revoke_reason
                .lock()
                .map(|r| r.clone())
                .unwrap_or_default();
            return Err(ClusterError::Unauthorized(reason));
        }
        Ok(())
    }

    fn reconcile(&self, resource: &mut Resource) {
        if !self.auto_accept {
            return;
        }
        resource.status = json!({
            "conditions": [
                { "type": "Accepted", "status": "True", "reason": "Accepted" },
                { "type": "Programmed", "status": "True", "reason": "Programmed" }
            ]
        });
    }
}

impl Default for MemoryCluster {
    fn default() -> Self {
        Self::new()
    }
}

fn require_active(state: &State, namespace: &str) -> ClusterResult<()> {
    match state.namespaces.get(namespace) {
        Some(entry) if entry.terminating.is_none() => Ok(()),
        Some(_) => Err(ClusterError::Conflict(format!(
            "namespace {} is terminating",
            namespace
        ))),
        None => Err(ClusterError::NotFound {
            kind: "Namespace".into(),
            namespace: String::new(),
            name: namespace.to_string(),
        }),
    }
}

#[async_trait]
impl ClusterClient for MemoryCluster {
    async fn check_connection(&self) -> ClusterResult<()> {
        self.enter()
    }

    async fn create_namespace(
        &self,
        name: &str,
        labels: &BTreeMap<String, String>,
    ) -> ClusterResult<()> {
        self.enter()?;
        let mut state = self.state.write().await;
        if state.namespaces.contains_key(name) {
            return Err(ClusterError::AlreadyExists(format!("namespace {}", name)));
        }
        debug!(namespace = name, "creating namespace");
        state.namespaces.insert(
            name.to_string(),
            NamespaceEntry {
                labels: labels.clone(),
                terminating: None,
            },
        );
        Ok(())
    }

    async fn delete_namespace(&self, name: &str) -> ClusterResult<()> {
        self.enter()?;
        let mut state = self.state.write().await;
        if !state.namespaces.contains_key(name) {
            return Err(ClusterError::NotFound {
                kind: "Namespace".into(),
                namespace: String::new(),
                name: name.to_string(),
            });
        }
        state.resources.retain(|key, _| key.namespace != name);
        if self.deletion_polls == 0 {
            state.namespaces.remove(name);
        } else if let Some(entry) = state.namespaces.get_mut(name) {
            entry.terminating.get_or_insert(self.deletion_polls);
        }
        debug!(namespace = name, "deleting namespace");
        Ok(())
    }

    async fn namespace_exists(&self, name: &str) -> ClusterResult<bool> {
        self.enter()?;
        let mut state = self.state.write().await;
        let gone = match state.namespaces.get_mut(name) {
            None => return Ok(false),
            Some(NamespaceEntry {
                terminating: Some(remaining),
                ..
            }) => {
                *remaining = remaining.saturating_sub(1);
                *remaining == 0
            }
            Some(_) => false,
        };
        if gone {
            state.namespaces.remove(name);
            return Ok(false);
        }
        Ok(true)
    }

    async fn apply(&self, resource: Resource) -> ClusterResult<()> {
        self.enter()?;
        let mut resource = resource;
        let mut state = self.state.write().await;
        require_active(&state, &resource.key.namespace)?;
        self.reconcile(&mut resource);
        state.resources.insert(resource.key.clone(), resource);
        Ok(())
    }

    async fn get(&self, key: &ResourceKey) -> ClusterResult<Option<Resource>> {
        self.enter()?;
        let state = self.state.read().await;
        Ok(state.resources.get(key).cloned())
    }

    async fn delete(&self, key: &ResourceKey) -> ClusterResult<()> {
        self.enter()?;
        let mut state = self.state.write().await;
        match state.resources.remove(key) {
            Some(_) => Ok(()),
            None => Err(ClusterError::NotFound {
                kind: key.kind.clone(),
                namespace: key.namespace.clone(),
                name: key.name.clone(),
            }),
        }
    }

    async fn list(&self, kind: &str, namespace: &str) -> ClusterResult<Vec<Resource>> {
        self.enter()?;
        let state = self.state.read().await;
        Ok(state
            .resources
            .values()
            .filter(|r| r.key.kind == kind && r.key.namespace == namespace)
            .cloned()
            .collect())
    }
}
