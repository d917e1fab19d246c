//! Test context and assertion surface.
//!
//! Every test body receives a [`TestContext`]: the shared cluster handle, the
//! resolved capabilities, namespace labels, its isolation namespace and the
//! run's timeouts. Assertions return [`TestFailure`] values rather than
//! panicking, and every wait is bounded and cancellable.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

use conformance_types::Feature;

use crate::cancel::CancelToken;
use crate::cluster::{ClusterClient, Resource, ResourceKey};
use crate::config::{Timeouts, INFRA_NAMESPACE};
use crate::error::{ClusterError, TestFailure, TestResult};
use crate::resolver::SupportedFeatureSet;

/// Run-wide state shared by every test context.
pub(crate) struct SharedState {
    pub(crate) cluster: Arc<dyn ClusterClient>,
    pub(crate) supported: SupportedFeatureSet,
    pub(crate) namespace_labels: BTreeMap<String, String>,
    pub(crate) gateway_class: String,
    pub(crate) timeouts: Timeouts,
    pub(crate) debug: bool,
}

/// Handle passed to a test body.
#[derive(Clone)]
pub struct TestContext {
    shared: Arc<SharedState>,
    test_name: Arc<str>,
    namespace: String,
    cancel: CancelToken,
}

impl TestContext {
    pub(crate) fn new(
        shared: Arc<SharedState>,
        test_name: &str,
        namespace: Option<&str>,
        cancel: CancelToken,
    ) -> Self {
        Self {
            shared,
            test_name: Arc::from(test_name),
            namespace: namespace.unwrap_or(INFRA_NAMESPACE).to_string(),
            cancel,
        }
    }

    pub fn cluster(&self) -> &dyn ClusterClient {
        self.shared.cluster.as_ref()
    }

    pub fn supported_features(&self) -> &SupportedFeatureSet {
        &self.shared.supported
    }

    pub fn supports(&self, feature: Feature) -> bool {
        self.shared.supported.contains(feature)
    }

    pub fn namespace_labels(&self) -> &BTreeMap<String, String> {
        &self.shared.namespace_labels
    }

    pub fn gateway_class(&self) -> &str {
        &self.shared.gateway_class
    }

    /// The test's dedicated namespace, or the shared infra namespace for
    /// shared-scope tests.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn test_name(&self) -> &str {
        &self.test_name
    }

    pub fn timeouts(&self) -> Timeouts {
        self.shared.timeouts
    }

    pub fn debug(&self) -> bool {
        self.shared.debug
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Fail with `message` unless `condition` holds.
    pub fn ensure(&self, condition: bool, message: impl Into<String>) -> TestResult {
        if condition {
            Ok(())
        } else {
            Err(TestFailure::Assertion(message.into()))
        }
    }

    /// Fail unless `actual == expected`.
    pub fn ensure_eq<T>(&self, actual: &T, expected: &T, what: &str) -> TestResult
    where
        T: PartialEq + std::fmt::Debug + ?Sized,
    {
        if actual == expected {
            Ok(())
        } else {
            Err(TestFailure::Assertion(format!(
                "{}: expected {:?}, got {:?}",
                what, expected, actual
            )))
        }
    }

    /// Poll `check` until it returns `true`, the timeout elapses, or the run is
    /// cancelled. Fatal cluster errors stop polling immediately; other errors
    /// are treated as "not yet".
    pub async fn wait_for<F, Fut>(&self, what: &str, timeout: Duration, mut check: F) -> TestResult
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<bool, ClusterError>>,
    {
        let start = Instant::now();
        let interval = self.shared.timeouts.poll_interval;

        loop {
            match check().await {
                Ok(true) => return Ok(()),
                Ok(false) => {}
                Err(err) if err.is_fatal() => return Err(TestFailure::Cluster(err)),
                Err(err) => debug!(test = %self.test_name, %err, "poll attempt failed"),
            }

            let elapsed = start.elapsed();
            if elapsed >= timeout {
                return Err(TestFailure::Timeout {
                    what: what.to_string(),
                    elapsed,
                });
            }

            let nap = interval.min(timeout - elapsed);
            tokio::select! {
                _ = tokio::time::sleep(nap) => {}
                _ = self.cancel.cancelled() => return Err(TestFailure::Cancelled),
            }
        }
    }

    /// Wait until `key` exists and carries condition `condition_type=True`,
    /// bounded by the run's reconcile timeout. Returns the observed object.
    pub async fn wait_for_condition(
        &self,
        key: &ResourceKey,
        condition_type: &str,
    ) -> Result<Resource, TestFailure> {
        let what = format!("{} condition {}=True", key, condition_type);
        let observed = std::sync::Mutex::new(None);

        self.wait_for(&what, self.shared.timeouts.reconcile, || async {
            self.cluster().get(key).await.map(|resource| {
                let ready = resource
                    .as_ref()
                    .map(|r| r.condition_true(condition_type))
                    .unwrap_or(false);
                if ready {
                    if let Ok(mut slot) = observed.lock() {
                        *slot = resource;
                    }
                }
                ready
            })
        })
        .await?;

        observed
            .into_inner()
            .ok()
            .flatten()
            .ok_or_else(|| TestFailure::assertion(format!("{} vanished after becoming ready", key)))
    }
}

impl std::fmt::Debug for TestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestContext")
            .field("test", &self.test_name)
            .field("namespace", &self.namespace)
            .field("gateway_class", &self.shared.gateway_class)
            .finish()
    }
}
