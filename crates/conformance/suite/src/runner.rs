//! Suite runner.
//!
//! Executes a planned sequence of tests against the shared cluster and turns
//! every execution into a [`TestOutcome`]. Test bodies never take the run down
//! with them: returned errors, panics and timeouts all become `Failed`
//! outcomes. Two things do stop the run early: a fatal cluster error (the
//! connection is gone) and cancellation.

use futures::future::join_all;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{debug, error, info, instrument, warn};

use conformance_types::{TestOutcome, REASON_RUN_ABORTED, REASON_RUN_CANCELLED};

use crate::cancel::CancelToken;
use crate::catalog::{IsolationScope, PlannedTest, TestCase};
use crate::cluster::ClusterClient;
use crate::config::{ConformanceOptions, Timeouts};
use crate::context::{SharedState, TestContext};
use crate::error::{TestFailure, TestResult};
use crate::isolation::IsolationArena;
use crate::resolver::SupportedFeatureSet;

/// Everything a run produced.
#[derive(Debug, Clone, Default)]
pub struct RunRecord {
    /// One outcome per planned test, in catalog order.
    pub outcomes: Vec<TestOutcome>,
    /// Fatal cluster error that cut the run short.
    pub aborted: Option<String>,
    /// The run was cancelled before every planned test finished.
    pub cancelled: bool,
}

/// How a single test execution ended, from the runner's point of view.
enum Execution {
    Finished(TestOutcome),
    Aborted(String),
    Cancelled,
}

/// Why the remaining tests are not executed.
enum Stop {
    Aborted(String),
    Cancelled,
}

impl Stop {
    fn reason(&self) -> String {
        match self {
            Stop::Aborted(reason) => format!("{}: {}", REASON_RUN_ABORTED, reason),
            Stop::Cancelled => REASON_RUN_CANCELLED.to_string(),
        }
    }
}

/// Runs planned tests with isolation, retries and bounded concurrency.
pub struct SuiteRunner {
    shared: Arc<SharedState>,
    arena: Arc<IsolationArena>,
    cleanup: bool,
    retries: u32,
    parallelism: usize,
}

impl SuiteRunner {
    pub fn new(
        cluster: Arc<dyn ClusterClient>,
        supported: SupportedFeatureSet,
        options: &ConformanceOptions,
    ) -> Self {
        let arena = Arc::new(IsolationArena::new(
            Arc::clone(&cluster),
            options.namespace_labels.clone(),
            options.timeouts.teardown,
            options.timeouts.poll_interval,
        ));
        let shared = Arc::new(SharedState {
            cluster,
            supported,
            namespace_labels: options.namespace_labels.clone(),
            gateway_class: options.gateway_class.clone(),
            timeouts: options.timeouts,
            debug: options.debug,
        });

        Self {
            shared,
            arena,
            cleanup: options.cleanup,
            retries: options.retries,
            parallelism: options.parallelism.max(1),
        }
    }

    /// The arena that owns this run's isolation units.
    pub fn arena(&self) -> &Arc<IsolationArena> {
        &self.arena
    }

    pub fn timeouts(&self) -> Timeouts {
        self.shared.timeouts
    }

    /// Run `planned` to completion, abort or cancellation.
    pub async fn run(&self, planned: Vec<PlannedTest>, cancel: CancelToken) -> RunRecord {
        let total = planned.len();
        let mut slots: Vec<Option<TestOutcome>> = vec![None; total];
        let mut stop: Option<Stop> = None;

        info!(
            total,
            runnable = planned.iter().filter(|p| p.is_run()).count(),
            parallelism = self.parallelism,
            "starting conformance run"
        );

        let mut index = 0;
        while index < total {
            if stop.is_none() && cancel.is_cancelled() {
                warn!("run cancelled; skipping remaining tests");
                stop = Some(Stop::Cancelled);
            }

            let entry = &planned[index];
            if let Some(stop) = &stop {
                let test = entry.test();
                slots[index] =
                    Some(TestOutcome::skipped(&test.name, test.features.clone(), stop.reason()));
                index += 1;
                continue;
            }

            match entry {
                PlannedTest::Skip { test, reason } => {
                    slots[index] = Some(skip(test, reason));
                    index += 1;
                }
                PlannedTest::Run(test)
                    if self.parallelism > 1 && test.isolation == IsolationScope::Shared =>
                {
                    let mut batch = Vec::new();
                    let mut next = index;
                    while next < total {
                        match &planned[next] {
                            PlannedTest::Run(t) if t.isolation == IsolationScope::Shared => {
                                batch.push((next, Arc::clone(t)));
                            }
                            PlannedTest::Skip { test, reason } => {
                                slots[next] = Some(skip(test, reason));
                            }
                            PlannedTest::Run(_) => break,
                        }
                        next += 1;
                    }

                    debug!(size = batch.len(), "running shared batch");
                    for (slot, test, execution) in self.execute_batch(batch, &cancel).await {
                        slots[slot] = Some(record(&test, execution, &mut stop));
                    }
                    index = next;
                }
                PlannedTest::Run(test) => {
                    let execution = self.execute(test, &cancel).await;
                    slots[index] = Some(record(test, execution, &mut stop));
                    index += 1;
                }
            }
        }

        let outcomes: Vec<TestOutcome> = slots.into_iter().flatten().collect();
        let (aborted, cancelled) = match stop {
            Some(Stop::Aborted(reason)) => (Some(reason), false),
            Some(Stop::Cancelled) => (None, true),
            None => (None, false),
        };

        info!(
            passed = outcomes.iter().filter(|o| o.is_passed()).count(),
            failed = outcomes.iter().filter(|o| o.is_failed()).count(),
            skipped = outcomes.iter().filter(|o| o.is_skipped()).count(),
            "conformance run finished"
        );

        RunRecord {
            outcomes,
            aborted,
            cancelled,
        }
    }

    async fn execute_batch(
        &self,
        batch: Vec<(usize, Arc<TestCase>)>,
        cancel: &CancelToken,
    ) -> Vec<(usize, Arc<TestCase>, Execution)> {
        let semaphore = Semaphore::new(self.parallelism);
        let semaphore = &semaphore;
        // First fatal error seen in the batch; queued tests must not start after it.
        let aborted: OnceLock<String> = OnceLock::new();
        let aborted = &aborted;

        join_all(batch.into_iter().map(|(slot, test)| async move {
            let _permit = semaphore.acquire().await.ok();
            let execution = if let Some(reason) = aborted.get() {
                debug!(test = %test.name, "not started; run aborted");
                Execution::Aborted(reason.clone())
            } else if cancel.is_cancelled() {
                debug!(test = %test.name, "not started; run cancelled");
                Execution::Cancelled
            } else {
                self.execute(&test, cancel).await
            };
            if let Execution::Aborted(reason) = &execution {
                let _ = aborted.set(reason.clone());
            }
            (slot, test, execution)
        }))
        .await
    }

    /// Run one test, retrying retryable failures.
    #[instrument(skip_all, fields(test = %test.name))]
    async fn execute(&self, test: &TestCase, cancel: &CancelToken) -> Execution {
        let start = Instant::now();
        let mut attempts = 0;

        loop {
            if cancel.is_cancelled() {
                return Execution::Cancelled;
            }
            attempts += 1;
            debug!(attempt = attempts, "running test");

            let failure = match self.attempt(test, cancel).await {
                Ok(()) => {
                    let elapsed = start.elapsed();
                    info!(attempts, ?elapsed, "PASS");
                    return Execution::Finished(TestOutcome::passed(
                        &test.name,
                        test.features.clone(),
                        attempts,
                        elapsed,
                    ));
                }
                Err(failure) => failure,
            };

            if failure.is_fatal() {
                error!(%failure, "fatal cluster error; aborting run");
                return Execution::Aborted(failure.to_string());
            }
            if failure == TestFailure::Cancelled || cancel.is_cancelled() {
                return Execution::Cancelled;
            }
            if failure.is_retryable() && attempts <= self.retries {
                warn!(attempt = attempts, %failure, "test failed; retrying");
                continue;
            }

            let elapsed = start.elapsed();
            warn!(attempts, ?elapsed, %failure, "FAIL");
            return Execution::Finished(TestOutcome::failed(
                &test.name,
                test.features.clone(),
                failure.to_string(),
                attempts,
                elapsed,
            ));
        }
    }

    /// One attempt: acquire isolation, run the body under a timeout with
    /// panic capture, then release or retain the unit.
    async fn attempt(&self, test: &TestCase, cancel: &CancelToken) -> TestResult {
        let unit = match test.isolation {
            IsolationScope::Shared => None,
            IsolationScope::DedicatedNamespace => Some(self.arena.acquire(&test.name).await?),
        };

        let ctx = TestContext::new(
            Arc::clone(&self.shared),
            &test.name,
            unit.as_ref().map(|u| u.namespace()),
            cancel.clone(),
        );
        let result = run_guarded(test, ctx, self.shared.timeouts.test, cancel).await;

        if let Some(unit) = unit {
            if self.cleanup {
                let namespace = unit.namespace().to_string();
                if let Err(err) = self.arena.release(unit).await {
                    warn!(namespace = %namespace, %err, "failed to release isolation unit");
                }
            } else {
                self.arena.retain(unit);
            }
        }

        result
    }
}

/// Run a test body with timeout, panic capture and cancellation.
async fn run_guarded(
    test: &TestCase,
    ctx: TestContext,
    timeout: Duration,
    cancel: &CancelToken,
) -> TestResult {
    if cancel.is_cancelled() {
        return Err(TestFailure::Cancelled);
    }

    let body = Arc::clone(&test.body);
    let guarded = AssertUnwindSafe(async move { body.run(ctx).await }).catch_unwind();

    tokio::select! {
        biased;

        _ = cancel.cancelled() => Err(TestFailure::Cancelled),
        result = tokio::time::timeout(timeout, guarded) => match result {
            Ok(Ok(result)) => result,
            Ok(Err(payload)) => Err(TestFailure::Panicked(panic_message(payload))),
            Err(_) => Err(TestFailure::Timeout {
                what: format!("test {}", test.name),
                elapsed: timeout,
            }),
        },
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

fn skip(test: &TestCase, reason: &str) -> TestOutcome {
    info!(test = %test.name, reason, "SKIP");
    TestOutcome::skipped(&test.name, test.features.clone(), reason)
}

fn record(test: &TestCase, execution: Execution, stop: &mut Option<Stop>) -> TestOutcome {
    match execution {
        Execution::Finished(outcome) => outcome,
        Execution::Aborted(reason) => {
            let stop = stop.get_or_insert(Stop::Aborted(reason));
            TestOutcome::skipped(&test.name, test.features.clone(), stop.reason())
        }
        Execution::Cancelled => {
            let stop = stop.get_or_insert(Stop::Cancelled);
            TestOutcome::skipped(&test.name, test.features.clone(), stop.reason())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::cancellation;
    use crate::catalog::TestBody;
    use crate::cluster::{MemoryCluster, Resource, ResourceKey};
    use async_trait::async_trait;
    use conformance_types::{Feature, TestStatus, REASON_EXPLICITLY_SKIPPED};
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn options() -> ConformanceOptions {
        ConformanceOptions {
            timeouts: Timeouts {
                test: Duration::from_secs(5),
                reconcile: Duration::from_millis(100),
                teardown: Duration::from_secs(1),
                poll_interval: Duration::from_millis(1),
            },
            ..Default::default()
        }
    }

    fn runner(cluster: Arc<MemoryCluster>, options: &ConformanceOptions) -> SuiteRunner {
        SuiteRunner::new(cluster, Feature::ALL.iter().copied().collect(), options)
    }

    fn passing(name: &str) -> PlannedTest {
        PlannedTest::Run(Arc::new(TestCase::from_fn(name, |_ctx| async { Ok(()) })))
    }

    struct Panics(&'static str);

    #[async_trait]
    impl TestBody for Panics {
        async fn run(&self, _ctx: TestContext) -> TestResult {
            panic!("{}", self.0)
        }
    }

    fn statuses(record: &RunRecord) -> Vec<(&str, TestStatus)> {
        record
            .outcomes
            .iter()
            .map(|o| (o.name.as_str(), o.status))
            .collect()
    }

    #[tokio::test]
    async fn test_panic_becomes_failure_and_run_continues() {
        let cluster = Arc::new(MemoryCluster::new());
        let planned = vec![
            PlannedTest::Run(Arc::new(TestCase::new("Panics", Panics("listener map corrupted")))),
            passing("After"),
        ];

        let record = runner(cluster, &options()).run(planned, CancelToken::never()).await;
        assert_eq!(
            statuses(&record),
            vec![("Panics", TestStatus::Failed), ("After", TestStatus::Passed)]
        );
        assert_eq!(
            record.outcomes[0].detail.as_deref(),
            Some("test panicked: listener map corrupted")
        );
        assert!(record.aborted.is_none());
    }

    #[tokio::test]
    async fn test_timeout_becomes_failure() {
        let cluster = Arc::new(MemoryCluster::new());
        let mut opts = options();
        opts.timeouts.test = Duration::from_millis(20);
        let planned = vec![PlannedTest::Run(Arc::new(TestCase::from_fn("Slow", |_ctx| async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(())
        })))];

        let record = runner(cluster, &opts).run(planned, CancelToken::never()).await;
        assert_eq!(record.outcomes[0].status, TestStatus::Failed);
        assert!(record.outcomes[0].detail.as_deref().unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_planned_skip_is_recorded() {
        let cluster = Arc::new(MemoryCluster::new());
        let test = Arc::new(TestCase::new("Skipped", Panics("must not run")));
        let planned = vec![PlannedTest::Skip {
            test,
            reason: REASON_EXPLICITLY_SKIPPED.to_string(),
        }];

        let record = runner(cluster, &options()).run(planned, CancelToken::never()).await;
        assert_eq!(record.outcomes[0].status, TestStatus::Skipped);
        assert_eq!(record.outcomes[0].attempts, 0);
        assert_eq!(record.outcomes[0].detail.as_deref(), Some(REASON_EXPLICITLY_SKIPPED));
    }

    #[tokio::test]
    async fn test_retries_rerun_failed_tests() {
        let cluster = Arc::new(MemoryCluster::new());
        let mut opts = options();
        opts.retries = 2;
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let planned = vec![PlannedTest::Run(Arc::new(
            TestCase::from_fn("Flaky", move |ctx| {
                let counter = Arc::clone(&counter);
                async move {
                    let call = counter.fetch_add(1, Ordering::SeqCst);
                    ctx.ensure(call >= 1, "first attempt fails")
                }
            })
            .isolated(),
        ))];

        let record = runner(cluster.clone(), &opts).run(planned, CancelToken::never()).await;
        assert_eq!(record.outcomes[0].status, TestStatus::Passed);
        assert_eq!(record.outcomes[0].attempts, 2);
        assert!(cluster.active_namespaces().await.is_empty());
    }

    #[tokio::test]
    async fn test_panics_are_not_retried() {
        let cluster = Arc::new(MemoryCluster::new());
        let mut opts = options();
        opts.retries = 3;
        let planned = vec![PlannedTest::Run(Arc::new(TestCase::new("Boom", Panics("boom"))))];

        let record = runner(cluster, &opts).run(planned, CancelToken::never()).await;
        assert_eq!(record.outcomes[0].attempts, 1);
    }

    #[tokio::test]
    async fn test_isolation_released_on_every_exit_path() {
        let cluster = Arc::new(MemoryCluster::new());
        let mut opts = options();
        opts.timeouts.test = Duration::from_millis(50);
        let planned = vec![
            PlannedTest::Run(Arc::new(
                TestCase::from_fn("Pass", |ctx| async move {
                    let key = ResourceKey::new("HTTPRoute", ctx.namespace(), "route");
                    ctx.cluster().apply(Resource::new(key.clone(), json!({}))).await?;
                    ctx.wait_for_condition(&key, "Accepted").await.map(|_| ())
                })
                .isolated(),
            )),
            PlannedTest::Run(Arc::new(
                TestCase::from_fn("Fail", |ctx| async move { ctx.ensure(false, "nope") })
                    .isolated(),
            )),
            PlannedTest::Run(Arc::new(TestCase::new("Panic", Panics("boom")).isolated())),
            PlannedTest::Run(Arc::new(
                TestCase::from_fn("Timeout", |_ctx| async {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    Ok(())
                })
                .isolated(),
            )),
        ];

        let runner = runner(cluster.clone(), &opts);
        let record = runner.run(planned, CancelToken::never()).await;
        assert_eq!(
            statuses(&record),
            vec![
                ("Pass", TestStatus::Passed),
                ("Fail", TestStatus::Failed),
                ("Panic", TestStatus::Failed),
                ("Timeout", TestStatus::Failed),
            ]
        );
        assert!(cluster.active_namespaces().await.is_empty());
        assert!(runner.arena().held().is_empty());
    }

    #[tokio::test]
    async fn test_isolation_retained_without_cleanup() {
        let cluster = Arc::new(MemoryCluster::new());
        let mut opts = options();
        opts.cleanup = false;
        let planned = vec![PlannedTest::Run(Arc::new(
            TestCase::from_fn("Keep", |ctx| async move { ctx.ensure(false, "inspect me") })
                .isolated(),
        ))];

        runner(cluster.clone(), &opts).run(planned, CancelToken::never()).await;
        let namespaces = cluster.active_namespaces().await;
        assert_eq!(namespaces.len(), 1);
        assert!(namespaces[0].starts_with("gateway-conformance-keep-"));
    }

    #[tokio::test]
    async fn test_fatal_error_aborts_remaining() {
        let cluster = Arc::new(MemoryCluster::new());
        let revoker = Arc::clone(&cluster);
        let planned = vec![
            passing("First"),
            PlannedTest::Run(Arc::new(TestCase::from_fn("Revokes", move |ctx| {
                let revoker = Arc::clone(&revoker);
                async move {
                    revoker.revoke("token expired");
                    ctx.cluster().check_connection().await?;
                    Ok(())
                }
            }))),
            passing("Last"),
        ];

        let record = runner(cluster, &options()).run(planned, CancelToken::never()).await;
        assert_eq!(
            statuses(&record),
            vec![
                ("First", TestStatus::Passed),
                ("Revokes", TestStatus::Skipped),
                ("Last", TestStatus::Skipped),
            ]
        );
        assert_eq!(record.aborted.as_deref(), Some("unauthorized: token expired"));
        assert_eq!(
            record.outcomes[2].detail.as_deref(),
            Some("run aborted: unauthorized: token expired")
        );
    }

    #[tokio::test]
    async fn test_cancellation_skips_remaining() {
        let cluster = Arc::new(MemoryCluster::new());
        let (handle, token) = cancellation();
        let handle = Arc::new(handle);
        let canceller = Arc::clone(&handle);
        let planned = vec![
            passing("Done"),
            PlannedTest::Run(Arc::new(TestCase::from_fn("Cancels", move |ctx| {
                let canceller = Arc::clone(&canceller);
                async move {
                    canceller.cancel();
                    ctx.wait_for("forever", Duration::from_secs(30), || async { Ok(false) })
                        .await
                }
            }))),
            passing("NeverStarted"),
        ];

        let record = runner(cluster, &options()).run(planned, token).await;
        assert!(record.cancelled);
        assert_eq!(record.outcomes[0].status, TestStatus::Passed);
        assert_eq!(record.outcomes[1].detail.as_deref(), Some(REASON_RUN_CANCELLED));
        assert_eq!(record.outcomes[2].detail.as_deref(), Some(REASON_RUN_CANCELLED));
    }

    #[tokio::test]
    async fn test_parallel_batch_preserves_catalog_order() {
        let cluster = Arc::new(MemoryCluster::new());
        let mut opts = options();
        opts.parallelism = 4;

        let mut planned = Vec::new();
        for i in 0..6u64 {
            planned.push(PlannedTest::Run(Arc::new(TestCase::from_fn(
                format!("Shared{}", i),
                move |_ctx| async move {
                    tokio::time::sleep(Duration::from_millis(30 - i * 5)).await;
                    Ok(())
                },
            ))));
        }
        planned.push(PlannedTest::Run(Arc::new(
            TestCase::from_fn("Dedicated", |_ctx| async { Ok(()) }).isolated(),
        )));

        let record = runner(cluster, &opts).run(planned, CancelToken::never()).await;
        let names: Vec<&str> = record.outcomes.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["Shared0", "Shared1", "Shared2", "Shared3", "Shared4", "Shared5", "Dedicated"]
        );
        assert!(record.outcomes.iter().all(|o| o.is_passed()));
    }

    #[tokio::test]
    async fn test_parallel_batch_skips_queued_tests_after_cancel() {
        // Batch scheduling varies between runs; every run must skip the queued test.
        for _ in 0..20 {
            let cluster = Arc::new(MemoryCluster::new());
            let mut opts = options();
            opts.parallelism = 2;
            let (handle, token) = cancellation();
            let handle = Arc::new(handle);
            let canceller = Arc::clone(&handle);
            let planned = vec![
                PlannedTest::Run(Arc::new(TestCase::from_fn("Canceller", move |_ctx| {
                    let canceller = Arc::clone(&canceller);
                    async move {
                        canceller.cancel();
                        Ok(())
                    }
                }))),
                PlannedTest::Run(Arc::new(TestCase::from_fn("Busy", |ctx| async move {
                    ctx.wait_for("forever", Duration::from_secs(5), || async { Ok(false) })
                        .await
                }))),
                PlannedTest::Run(Arc::new(TestCase::new("Queued", Panics("must not run")))),
            ];

            let record = runner(cluster, &opts).run(planned, token).await;
            assert!(record.cancelled);
            assert_eq!(record.outcomes[2].name, "Queued");
            assert_eq!(record.outcomes[2].status, TestStatus::Skipped);
            assert_eq!(record.outcomes[2].detail.as_deref(), Some(REASON_RUN_CANCELLED));
            assert_eq!(record.outcomes[2].attempts, 0);
        }
    }

    #[tokio::test]
    async fn test_parallel_batch_skips_queued_tests_after_fatal_error() {
        let cluster = Arc::new(MemoryCluster::new());
        let revoker = Arc::clone(&cluster);
        let mut opts = options();
        opts.parallelism = 2;
        let planned = vec![
            PlannedTest::Run(Arc::new(TestCase::from_fn("Revokes", move |ctx| {
                let revoker = Arc::clone(&revoker);
                async move {
                    revoker.revoke("token expired");
                    ctx.cluster().check_connection().await?;
                    Ok(())
                }
            }))),
            passing("QueuedFirst"),
            passing("QueuedSecond"),
        ];

        let record = runner(cluster, &opts).run(planned, CancelToken::never()).await;
        assert_eq!(
            statuses(&record),
            vec![
                ("Revokes", TestStatus::Skipped),
                ("QueuedFirst", TestStatus::Skipped),
                ("QueuedSecond", TestStatus::Skipped),
            ]
        );
        assert_eq!(record.aborted.as_deref(), Some("unauthorized: token expired"));
        for outcome in &record.outcomes[1..] {
            assert_eq!(
                outcome.detail.as_deref(),
                Some("run aborted: unauthorized: token expired")
            );
            assert_eq!(outcome.attempts, 0);
        }
    }

    #[tokio::test]
    async fn test_cancelled_token_prevents_body_from_running() {
        let cluster = Arc::new(MemoryCluster::new());
        let (handle, token) = cancellation();
        handle.cancel();
        let runner = runner(cluster, &options());
        let test = TestCase::new("Instant", Panics("must not run"));

        let execution = runner.execute(&test, &token).await;
        assert!(matches!(execution, Execution::Cancelled));
    }
}
