//! Test catalog and run planning.
//!
//! A [`TestCatalog`] is an ordered, name-unique list of [`TestCase`]s built
//! once and handed to the orchestrator. [`plan`] decides, per run, which of
//! them execute and why the rest are skipped.

use async_trait::async_trait;
use std::collections::BTreeSet;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::warn;

use conformance_types::{
    ConfigError, ConfigResult, Feature, ProfileName, ProfileRegistry, REASON_EXPLICITLY_SKIPPED,
    REASON_NOT_IN_PROFILE,
};

use crate::context::TestContext;
use crate::error::TestResult;
use crate::resolver::SupportedFeatureSet;

/// Whether a test shares the base namespaces or needs its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationScope {
    /// Read-only against shared fixtures; may run concurrently.
    Shared,
    /// Gets a fresh namespace acquired before and released after the test.
    DedicatedNamespace,
}

/// Executable behavior of a test.
#[async_trait]
pub trait TestBody: Send + Sync {
    async fn run(&self, ctx: TestContext) -> TestResult;
}

/// Adapts an async closure into a [`TestBody`].
struct FnBody<F>(F);

#[async_trait]
impl<F, Fut> TestBody for FnBody<F>
where
    F: Fn(TestContext) -> Fut + Send + Sync,
    Fut: Future<Output = TestResult> + Send + 'static,
{
    async fn run(&self, ctx: TestContext) -> TestResult {
        (self.0)(ctx).await
    }
}

/// One registered conformance test.
#[derive(Clone)]
pub struct TestCase {
    pub name: String,
    pub description: String,
    /// Required features in declaration order. Empty means always applicable.
    pub features: Vec<Feature>,
    pub isolation: IsolationScope,
    pub body: Arc<dyn TestBody>,
}

impl TestCase {
    pub fn new(name: impl Into<String>, body: impl TestBody + 'static) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            features: Vec::new(),
            isolation: IsolationScope::Shared,
            body: Arc::new(body),
        }
    }

    /// Build a test from an async closure.
    pub fn from_fn<F, Fut>(name: impl Into<String>, body: F) -> Self
    where
        F: Fn(TestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = TestResult> + Send + 'static,
    {
        Self::new(name, FnBody(body))
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_features(mut self, features: impl IntoIterator<Item = Feature>) -> Self {
        for feature in features {
            if !self.features.contains(&feature) {
                self.features.push(feature);
            }
        }
        self
    }

    pub fn isolated(mut self) -> Self {
        self.isolation = IsolationScope::DedicatedNamespace;
        self
    }
}

impl fmt::Debug for TestCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestCase")
            .field("name", &self.name)
            .field("features", &self.features)
            .field("isolation", &self.isolation)
            .finish()
    }
}

/// Ordered collection of test cases with unique names.
#[derive(Debug, Clone, Default)]
pub struct TestCatalog {
    tests: Vec<Arc<TestCase>>,
}

impl TestCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a test. Names must be unique.
    pub fn register(&mut self, test: TestCase) -> ConfigResult<()> {
        if self.get(&test.name).is_some() {
            return Err(ConfigError::DuplicateTest(test.name));
        }
        self.tests.push(Arc::new(test));
        Ok(())
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(mut self, test: TestCase) -> ConfigResult<Self> {
        self.register(test)?;
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<&Arc<TestCase>> {
        self.tests.iter().find(|t| t.name == name)
    }

    /// Tests in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<TestCase>> {
        self.tests.iter()
    }

    pub fn len(&self) -> usize {
        self.tests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tests.is_empty()
    }
}

/// The planner's decision for one catalog entry.
#[derive(Debug, Clone)]
pub enum PlannedTest {
    Run(Arc<TestCase>),
    Skip { test: Arc<TestCase>, reason: String },
}

impl PlannedTest {
    pub fn test(&self) -> &Arc<TestCase> {
        match self {
            PlannedTest::Run(test) => test,
            PlannedTest::Skip { test, .. } => test,
        }
    }

    pub fn is_run(&self) -> bool {
        matches!(self, PlannedTest::Run(_))
    }
}

/// Which of the requested profiles' features a test must touch to be run.
pub struct ProfileFilter<'a> {
    pub registry: &'a ProfileRegistry,
    pub requested: &'a BTreeSet<ProfileName>,
}

impl ProfileFilter<'_> {
    fn admits(&self, features: &[Feature]) -> bool {
        if self.requested.is_empty() || features.is_empty() {
            return true;
        }
        self.requested
            .iter()
            .filter_map(|name| self.registry.get(*name))
            .any(|profile| profile.includes_test(features))
    }
}

/// Decide, in catalog order, which tests run and why the others are skipped.
///
/// Precedence: explicit skip, then missing features, then profile filter.
pub fn plan<S: AsRef<str>>(
    catalog: &TestCatalog,
    supported: &SupportedFeatureSet,
    profiles: &ProfileFilter<'_>,
    skip_tests: &[S],
) -> Vec<PlannedTest> {
    let skip: BTreeSet<&str> = skip_tests.iter().map(|s| s.as_ref()).collect();
    for name in &skip {
        if catalog.get(name).is_none() {
            warn!(test = *name, "skip list names a test that is not in the catalog");
        }
    }

    catalog
        .iter()
        .map(|test| {
            let skip_reason = if skip.contains(test.name.as_str()) {
                Some(REASON_EXPLICITLY_SKIPPED.to_string())
            } else {
                let missing = supported.missing(&test.features);
                if !missing.is_empty() {
                    let names: Vec<&str> = missing.iter().map(|f| f.as_str()).collect();
                    Some(format!("missing required features: {}", names.join(", ")))
                } else if !profiles.admits(&test.features) {
                    Some(REASON_NOT_IN_PROFILE.to_string())
                } else {
                    None
                }
            };

            match skip_reason {
                Some(reason) => PlannedTest::Skip {
                    test: Arc::clone(test),
                    reason,
                },
                None => PlannedTest::Run(Arc::clone(test)),
            }
        })
        .collect()
}
