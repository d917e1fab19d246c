//! Per-test outcomes.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::feature::Feature;

/// Reason recorded for tests named in the skip list.
pub const REASON_EXPLICITLY_SKIPPED: &str = "explicitly skipped";
/// Reason recorded for tests left over after cancellation.
pub const REASON_RUN_CANCELLED: &str = "run cancelled";
/// Prefix of the reason recorded for tests left over after a fatal cluster error.
pub const REASON_RUN_ABORTED: &str = "run aborted";
/// Reason recorded for tests that no requested profile covers.
pub const REASON_NOT_IN_PROFILE: &str = "not part of any requested profile";

/// Final status of one test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TestStatus {
    Passed,
    Failed,
    Skipped,
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestStatus::Passed => write!(f, "passed"),
            TestStatus::Failed => write!(f, "failed"),
            TestStatus::Skipped => write!(f, "skipped"),
        }
    }
}

/// Outcome of one catalog entry in one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestOutcome {
    pub name: String,
    /// Features the test requires, copied from the catalog entry.
    pub features: Vec<Feature>,
    pub status: TestStatus,
    /// Failure diagnostics or skip reason.
    pub detail: Option<String>,
    /// Executions performed; zero for skipped tests.
    pub attempts: u32,
    pub duration: Duration,
}

impl TestOutcome {
    pub fn passed(
        name: impl Into<String>,
        features: Vec<Feature>,
        attempts: u32,
        duration: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            features,
            status: TestStatus::Passed,
            detail: None,
            attempts,
            duration,
        }
    }

    pub fn failed(
        name: impl Into<String>,
        features: Vec<Feature>,
        detail: impl Into<String>,
        attempts: u32,
        duration: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            features,
            status: TestStatus::Failed,
            detail: Some(detail.into()),
            attempts,
            duration,
        }
    }

    pub fn skipped(
        name: impl Into<String>,
        features: Vec<Feature>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            features,
            status: TestStatus::Skipped,
            detail: Some(reason.into()),
            attempts: 0,
            duration: Duration::ZERO,
        }
    }

    pub fn is_passed(&self) -> bool {
        self.status == TestStatus::Passed
    }

    pub fn is_failed(&self) -> bool {
        self.status == TestStatus::Failed
    }

    pub fn is_skipped(&self) -> bool {
        self.status == TestStatus::Skipped
    }
}
