//! Error types for the conformance orchestrator.
//!
//! Three layers, matching how far an error is allowed to travel:
//!
//! - [`ClusterError`]: a cluster-client call failed. Fatal variants abort the
//!   run; everything else is local to the calling test.
//! - [`TestFailure`]: why one test did not pass. Recovered by the runner into
//!   a `Failed` outcome.
//! - [`OrchestratorError`]: a run-level failure that prevents a report.

use conformance_types::ConfigError;
use std::time::Duration;
use thiserror::Error;

/// Errors returned by a [`ClusterClient`](crate::cluster::ClusterClient).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClusterError {
    /// Credentials were rejected or expired.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The API server cannot be reached.
    #[error("connection lost: {0}")]
    ConnectionLost(String),

    #[error("{kind} {namespace}/{name} not found")]
    NotFound {
        kind: String,
        namespace: String,
        name: String,
    },

    #[error("{0} already exists")]
    AlreadyExists(String),

    /// Optimistic-concurrency or admission conflict.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("cluster operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("cluster error: {0}")]
    Other(String),
}

impl ClusterError {
    /// Whether the shared connection is unusable for the rest of the run.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Unauthorized(_) | Self::ConnectionLost(_))
    }
}

/// Convenience result type for cluster operations.
pub type ClusterResult<T> = Result<T, ClusterError>;

/// Why a single test did not pass.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TestFailure {
    /// An assertion on cluster state did not hold.
    #[error("assertion failed: {0}")]
    Assertion(String),

    /// A bounded wait or the whole test exceeded its timeout.
    #[error("timed out after {elapsed:?} waiting for {what}")]
    Timeout { what: String, elapsed: Duration },

    /// A cluster call made by the test failed.
    #[error(transparent)]
    Cluster(#[from] ClusterError),

    /// The test body panicked.
    #[error("test panicked: {0}")]
    Panicked(String),

    /// The run was cancelled while the test was waiting.
    #[error("cancelled")]
    Cancelled,
}

impl TestFailure {
    pub fn assertion(message: impl Into<String>) -> Self {
        Self::Assertion(message.into())
    }

    /// Fatal cluster errors abort the run instead of failing the test.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Cluster(err) if err.is_fatal())
    }

    /// Whether another attempt could produce a different result.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Panicked(_) | Self::Cancelled) && !self.is_fatal()
    }
}

/// Result type returned by test bodies.
pub type TestResult = Result<(), TestFailure>;

/// Run-level errors. None of these produce a report.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// Base fixtures could not be created or the cluster was unreachable
    /// before any test ran.
    #[error("cluster setup failed: {0}")]
    ClusterSetup(ClusterError),

    #[error("run cancelled before completion")]
    Cancelled,
}

/// Convenience result type for orchestrator operations.
pub type OrchestratorResult<T> = Result<T, OrchestratorError>;
