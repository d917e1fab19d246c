//! Gateway Conformance Orchestrator
//!
//! Runs a catalog of conformance tests against a cluster running a routing
//! implementation, restricted to the features the implementation claims to
//! support, and folds the outcomes into a per-profile certification report.
//!
//! # Pipeline
//!
//! | Stage | Module | Output |
//! |-------|--------|--------|
//! | Capability resolution | [`resolver`] | [`SupportedFeatureSet`] |
//! | Planning | [`catalog`] | [`PlannedTest`] per catalog entry |
//! | Execution | [`runner`] | [`RunRecord`] |
//! | Aggregation | [`aggregator`] | [`ConformanceReport`](conformance_types::ConformanceReport) |
//!
//! [`Orchestrator`] drives all four stages for one run.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use conformance_suite::{
//!     builtin_catalog, cancellation, ConformanceOptions, MemoryCluster, Orchestrator,
//! };
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let options = ConformanceOptions {
//!     supported_features: vec!["Gateway".into(), "HTTPRoute".into()],
//!     ..Default::default()
//! };
//! let cluster = Arc::new(MemoryCluster::new());
//! let orchestrator = Orchestrator::new(options, builtin_catalog()?, cluster)?;
//! let (_handle, token) = cancellation();
//!
//! orchestrator.setup().await?;
//! let report = orchestrator.run(token).await?;
//! println!("{}", report.to_yaml()?);
//! # Ok(())
//! # }
//! ```

pub mod aggregator;
pub mod cancel;
pub mod catalog;
pub mod cluster;
pub mod config;
pub mod context;
pub mod error;
pub mod isolation;
pub mod orchestrator;
pub mod resolver;
pub mod runner;
pub mod smoke;

// Re-export key types at crate root.
pub use aggregator::{aggregate, ReportHeader};
pub use cancel::{cancellation, CancelHandle, CancelToken};
pub use catalog::{
    plan, IsolationScope, PlannedTest, ProfileFilter, TestBody, TestCase, TestCatalog,
};
pub use cluster::{ClusterClient, MemoryCluster, Resource, ResourceKey};
pub use config::{
    parse_list, parse_namespace_labels, ConformanceOptions, ImplementationOptions, Timeouts,
    BASE_NAMESPACES, INFRA_NAMESPACE,
};
pub use context::TestContext;
pub use error::{
    ClusterError, ClusterResult, OrchestratorError, OrchestratorResult, TestFailure, TestResult,
};
pub use isolation::{IsolationArena, IsolationUnit};
pub use orchestrator::Orchestrator;
pub use resolver::{resolve, SupportedFeatureSet};
pub use runner::{RunRecord, SuiteRunner};
pub use smoke::builtin_catalog;
