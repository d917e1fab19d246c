//! Gateway conformance core types.
//!
//! Shared vocabulary for the conformance orchestrator:
//!
//! - [`Feature`] and [`FeatureRegistry`]: the closed set of optional
//!   capabilities a test may require, each tagged with a release [`Channel`].
//! - [`Profile`] and [`ProfileRegistry`]: certification tiers built from core
//!   and extended feature sets.
//! - [`Implementation`]: metadata describing the implementation under test.
//! - [`TestOutcome`]: the immutable result of one catalog entry.
//! - [`ConformanceReport`]: the serialized artifact handed to certification
//!   consumers.

pub mod error;
pub mod feature;
pub mod implementation;
pub mod outcome;
pub mod profile;
pub mod report;

pub use error::{ConfigError, ConfigResult};
pub use feature::{Channel, Feature, FeatureInfo, FeatureRegistry};
pub use implementation::Implementation;
pub use outcome::{
    TestOutcome, TestStatus, REASON_EXPLICITLY_SKIPPED, REASON_NOT_IN_PROFILE, REASON_RUN_ABORTED,
    REASON_RUN_CANCELLED,
};
pub use profile::{Profile, ProfileName, ProfileRegistry};
pub use report::{
    ConformanceReport, CoreResult, ExtendedResult, ProfileReport, ProfileStatus, Statistics,
    GATEWAY_API_VERSION, REPORT_API_VERSION, REPORT_KIND,
};
