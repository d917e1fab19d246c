//! Conformance report document.
//!
//! The report is serialized as YAML with a fixed field order and sorted
//! lists so that two reports for the same outcomes diff cleanly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::feature::Feature;
use crate::implementation::Implementation;
use crate::outcome::TestStatus;
use crate::profile::ProfileName;

pub const REPORT_API_VERSION: &str = "gateway.networking.k8s.io/v1alpha1";
pub const REPORT_KIND: &str = "ConformanceReport";
/// Version of the routing API the bundled catalog targets.
pub const GATEWAY_API_VERSION: &str = "v1.0.0";

/// Overall result for one profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProfileStatus {
    /// Every core and extended test passed.
    Success,
    /// Core passed; some extended test failed or was skipped.
    Partial,
    /// A core test failed or could not be verified.
    Failure,
}

impl fmt::Display for ProfileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProfileStatus::Success => write!(f, "success"),
            ProfileStatus::Partial => write!(f, "partial"),
            ProfileStatus::Failure => write!(f, "failure"),
        }
    }
}

/// Pass/fail/skip counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Statistics {
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl Statistics {
    pub fn record(&mut self, status: TestStatus) {
        match status {
            TestStatus::Passed => self.passed += 1,
            TestStatus::Failed => self.failed += 1,
            TestStatus::Skipped => self.skipped += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.passed + self.failed + self.skipped
    }

    /// True when nothing failed or was skipped.
    pub fn all_passed(&self) -> bool {
        self.failed == 0 && self.skipped == 0
    }
}

/// Core-test results for a profile.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoreResult {
    pub statistics: Statistics,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed_tests: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped_tests: Vec<String>,
}

/// Extended-test results for a profile.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtendedResult {
    pub statistics: Statistics,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed_tests: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped_tests: Vec<String>,
    #[serde(default)]
    pub supported_features: Vec<Feature>,
    #[serde(default)]
    pub unsupported_features: Vec<Feature>,
}

/// Scored result for one requested profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileReport {
    pub name: ProfileName,
    pub status: ProfileStatus,
    pub core: CoreResult,
    pub extended: ExtendedResult,
    pub summary: String,
}

/// The final conformance report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConformanceReport {
    pub api_version: String,
    pub kind: String,
    pub date: DateTime<Utc>,
    #[serde(rename = "gatewayAPIVersion")]
    pub gateway_api_version: String,
    pub gateway_class: String,
    /// Present whenever profiles were requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub implementation: Option<Implementation>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub profiles: Vec<ProfileReport>,
    /// Flat counts; populated only when no profile was requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<Statistics>,
    #[serde(default)]
    pub skipped_tests: Vec<String>,
    /// Set when a fatal cluster error cut the run short.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aborted: Option<String>,
}

impl ConformanceReport {
    /// Serialize the report to YAML.
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }

    pub fn profile(&self, name: ProfileName) -> Option<&ProfileReport> {
        self.profiles.iter().find(|p| p.name == name)
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.is_some()
    }

    /// True when every requested profile succeeded (profile mode) or nothing
    /// failed (legacy mode).
    pub fn is_conformant(&self) -> bool {
        if self.is_aborted() {
            return false;
        }
        if self.profiles.is_empty() {
            return self.summary.map(|s| s.failed == 0).unwrap_or(true);
        }
        self.profiles
            .iter()
            .all(|p| p.status == ProfileStatus::Success)
    }

    /// Short human-readable summary for the console.
    pub fn to_text(&self) -> String {
        let mut output = String::new();
        output.push_str(&format!(
            "Conformance report for gateway class {:?} ({})\n",
            self.gateway_class,
            self.date.format("%Y-%m-%d %H:%M:%S UTC")
        ));

        if let Some(implementation) = &self.implementation {
            output.push_str(&format!(
                "  implementation: {}/{} {}\n",
                implementation.organization, implementation.project, implementation.version
            ));
        }

        for profile in &self.profiles {
            output.push_str(&format!(
                "  {:<6} {:<8} {}\n",
                profile.name, profile.status, profile.summary
            ));
        }

        if let Some(summary) = &self.summary {
            output.push_str(&format!(
                "  passed: {}  failed: {}  skipped: {}\n",
                summary.passed, summary.failed, summary.skipped
            ));
        }

        if let Some(reason) = &self.aborted {
            output.push_str(&format!("  run aborted: {}\n", reason));
        }

        output
    }
}
