//! Run configuration.
//!
//! [`ConformanceOptions`] is the raw user intent (string lists straight from
//! flags or a config file). The orchestrator validates it into typed values
//! before any cluster interaction.

use conformance_types::{Channel, ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Namespaces shared by every test, created during setup.
pub const BASE_NAMESPACES: &[&str] = &[
    "gateway-conformance-infra",
    "gateway-conformance-app-backend",
    "gateway-conformance-web-backend",
];

/// The namespace shared-scope tests use for their objects.
pub const INFRA_NAMESPACE: &str = "gateway-conformance-infra";

/// Bounds on every blocking wait in a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    /// Upper bound for one test body.
    #[serde(with = "secs")]
    pub test: Duration,
    /// Default bound for a single status poll inside a test.
    #[serde(with = "secs")]
    pub reconcile: Duration,
    /// Bound for namespace teardown.
    #[serde(with = "secs")]
    pub teardown: Duration,
    #[serde(with = "millis")]
    pub poll_interval: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            test: Duration::from_secs(300),
            reconcile: Duration::from_secs(60),
            teardown: Duration::from_secs(60),
            poll_interval: Duration::from_millis(500),
        }
    }
}

mod secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

/// Implementation metadata as supplied by the user, before validation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImplementationOptions {
    pub organization: String,
    pub project: String,
    pub url: String,
    pub version: String,
    /// Comma-separated contacts.
    pub contact: String,
}

/// Everything a run can be configured with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConformanceOptions {
    pub gateway_class: String,
    pub supported_features: Vec<String>,
    pub exempt_features: Vec<String>,
    pub enable_all_features: bool,
    /// Highest channel considered by `enable_all_features`.
    pub channel: Channel,
    pub skip_tests: Vec<String>,
    pub namespace_labels: BTreeMap<String, String>,
    pub conformance_profiles: Vec<String>,
    pub implementation: ImplementationOptions,
    /// Tear down base and per-test fixtures after the run.
    pub cleanup: bool,
    pub debug: bool,
    pub timeouts: Timeouts,
    /// Extra attempts for a failed test.
    pub retries: u32,
    /// Concurrent shared-scope tests. 1 means fully sequential.
    pub parallelism: usize,
}

impl Default for ConformanceOptions {
    fn default() -> Self {
        Self {
            gateway_class: "gateway-conformance".to_string(),
            supported_features: Vec::new(),
            exempt_features: Vec::new(),
            enable_all_features: false,
            channel: Channel::Experimental,
            skip_tests: Vec::new(),
            namespace_labels: BTreeMap::new(),
            conformance_profiles: Vec::new(),
            implementation: ImplementationOptions::default(),
            cleanup: true,
            debug: false,
            timeouts: Timeouts::default(),
            retries: 0,
            parallelism: 1,
        }
    }
}

impl ConformanceOptions {
    /// Range checks that do not depend on the registries.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.gateway_class.trim().is_empty() {
            return Err(ConfigError::InvalidOption {
                option: "gateway-class".into(),
                reason: "must not be empty".into(),
            });
        }
        if self.parallelism == 0 {
            return Err(ConfigError::InvalidOption {
                option: "parallelism".into(),
                reason: "must be at least 1".into(),
            });
        }
        if self.timeouts.test.is_zero() || self.timeouts.teardown.is_zero() {
            return Err(ConfigError::InvalidOption {
                option: "timeouts".into(),
                reason: "test and teardown timeouts must be non-zero".into(),
            });
        }
        Ok(())
    }
}

/// Split a comma-separated flag value, dropping blanks.
pub fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Parse `key=value,key2=value2` namespace labels.
pub fn parse_namespace_labels(raw: &str) -> ConfigResult<BTreeMap<String, String>> {
    let mut labels = BTreeMap::new();
    for entry in parse_list(raw) {
        let (key, value) = entry
            .split_once('=')
            .ok_or_else(|| ConfigError::InvalidNamespaceLabel(entry.clone()))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(ConfigError::InvalidNamespaceLabel(entry.clone()));
        }
        labels.insert(key.to_string(), value.trim().to_string());
    }
    Ok(labels)
}
