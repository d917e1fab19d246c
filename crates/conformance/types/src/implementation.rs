//! Implementation metadata attached to a conformance report.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{ConfigError, ConfigResult};

/// Descriptive metadata about the implementation under test.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Implementation {
    pub organization: String,
    pub project: String,
    pub url: String,
    pub version: String,
    /// Points of contact, e.g. GitHub handles or team addresses.
    pub contact: Vec<String>,
}

impl Implementation {
    /// Build and validate implementation metadata.
    ///
    /// All fields are required. `contact` is a comma-separated list.
    pub fn parse(
        organization: &str,
        project: &str,
        url: &str,
        version: &str,
        contact: &str,
    ) -> ConfigResult<Self> {
        let implementation = Self {
            organization: organization.trim().to_string(),
            project: project.trim().to_string(),
            url: url.trim().to_string(),
            version: version.trim().to_string(),
            contact: contact
                .split(',')
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(String::from)
                .collect(),
        };
        implementation.validate()?;
        Ok(implementation)
    }

    /// Check required fields and the URL.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.organization.is_empty() {
            return Err(ConfigError::MissingImplementationField("organization"));
        }
        if self.project.is_empty() {
            return Err(ConfigError::MissingImplementationField("project"));
        }
        if self.url.is_empty() {
            return Err(ConfigError::MissingImplementationField("url"));
        }
        if self.version.is_empty() {
            return Err(ConfigError::MissingImplementationField("version"));
        }
        if self.contact.is_empty() {
            return Err(ConfigError::MissingImplementationField("contact"));
        }

        let parsed = Url::parse(&self.url).map_err(|e| ConfigError::InvalidUrl {
            url: self.url.clone(),
            reason: e.to_string(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
            return Err(ConfigError::InvalidUrl {
                url: self.url.clone(),
                reason: "expected an absolute http(s) URL".into(),
            });
        }

        Ok(())
    }
}
