//! Configuration errors.
//!
//! Every variant is fatal and is reported before the orchestrator touches the
//! cluster.

use thiserror::Error;

/// Errors raised while validating run configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A feature identifier that is not in the feature registry.
    #[error("unknown feature: {0}")]
    UnknownFeature(String),

    /// A conformance profile name that is not in the profile registry.
    #[error("unknown conformance profile: {0}")]
    UnknownProfile(String),

    /// A required implementation field was left empty.
    #[error("implementation {0} is required when conformance profiles are requested")]
    MissingImplementationField(&'static str),

    /// The implementation URL could not be parsed.
    #[error("invalid implementation url {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    /// A namespace label entry was not of the form `key=value`.
    #[error("invalid namespace label {0:?}, expected key=value")]
    InvalidNamespaceLabel(String),

    /// Two catalog entries share the same name.
    #[error("duplicate test name in catalog: {0}")]
    DuplicateTest(String),

    /// An option carried a value outside its accepted range.
    #[error("invalid value for {option}: {reason}")]
    InvalidOption { option: String, reason: String },
}

/// Convenience result type for configuration validation.
pub type ConfigResult<T> = Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_feature_display() {
        let err = ConfigError::UnknownFeature("HTTPRouteTeleport".into());
        assert_eq!(err.to_string(), "unknown feature: HTTPRouteTeleport");
    }

    #[test]
    fn test_missing_field_display() {
        let err = ConfigError::MissingImplementationField("organization");
        assert!(err.to_string().contains("organization"));
    }

    #[test]
    fn test_invalid_url_display() {
        let err = ConfigError::InvalidUrl {
            url: "not a url".into(),
            reason: "relative URL without a base".into(),
        };
        assert!(err.to_string().contains("not a url"));
    }
}
