//! CLI error types

use conformance_suite::OrchestratorError;
use conformance_types::ConfigError;
use std::path::PathBuf;
use thiserror::Error;

/// CLI error types
#[derive(Debug, Error)]
pub enum CliError {
    /// Config file could not be read or parsed
    #[error("Configuration error: {0}")]
    Config(String),

    /// A flag or config value failed validation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(#[from] ConfigError),

    /// Setup, validation or cancellation before the run produced a report
    #[error(transparent)]
    Orchestrator(#[from] OrchestratorError),

    /// No cluster connection was supplied
    #[error("no cluster connection available; pass --simulate to use the in-memory cluster")]
    NoCluster,

    /// The run stopped on a fatal cluster error; the report was still emitted
    #[error("run aborted: {0}")]
    Aborted(String),

    /// Interrupted by the user; the report was still emitted
    #[error("run cancelled")]
    Cancelled,

    /// YAML serialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Report file could not be written
    #[error("failed to write report to {}: {source}", path.display())]
    ReportWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl CliError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            CliError::Config(_) | CliError::InvalidConfig(_) => 1,
            CliError::Orchestrator(OrchestratorError::Config(_)) => 1,
            CliError::Orchestrator(OrchestratorError::ClusterSetup(_)) | CliError::NoCluster => 2,
            CliError::Aborted(_) => 3,
            CliError::Yaml(_) | CliError::ReportWrite { .. } => 4,
            CliError::Orchestrator(OrchestratorError::Cancelled) | CliError::Cancelled => 130,
        }
    }
}

/// Result type for CLI operations
pub type CliResult<T> = Result<T, CliError>;

#[cfg(test)]
mod tests {
    use super::*;
    use conformance_suite::ClusterError;

    #[test]
    fn test_exit_codes() {
        assert_eq!(CliError::from(ConfigError::UnknownFeature("X".into())).exit_code(), 1);
        assert_eq!(
            CliError::from(OrchestratorError::ClusterSetup(ClusterError::ConnectionLost(
                "refused".into()
            )))
            .exit_code(),
            2
        );
        assert_eq!(CliError::Aborted("unauthorized: expired".into()).exit_code(), 3);
        assert_eq!(CliError::Cancelled.exit_code(), 130);
        assert_eq!(
            CliError::ReportWrite {
                path: PathBuf::from("/nope/report.yaml"),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
            }
            .exit_code(),
            4
        );
    }
}
