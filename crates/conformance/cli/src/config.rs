//! Config file loading

use conformance_suite::ConformanceOptions;
use std::path::Path;

use crate::error::{CliError, CliResult};

/// Load run options from a TOML file.
///
/// Keys mirror [`ConformanceOptions`]; anything omitted keeps its default.
/// Unlike flags, a named file that cannot be read is an error.
pub fn load_options(path: &Path) -> CliResult<ConformanceOptions> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| CliError::Config(format!("cannot read {}: {}", path.display(), e)))?;
    toml::from_str(&contents)
        .map_err(|e| CliError::Config(format!("invalid config file {}: {}", path.display(), e)))
}
