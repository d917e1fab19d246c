//! Report output

use conformance_types::ConformanceReport;
use std::path::Path;
use tracing::info;

use crate::error::{CliError, CliResult};

/// Log the report, print its summary, and write it to `path` when given.
pub fn emit(report: &ConformanceReport, path: Option<&Path>) -> CliResult<()> {
    let yaml = report.to_yaml()?;
    info!("conformance report:\n{}", yaml);
    print!("{}", report.to_text());

    if let Some(path) = path {
        write_report(path, &yaml)?;
        info!(path = %path.display(), "report written");
    }
    Ok(())
}

/// Write serialized report text, guaranteeing a trailing newline.
pub fn write_report(path: &Path, yaml: &str) -> CliResult<()> {
    let mut contents = yaml.to_string();
    if !contents.ends_with('\n') {
        contents.push('\n');
    }
    std::fs::write(path, contents).map_err(|source| CliError::ReportWrite {
        path: path.to_path_buf(),
        source,
    })
}
