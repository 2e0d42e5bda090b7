//! CLI implementation for `keg status`
//!
//! Shows package statuses recorded in the last run report.

use std::path::Path;

use anyhow::{bail, Context, Result};

use crate::cli::output::{is_json, status};
use crate::core::orchestrator::{BuildResult, RunReport};
use crate::core::package::PackageStatus;
use crate::core::project::BUILD_DIR;

/// Execute the status command
pub fn execute(project_dir: &Path, package: Option<&str>, report: Option<&Path>) -> Result<()> {
    let path = report.map_or_else(
        || project_dir.join(BUILD_DIR).join("report.json"),
        Path::to_path_buf,
    );
    if !path.exists() {
        bail!("No build report at {}. Run 'keg build' first.", path.display());
    }
    let report = RunReport::load(&path)
        .with_context(|| format!("Failed to read report {}", path.display()))?;

    let results: Vec<&BuildResult> = match package {
        Some(name) => match report.result(name) {
            Some(result) => vec![result],
            None => bail!("Package '{name}' is not in the last build"),
        },
        None => report.results.iter().collect(),
    };

    if is_json() {
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }

    for result in results {
        let prefix = match result.status {
            PackageStatus::Installed => status::SUCCESS,
            PackageStatus::Failed => status::ERROR,
            PackageStatus::Skipped => status::SKIPPED,
            PackageStatus::Pending | PackageStatus::Building => status::INFO,
        };
        let detail = result
            .error
            .as_deref()
            .map(|e| format!(" ({e})"))
            .unwrap_or_default();
        println!("{prefix} {:<24} {}{detail}", result.package, result.status);
    }
    if report.cancelled {
        println!("{} last build was cancelled", status::WARNING);
    }
    Ok(())
}
