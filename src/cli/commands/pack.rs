//! CLI implementation for `keg pack`
//!
//! Copies the installed prefixes into a single distribution tree.

use std::path::Path;

use anyhow::{Context, Result};

use crate::cli::output::{create_spinner, is_json, print_detail, print_success};
use crate::core::pack::{pack, PackOptions};
use crate::core::project::Project;

/// Execute the pack command
pub fn execute(project_dir: &Path, dest: &Path, packages: &[String], prune: bool) -> Result<()> {
    let project = Project::load(project_dir).context("Failed to load project")?;
    let plan = project.plan(packages)?;

    let spinner = create_spinner(&format!("Staging into {}...", dest.display()));
    let result = pack(&project, &plan, dest, &PackOptions { prune });
    spinner.finish_and_clear();
    let summary = result.with_context(|| format!("Failed to pack into {}", dest.display()))?;

    if is_json() {
        let json = serde_json::json!({
            "status": "success",
            "destination": dest,
            "packages": summary.packages,
            "files": summary.stats.files,
            "symlinks": summary.stats.symlinks,
        });
        println!("{}", serde_json::to_string_pretty(&json)?);
        return Ok(());
    }

    print_success(&format!(
        "Staged {} package(s) into {}",
        summary.packages.len(),
        dest.display()
    ));
    print_detail(&format!(
        "{} files, {} symlinks",
        summary.stats.files, summary.stats.symlinks
    ));
    Ok(())
}
