//! Check command implementation
//!
//! Implements `keg check` to validate configuration and formulae without
//! building anything.

use anyhow::{Context, Result};
use std::path::Path;

use crate::cli::output::{is_json, print_detail, print_success};
use crate::core::project::Project;

/// Execute the check command
pub fn execute(project_dir: &Path) -> Result<()> {
    let project = Project::load(project_dir).context("Failed to load project")?;
    let plan = project.plan(&[])?;

    if is_json() {
        let json = serde_json::json!({
            "status": "success",
            "formulae": project.formulae().len(),
            "order": plan.names(),
        });
        println!("{}", serde_json::to_string_pretty(&json)?);
        return Ok(());
    }

    print_success("Configuration is valid");
    print_success(&format!(
        "{} formulae loaded, all dependencies resolvable",
        project.formulae().len()
    ));
    print_detail(&format!("Build order: {}", plan.names().join(" -> ")));
    Ok(())
}
