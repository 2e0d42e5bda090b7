//! CLI implementation for `keg plan`
//!
//! Prints the order packages would be built in.

use std::path::Path;

use anyhow::{Context, Result};

use crate::cli::output::{is_json, is_quiet};
use crate::core::project::Project;

/// Execute the plan command
pub fn execute(project_dir: &Path, packages: &[String]) -> Result<()> {
    let project = Project::load(project_dir).context("Failed to load project")?;
    let plan = project.plan(packages)?;
    let graph = plan.graph();

    if is_json() {
        let order: Vec<_> = plan
            .order()
            .iter()
            .map(|&idx| {
                let spec = graph.spec(idx);
                serde_json::json!({
                    "name": spec.name(),
                    "version": spec.version(),
                    "depends": spec.depends(),
                })
            })
            .collect();
        let json = serde_json::json!({ "status": "success", "order": order });
        println!("{}", serde_json::to_string_pretty(&json)?);
        return Ok(());
    }

    if is_quiet() {
        for name in plan.names() {
            println!("{name}");
        }
        return Ok(());
    }

    println!("Build order ({} packages):", plan.len());
    for (position, &idx) in plan.order().iter().enumerate() {
        let spec = graph.spec(idx);
        let version = spec.version().unwrap_or("-");
        if spec.depends().is_empty() {
            println!("  {:>3}. {} {version}", position + 1, spec.name());
        } else {
            println!(
                "  {:>3}. {} {version} (after {})",
                position + 1,
                spec.name(),
                spec.depends().join(", ")
            );
        }
    }
    Ok(())
}
