//! CLI implementation for `keg fetch`
//!
//! Downloads and verifies source archives ahead of a build.

use std::path::Path;

use anyhow::{bail, Context, Result};

use crate::cli::output::{create_spinner, is_json, print_detail, print_error, print_success};
use crate::core::fetch::{fetch_sources, FetchOptions};
use crate::core::project::Project;

/// Execute the fetch command
pub async fn execute(
    project_dir: &Path,
    packages: &[String],
    parallel: usize,
    force: bool,
) -> Result<()> {
    let project = Project::load(project_dir).context("Failed to load project")?;
    let plan = project.plan(packages)?;

    let options = FetchOptions {
        parallel: if parallel == 0 { 4 } else { parallel },
        force,
    };

    let spinner = create_spinner("Fetching sources...");
    let summary = fetch_sources(&project, &plan, &options).await;
    spinner.finish_and_clear();

    if is_json() {
        let json = serde_json::json!({
            "status": if summary.success() { "success" } else { "error" },
            "downloaded": summary.downloaded,
            "cached": summary.cached,
            "failed": summary.failed.iter().map(|(name, error)| serde_json::json!({
                "package": name,
                "error": error,
            })).collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&json)?);
    } else if summary.downloaded.is_empty()
        && summary.cached.is_empty()
        && summary.failed.is_empty()
    {
        print_success("Nothing to fetch");
    } else {
        if !summary.downloaded.is_empty() {
            print_success(&format!("Downloaded {} archive(s):", summary.downloaded.len()));
            for name in &summary.downloaded {
                print_detail(name);
            }
        }
        if !summary.cached.is_empty() {
            print_detail(&format!(
                "{} archive(s) already cached and verified",
                summary.cached.len()
            ));
        }
        for (name, error) in &summary.failed {
            print_error(&format!("{name}: {error}"));
        }
    }

    if !summary.success() {
        bail!("Failed to fetch {} archive(s)", summary.failed.len());
    }
    Ok(())
}
