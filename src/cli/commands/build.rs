//! Build command implementation
//!
//! Implements `keg build`: plan, build in dependency order, write one log
//! per package and a JSON run report, then summarise.

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use tokio_util::sync::CancellationToken;

use crate::cli::output::{
    create_build_bar, is_json, print_detail, print_success, print_warning, status,
};
use crate::core::orchestrator::{Orchestrator, RunReport};
use crate::core::package::PackageStatus;
use crate::core::project::Project;
use crate::error::BuildError;

/// Build options
#[derive(Debug, Default)]
pub struct BuildOptions {
    /// Packages to build (with their dependencies); all when empty
    pub packages: Vec<String>,
    /// Packages built concurrently; overrides keg.toml
    pub jobs: Option<usize>,
    /// Report location; defaults to build/report.json
    pub report: Option<PathBuf>,
}

/// Execute the build command
pub async fn execute(project_dir: &Path, options: BuildOptions) -> Result<()> {
    let project = Project::load(project_dir).context("Failed to load project")?;
    let jobs = options.jobs.unwrap_or_else(|| project.config().jobs());
    if jobs == 0 {
        bail!("--jobs must be at least 1");
    }

    let plan = project.plan(&options.packages)?;
    tracing::info!(
        "Building {} in {}",
        plan.names().join(", "),
        project_dir.display()
    );

    let token = CancellationToken::new();
    let interrupt = token.clone();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, waiting for running builds to finish");
            interrupt.cancel();
        }
    });

    let bar = create_build_bar(plan.len() as u64);
    let observer_bar = bar.clone();
    let orchestrator = Orchestrator::new(project.environment())
        .with_jobs(jobs)
        .with_cancellation(token)
        .with_observer(Box::new(move |result| {
            let prefix = match result.status {
                PackageStatus::Installed => status::SUCCESS,
                PackageStatus::Failed => status::ERROR,
                _ => status::SKIPPED,
            };
            observer_bar.println(format!("{prefix} {} {}", result.package, result.status));
            observer_bar.set_message(result.package.clone());
            observer_bar.inc(1);
        }));

    let outcome = orchestrator.run(&plan).await;
    ctrl_c.abort();
    bar.finish_and_clear();

    let report = match outcome {
        Ok(report) => report,
        Err(BuildError::Cancelled { report }) => *report,
        Err(e) => return Err(e.into()),
    };

    write_logs(&project.logs_dir(), &report)?;
    let report_path = options.report.unwrap_or_else(|| project.report_path());
    report
        .save(&report_path)
        .with_context(|| format!("Failed to write report to {}", report_path.display()))?;

    if is_json() {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_summary(&report, &project.logs_dir());
    }

    if report.cancelled {
        bail!("Build cancelled");
    }
    if !report.success() {
        bail!(
            "{} package(s) failed: {}",
            report.failed().len(),
            report.failed().join(", ")
        );
    }
    Ok(())
}

/// Write captured output of every package that produced some
fn write_logs(logs_dir: &Path, report: &RunReport) -> Result<()> {
    fs::create_dir_all(logs_dir)
        .with_context(|| format!("Failed to create {}", logs_dir.display()))?;
    for result in report.results.iter().filter(|r| !r.output.is_empty()) {
        let path = logs_dir.join(format!("{}.log", result.package));
        fs::write(&path, &result.output)
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }
    Ok(())
}

fn print_summary(report: &RunReport, logs_dir: &Path) {
    let installed = report.installed().len();
    let failed = report.failed();
    let skipped = report.skipped();

    if report.success() {
        print_success(&format!(
            "Built {installed} package(s) in {:.1?}",
            report.elapsed
        ));
        return;
    }

    print_warning(&format!(
        "{installed} installed, {} failed, {} skipped",
        failed.len(),
        skipped.len()
    ));
    for name in failed {
        if let Some(result) = report.result(name) {
            print_detail(&format!(
                "{} {name}: {}",
                status::ERROR,
                result.error.as_deref().unwrap_or("failed")
            ));
            print_detail(&format!("  log: {}", logs_dir.join(format!("{name}.log")).display()));
        }
    }
    for name in skipped {
        if let Some(reason) = report.result(name).and_then(|r| r.error.as_deref()) {
            print_detail(&format!("{} {name}: {reason}", status::SKIPPED));
        }
    }
}
