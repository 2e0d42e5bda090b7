//! CLI command for `keg doctor`
//!
//! Checks host tools and reports issues with suggestions.

use anyhow::Result;
use std::path::Path;

use crate::cli::output::{
    is_json, is_quiet, print_detail, print_info, print_success, print_warning, status,
};
use crate::core::config::CONFIG_FILE;
use crate::core::doctor::run_doctor;

/// Execute the doctor command
pub fn execute(project_dir: &Path) -> Result<()> {
    let project = project_dir.join(CONFIG_FILE).exists().then_some(project_dir);
    let report = run_doctor(project);

    if is_json() {
        let overall = if report.all_passed() {
            "success"
        } else if report.all_required_passed() {
            "warning"
        } else {
            "error"
        };
        let json = serde_json::json!({
            "status": overall,
            "checks": report.checks.iter().map(|c| serde_json::json!({
                "name": c.name,
                "passed": c.passed,
                "required": c.required,
                "path": c.path,
                "version": c.version,
                "error": c.error,
                "suggestion": c.suggestion,
            })).collect::<Vec<_>>(),
            "config_issues": report.config_issues,
        });
        println!("{}", serde_json::to_string_pretty(&json)?);
    } else if is_quiet() {
        for check in report.checks.iter().filter(|c| c.required && !c.passed) {
            eprintln!("{} Missing required: {}", status::ERROR, check.name);
        }
        for issue in &report.config_issues {
            eprintln!("{} {issue}", status::ERROR);
        }
    } else {
        print_info("Checking host tools...");
        for check in &report.checks {
            let version = check
                .version
                .as_ref()
                .map(|v| format!(" ({v})"))
                .unwrap_or_default();
            let optional = if check.required { "" } else { " [optional]" };

            if check.passed {
                println!("  {} {}{version}{optional}", status::SUCCESS, check.name);
            } else {
                println!("  {} {}{optional}", status::ERROR, check.name);
                if let Some(suggestion) = &check.suggestion {
                    print_detail(suggestion);
                }
            }
        }

        if !report.config_issues.is_empty() {
            print_warning("Project issues:");
            for issue in &report.config_issues {
                print_detail(issue);
            }
        }

        if report.all_passed() {
            print_success(&format!(
                "All checks passed ({}/{})",
                report.passed_count(),
                report.checks.len()
            ));
        }
    }

    if !report.all_required_passed() {
        anyhow::bail!("Doctor found problems");
    }
    Ok(())
}
