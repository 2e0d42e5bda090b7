//! Doctor command logic
//!
//! Checks that the host tools formula builds shell out to are installed, and
//! that the project in the current directory loads and plans cleanly.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

use crate::core::project::Project;

static VERSION_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"v?(\d+\.\d+(?:\.\d+)?(?:-\w+)?)").ok());

/// Result of a single dependency check
#[derive(Debug, Clone)]
pub struct CheckResult {
    /// Name of the dependency being checked
    pub name: String,
    /// Whether the check passed
    pub passed: bool,
    /// Where the tool was found
    pub path: Option<PathBuf>,
    /// Version if available
    pub version: Option<String>,
    /// Error message if check failed
    pub error: Option<String>,
    /// Suggestion for fixing the issue
    pub suggestion: Option<String>,
    /// Whether this is a required or optional dependency
    pub required: bool,
}

impl CheckResult {
    /// Create a passing check result
    pub fn pass(
        name: &str,
        path: Option<PathBuf>,
        version: Option<String>,
        required: bool,
    ) -> Self {
        Self {
            name: name.to_string(),
            passed: true,
            path,
            version,
            error: None,
            suggestion: None,
            required,
        }
    }

    /// Create a failing check result
    pub fn fail(name: &str, error: &str, suggestion: Option<&str>, required: bool) -> Self {
        Self {
            name: name.to_string(),
            passed: false,
            path: None,
            version: None,
            error: Some(error.to_string()),
            suggestion: suggestion.map(String::from),
            required,
        }
    }
}

/// Overall doctor report
#[derive(Debug, Default)]
pub struct DoctorReport {
    /// Individual check results
    pub checks: Vec<CheckResult>,
    /// Project problems found
    pub config_issues: Vec<String>,
}

impl DoctorReport {
    /// Create a new empty report
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a check result
    pub fn add_check(&mut self, result: CheckResult) {
        self.checks.push(result);
    }

    /// Add a configuration issue
    pub fn add_config_issue(&mut self, issue: String) {
        self.config_issues.push(issue);
    }

    /// Check if all required checks passed and the project is sound
    pub fn all_required_passed(&self) -> bool {
        self.checks.iter().filter(|c| c.required).all(|c| c.passed)
            && self.config_issues.is_empty()
    }

    /// Check if all checks passed (including optional)
    pub fn all_passed(&self) -> bool {
        self.checks.iter().all(|c| c.passed) && self.config_issues.is_empty()
    }

    /// Count passed checks
    pub fn passed_count(&self) -> usize {
        self.checks.iter().filter(|c| c.passed).count()
    }

    /// Count failed checks
    pub fn failed_count(&self) -> usize {
        self.checks.iter().filter(|c| !c.passed).count()
    }
}

/// A host tool and how to report it
struct Tool {
    command: &'static str,
    label: &'static str,
    probe_version: bool,
    required: bool,
    suggestion: &'static str,
}

const TOOLS: &[Tool] = &[
    Tool {
        command: "sh",
        label: "POSIX shell",
        probe_version: false,
        required: true,
        suggestion: "A POSIX shell is needed to run configure scripts",
    },
    Tool {
        command: "make",
        label: "make",
        probe_version: true,
        required: true,
        suggestion: "Install GNU make (Xcode command line tools or your package manager)",
    },
    Tool {
        command: "tar",
        label: "tar",
        probe_version: true,
        required: true,
        suggestion: "Install tar to unpack source archives",
    },
    Tool {
        command: "patch",
        label: "patch",
        probe_version: true,
        required: true,
        suggestion: "Install patch to apply formula patches",
    },
    Tool {
        command: "pkg-config",
        label: "pkg-config",
        probe_version: true,
        required: false,
        suggestion: "Many configure scripts look for pkg-config (optional)",
    },
];

/// Version reported by `<path> --version`, if any
pub fn probe_version(path: &Path) -> Option<String> {
    let output = std::process::Command::new(path)
        .arg("--version")
        .output()
        .ok()?;
    let combined = format!(
        "{}{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
    extract_version(&combined)
}

/// Extract version string from command output
fn extract_version(output: &str) -> Option<String> {
    VERSION_RE
        .as_ref()?
        .captures(output)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

fn check_tool(tool: &Tool) -> CheckResult {
    match which::which(tool.command) {
        Ok(path) => {
            let version = if tool.probe_version {
                probe_version(&path)
            } else {
                None
            };
            CheckResult::pass(tool.label, Some(path), version, tool.required)
        }
        Err(_) => CheckResult::fail(
            tool.label,
            &format!("`{}` not found in PATH", tool.command),
            Some(tool.suggestion),
            tool.required,
        ),
    }
}

/// Load the project and plan it, collecting every problem found
pub fn check_project(project_dir: &Path) -> Vec<String> {
    let project = match Project::load(project_dir) {
        Ok(project) => project,
        Err(e) => return vec![e.to_string()],
    };
    let mut issues = Vec::new();
    if let Err(e) = project.plan(&[]) {
        issues.push(e.to_string());
    }
    for formula in project.formulae() {
        for patch in &formula.build.patches {
            let path = project.root().join(&patch.path);
            if !path.is_file() {
                issues.push(format!(
                    "Formula '{}' references missing patch {}",
                    formula.name(),
                    path.display()
                ));
            }
        }
    }
    issues
}

/// Run all doctor checks
pub fn run_doctor(project_dir: Option<&Path>) -> DoctorReport {
    let mut report = DoctorReport::new();

    for tool in TOOLS {
        report.add_check(check_tool(tool));
    }

    if let Some(dir) = project_dir {
        for issue in check_project(dir) {
            report.add_config_issue(issue);
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_check_result_pass() {
        let result = CheckResult::pass("make", None, Some("3.81".to_string()), true);
        assert!(result.passed);
        assert_eq!(result.version.as_deref(), Some("3.81"));
        assert!(result.required);
    }

    #[test]
    fn test_check_result_fail() {
        let result = CheckResult::fail("patch", "error", Some("suggestion"), false);
        assert!(!result.passed);
        assert_eq!(result.error.as_deref(), Some("error"));
        assert_eq!(result.suggestion.as_deref(), Some("suggestion"));
        assert!(!result.required);
    }

    #[test]
    fn test_doctor_report_counts() {
        let mut report = DoctorReport::new();
        report.add_check(CheckResult::pass("a", None, None, true));
        report.add_check(CheckResult::fail("b", "err", None, false));

        assert_eq!(report.passed_count(), 1);
        assert_eq!(report.failed_count(), 1);
        assert!(report.all_required_passed());
        assert!(!report.all_passed());

        report.add_config_issue("broken".into());
        assert!(!report.all_required_passed());
    }

    #[test]
    fn test_extract_version() {
        assert_eq!(
            extract_version("GNU Make 3.81\nCopyright"),
            Some("3.81".to_string())
        );
        assert_eq!(
            extract_version("tar (GNU tar) 1.34"),
            Some("1.34".to_string())
        );
        assert_eq!(extract_version("no digits"), None);
    }

    #[test]
    fn test_shell_is_found() {
        let result = check_tool(&TOOLS[0]);
        assert!(result.passed, "{result:?}");
        assert!(result.path.is_some());
    }

    #[test]
    fn test_missing_tool_fails_with_suggestion() {
        let tool = Tool {
            command: "keg-no-such-tool",
            label: "nothing",
            probe_version: true,
            required: true,
            suggestion: "install it",
        };
        let result = check_tool(&tool);
        assert!(!result.passed);
        assert_eq!(result.suggestion.as_deref(), Some("install it"));
    }

    #[test]
    fn test_check_project_reports_problems() {
        let tmp = TempDir::new().unwrap();
        assert_eq!(check_project(tmp.path()).len(), 1);

        fs::write(tmp.path().join("keg.toml"), "").unwrap();
        fs::create_dir(tmp.path().join("Formula")).unwrap();
        fs::write(
            tmp.path().join("Formula/libassuan.toml"),
            r#"
[package]
name = "libassuan"
version = "2.1.1"
depends = ["libgpg-error"]

[source]
path = "src/libassuan"

[build]
patches = [{ path = "patches/missing.patch" }]
"#,
        )
        .unwrap();

        let issues = check_project(tmp.path());
        assert_eq!(issues.len(), 2, "{issues:?}");
        assert!(issues[0].contains("libgpg-error"));
        assert!(issues[1].contains("missing.patch"));
    }
}
