//! Integration tests for `keg build` and `keg status`

mod common;

use assert_fs::prelude::*;
use common::{combined, stdout, TestProject};
use predicates::prelude::*;

fn marker(name: &str) -> String {
    format!("out/Cellar/{name}/1.0/lib/{name}.marker")
}

#[test]
fn test_build_installs_in_order() {
    let project = TestProject::new();
    project.add_installing_formula("zlib", &[]);
    project.add_installing_formula("libpng", &["zlib"]);

    let output = project.keg(&["build"]);
    assert!(output.status.success(), "{}", combined(&output));

    assert_eq!(project.read_file(&marker("zlib")).trim(), "zlib");
    assert_eq!(project.read_file(&marker("libpng")).trim(), "libpng");
    assert!(project.file_exists("build/report.json"));
    assert!(project.file_exists("build/logs/zlib.log"));
}

#[test]
fn test_build_sees_dependency_prefix() {
    let project = TestProject::new();
    project.add_installing_formula("zlib", &[]);
    project.add_formula(
        "libpng",
        &["zlib"],
        "case \"$LDFLAGS\" in *Cellar/zlib/1.0/lib*) ;; *) exit 3;; esac",
    );

    let output = project.keg(&["build"]);
    assert!(output.status.success(), "{}", combined(&output));
}

#[test]
fn test_failure_skips_only_dependents() {
    let project = TestProject::new();
    project.add_installing_formula("zlib", &[]);
    project.add_formula("broken", &["zlib"], "echo compile error >&2; exit 2");
    project.add_installing_formula("app", &["broken"]);
    project.add_installing_formula("tool", &["zlib"]);

    let output = project.keg(&["--json", "build"]);
    assert_eq!(output.status.code(), Some(1));

    // The report is printed before the error object
    let text = stdout(&output);
    let report: serde_json::Value = serde_json::Deserializer::from_str(&text)
        .into_iter::<serde_json::Value>()
        .next()
        .unwrap()
        .unwrap();
    let status_of = |name: &str| {
        report["results"]
            .as_array()
            .unwrap()
            .iter()
            .find(|r| r["package"] == name)
            .map(|r| r["status"].as_str().unwrap().to_string())
            .unwrap()
    };
    assert_eq!(status_of("zlib"), "installed");
    assert_eq!(status_of("broken"), "failed");
    assert_eq!(status_of("app"), "skipped");
    assert_eq!(status_of("tool"), "installed");

    assert!(project.file_exists(&marker("tool")));
    assert!(!project.file_exists(&marker("app")));
    assert!(project.read_file("build/logs/broken.log").contains("compile error"));
}

#[test]
fn test_parallel_build() {
    let project = TestProject::new();
    for name in ["a", "b", "c", "d"] {
        project.add_installing_formula(name, &[]);
    }
    project.add_installing_formula("top", &["a", "b", "c", "d"]);

    let output = project.keg(&["build", "-j", "3"]);
    assert!(output.status.success(), "{}", combined(&output));
    for name in ["a", "b", "c", "d", "top"] {
        assert!(project.file_exists(&marker(name)), "{name} not installed");
    }
}

#[test]
fn test_build_selected_targets_only() {
    let project = TestProject::new();
    project.add_installing_formula("zlib", &[]);
    project.add_installing_formula("libpng", &["zlib"]);
    project.add_installing_formula("unrelated", &[]);

    let output = project.keg(&["build", "libpng"]);
    assert!(output.status.success(), "{}", combined(&output));
    assert!(project.file_exists(&marker("zlib")));
    assert!(!project.file_exists(&marker("unrelated")));
}

#[test]
fn test_build_zero_jobs_rejected() {
    let project = TestProject::new();
    project.add_installing_formula("zlib", &[]);

    let output = project.keg(&["build", "-j", "0"]);
    assert!(!output.status.success());
    assert!(combined(&output).contains("--jobs"));
}

#[test]
fn test_custom_report_location() {
    let project = TestProject::new();
    project.add_installing_formula("zlib", &[]);
    let reports = assert_fs::TempDir::new().unwrap();
    let report = reports.child("run.json");

    let output = project.keg(&["build", "--report", report.path().to_str().unwrap()]);
    assert!(output.status.success(), "{}", combined(&output));

    report.assert(predicate::path::exists());
    report.assert(predicate::str::contains("\"installed\""));
}

#[test]
fn test_status_after_build() {
    let project = TestProject::new();
    project.add_installing_formula("zlib", &[]);
    project.add_formula("broken", &[], "exit 1");
    let _ = project.keg(&["build"]);

    let output = project.keg(&["status"]);
    assert!(output.status.success(), "{}", combined(&output));
    let text = stdout(&output);
    assert!(predicate::str::is_match(r"zlib\s+installed").unwrap().eval(&text), "{text}");
    assert!(predicate::str::is_match(r"broken\s+failed").unwrap().eval(&text), "{text}");

    let output = project.keg(&["--json", "status", "zlib"]);
    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(json[0]["status"], "installed");
}

#[test]
fn test_status_unknown_package() {
    let project = TestProject::new();
    project.add_installing_formula("zlib", &[]);
    let _ = project.keg(&["build"]);

    let output = project.keg(&["status", "ghost"]);
    assert!(!output.status.success());
    assert!(combined(&output).contains("ghost"));
}

#[test]
fn test_status_without_report() {
    let project = TestProject::new();
    let output = project.keg(&["status"]);
    assert!(!output.status.success());
    assert!(combined(&output).contains("keg build"));
}
