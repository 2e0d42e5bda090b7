//! Common test utilities and helpers
//!
//! This module provides shared utilities for integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

/// Test project context
///
/// Creates a temporary project directory with a `keg.toml`, a `Formula/`
/// directory and a private download cache.
pub struct TestProject {
    /// Temporary directory for the test project
    pub dir: TempDir,
}

impl TestProject {
    /// Create a new project with the default configuration
    pub fn new() -> Self {
        Self::with_config(SAMPLE_CONFIG)
    }

    /// Create a new project with the given `keg.toml`
    pub fn with_config(config: &str) -> Self {
        let project = Self {
            dir: TempDir::new().expect("Failed to create temp directory"),
        };
        project.create_file("keg.toml", config);
        project.create_dir("Formula");
        project
    }

    /// Get the path to the test project directory
    pub fn path(&self) -> PathBuf {
        self.dir.path().to_path_buf()
    }

    /// Create a file in the test project
    pub fn create_file(&self, name: &str, content: &str) {
        let path = self.dir.path().join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create parent directories");
        }
        std::fs::write(path, content).expect("Failed to write file");
    }

    /// Create a directory in the test project
    pub fn create_dir(&self, name: &str) {
        std::fs::create_dir_all(self.dir.path().join(name)).expect("Failed to create directory");
    }

    /// Check if a file exists in the test project
    pub fn file_exists(&self, name: &str) -> bool {
        self.dir.path().join(name).exists()
    }

    /// Read a file from the test project
    pub fn read_file(&self, name: &str) -> String {
        std::fs::read_to_string(self.dir.path().join(name)).expect("Failed to read file")
    }

    /// Add a formula with a local source tree whose single step runs `script` under `sh -c`
    pub fn add_formula(&self, name: &str, depends: &[&str], script: &str) {
        self.create_file(&format!("src/{name}/README"), name);
        let depends = depends
            .iter()
            .map(|d| format!("\"{d}\""))
            .collect::<Vec<_>>()
            .join(", ");
        let script = script.replace('\\', "\\\\").replace('"', "\\\"");
        self.create_file(
            &format!("Formula/{name}.toml"),
            &format!(
                r#"[package]
name = "{name}"
version = "1.0"
depends = [{depends}]

[source]
path = "src/{name}"

[build]
steps = [{{ run = "sh", args = ["-c", "{script}"] }}]
"#
            ),
        );
    }

    /// Add a formula that installs a marker file into its prefix
    pub fn add_installing_formula(&self, name: &str, depends: &[&str]) {
        self.add_formula(
            name,
            depends,
            &format!("mkdir -p $PREFIX/lib && echo {name} > $PREFIX/lib/{name}.marker"),
        );
    }

    /// Run keg with `args` inside the project
    pub fn keg(&self, args: &[&str]) -> Output {
        keg_in(self.dir.path(), args)
    }
}

impl Default for TestProject {
    fn default() -> Self {
        Self::new()
    }
}

/// Run the keg binary in `dir` with an isolated cache
pub fn keg_in(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_keg"))
        .current_dir(dir)
        .env("KEG_CACHE_DIR", dir.join(".cache"))
        .env_remove("RUST_LOG")
        .env_remove("KEG_PROJECT_DIR")
        .args(args)
        .output()
        .expect("Failed to execute keg")
}

/// Stdout of a finished command
pub fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

/// Stdout and stderr of a finished command
pub fn combined(output: &Output) -> String {
    format!(
        "{}{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    )
}

/// Default project configuration for testing
pub const SAMPLE_CONFIG: &str = r#"
[project]
name = "test-project"

[paths]
prefix = "out"

[build]
jobs = 1
make_jobs = 2
"#;
