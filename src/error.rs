//! Error types for keg
//!
//! Domain-specific error types using thiserror.

use std::path::PathBuf;
use thiserror::Error;

use crate::core::orchestrator::RunReport;

/// Planning errors. All of them are fatal and abort the run before any
/// build action executes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    /// Dependency edges form a cycle
    #[error("Circular dependency detected: {}", cycle.join(" -> "))]
    CyclicDependency { cycle: Vec<String> },

    /// A dependency names a package that is not part of the graph
    #[error("Unknown dependency: '{dependency}' required by '{package}'")]
    UnknownDependency { package: String, dependency: String },

    /// Two specs share one identifier
    #[error("Package '{name}' is defined more than once")]
    DuplicatePackage { name: String },

    /// A requested build target does not exist
    #[error("Package '{name}' not found")]
    UnknownPackage { name: String },
}

/// Formula loading and validation errors
#[derive(Error, Debug)]
pub enum RecipeError {
    /// Formula file could not be read
    #[error("Failed to read formula '{path}': {error}")]
    Read { path: PathBuf, error: String },

    /// Formula TOML is malformed
    #[error("Failed to parse formula '{path}': {error}")]
    Parse { path: PathBuf, error: String },

    /// Invalid package name
    #[error("Invalid package name '{name}'")]
    InvalidName { name: String },

    /// Formula name does not match its file name
    #[error("Formula '{path}' declares package '{name}'")]
    NameMismatch { path: PathBuf, name: String },

    /// Missing required field
    #[error("Formula '{package}' is missing required field '{field}'")]
    MissingField { package: String, field: String },

    /// Both or neither of url/path
    #[error("Formula '{package}' must specify exactly one of source.url or source.path")]
    InvalidSource { package: String },

    /// Malformed sha256
    #[error("Formula '{package}' has an invalid sha256 checksum '{sha256}'")]
    InvalidChecksum { package: String, sha256: String },

    /// Patch strip level out of range
    #[error("Formula '{package}' patch '{patch}' has strip level {strip} (max 9)")]
    InvalidPatch {
        package: String,
        patch: String,
        strip: u8,
    },
}

/// Project configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// keg.toml not found
    #[error("No keg.toml found in '{path}'")]
    NotFound { path: PathBuf },

    /// Failed to read config file
    #[error("Failed to read config file '{path}': {error}")]
    Read { path: PathBuf, error: String },

    /// Failed to parse config file
    #[error("Failed to parse config file '{path}': {error}")]
    Parse { path: PathBuf, error: String },

    /// Invalid value
    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Download errors
#[derive(Error, Debug)]
pub enum DownloadError {
    /// Network error
    #[error("Network error downloading '{url}': {error}")]
    NetworkError { url: String, error: String },

    /// Checksum verification failed
    #[error("Checksum mismatch for '{file}': expected {expected}, got {actual}")]
    ChecksumMismatch {
        file: String,
        expected: String,
        actual: String,
    },

    /// IO error
    #[error("IO error for '{path}': {error}")]
    IoError { path: PathBuf, error: String },

    /// Every source url failed
    #[error("All sources failed for '{package}'")]
    AllSourcesFailed { package: String },
}

/// Filesystem errors
#[derive(Error, Debug)]
pub enum FilesystemError {
    /// Source tree is missing
    #[error("Directory '{path}' does not exist")]
    MissingDirectory { path: PathBuf },

    /// Failed to walk a directory tree
    #[error("Failed to read directory '{path}': {error}")]
    ReadDir { path: PathBuf, error: String },

    /// Failed to create directory
    #[error("Failed to create directory '{path}': {error}")]
    CreateDir { path: PathBuf, error: String },

    /// Failed to remove a file or directory
    #[error("Failed to remove '{path}': {error}")]
    Remove { path: PathBuf, error: String },

    /// Failed to copy a file
    #[error("Failed to copy '{from}' to '{to}': {error}")]
    Copy {
        from: PathBuf,
        to: PathBuf,
        error: String,
    },

    /// Failed to recreate a symlink
    #[error("Failed to link '{path}': {error}")]
    Symlink { path: PathBuf, error: String },
}

/// Errors staging installed prefixes into a distribution tree
#[derive(Error, Debug)]
pub enum PackError {
    /// Destination is already there and pruning was not requested
    #[error("Destination '{path}' already exists - use --prune to replace it")]
    DestinationExists { path: PathBuf },

    /// A package has no installed prefix
    #[error("Package '{package}' is not installed (no {prefix})")]
    NotInstalled { package: String, prefix: PathBuf },

    /// Invalid `[pack]` configuration
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Copy failed
    #[error(transparent)]
    Filesystem(#[from] FilesystemError),
}

/// Errors returned by a build action
#[derive(Error, Debug)]
pub enum ActionError {
    /// A step exited unsuccessfully
    #[error("Command `{command}` failed with {}", describe_code(*code))]
    CommandFailed {
        command: String,
        code: Option<i32>,
        output: String,
    },

    /// A step could not be started
    #[error("Failed to run `{command}`: {error}")]
    SpawnFailed { command: String, error: String },

    /// Source acquisition failed
    #[error("Source error: {0}")]
    Source(#[from] DownloadError),

    /// Work directory could not be prepared
    #[error("Work directory error for '{path}': {error}")]
    Workspace { path: PathBuf, error: String },

    /// Local source tree could not be copied
    #[error("Source tree error: {0}")]
    Filesystem(#[from] FilesystemError),

    /// Anything else the action reports
    #[error("{0}")]
    Other(String),
}

impl ActionError {
    /// Exit code of the failing command, when there was one
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::CommandFailed { code, .. } => *code,
            _ => None,
        }
    }

    /// Output captured before the failure
    pub fn output(&self) -> Option<&str> {
        match self {
            Self::CommandFailed { output, .. } => Some(output),
            _ => None,
        }
    }
}

fn describe_code(code: Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {code}"),
        None => "no exit code (terminated by signal)".to_string(),
    }
}

/// Run-level build errors
#[derive(Error, Debug)]
pub enum BuildError {
    /// A package's build action failed; recorded per package, never aborts the run
    #[error("Build failed for package '{package}': {error}")]
    BuildActionFailed { package: String, error: String },

    /// The run was stopped externally
    #[error(
        "Build cancelled: {} installed, {} skipped",
        report.installed().len(),
        report.skipped().len()
    )]
    Cancelled { report: Box<RunReport> },

    /// The scheduler itself broke down
    #[error("Scheduler error: {message}")]
    Scheduler { message: String },
}

/// Top-level keg error type
#[derive(Error, Debug)]
pub enum KegError {
    /// Plan error
    #[error("Plan error: {0}")]
    Plan(#[from] PlanError),

    /// Recipe error
    #[error("Recipe error: {0}")]
    Recipe(#[from] RecipeError),

    /// Config error
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// Build error
    #[error("Build error: {0}")]
    Build(#[from] BuildError),

    /// Download error
    #[error("Download error: {0}")]
    Download(#[from] DownloadError),

    /// Pack error
    #[error("Pack error: {0}")]
    Pack(#[from] PackError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_message_lists_members_in_order() {
        let err = PlanError::CyclicDependency {
            cycle: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(err.to_string(), "Circular dependency detected: a -> b -> a");
    }

    #[test]
    fn test_unknown_dependency_names_referrer() {
        let err = PlanError::UnknownDependency {
            package: "gnutls".into(),
            dependency: "nettle".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("nettle"));
        assert!(msg.contains("gnutls"));
    }

    #[test]
    fn test_action_error_exit_code() {
        let err = ActionError::CommandFailed {
            command: "make install".into(),
            code: Some(2),
            output: "boom".into(),
        };
        assert_eq!(err.exit_code(), Some(2));
        assert_eq!(err.output(), Some("boom"));
        assert!(err.to_string().contains("exit code 2"));

        let err = ActionError::Other("nope".into());
        assert_eq!(err.exit_code(), None);
    }

    #[test]
    fn test_pack_error_suggests_prune() {
        let err = PackError::DestinationExists {
            path: PathBuf::from("/dist/MacGPG2"),
        };
        assert!(err.to_string().contains("--prune"));
    }

    #[test]
    fn test_signal_termination_message() {
        let err = ActionError::CommandFailed {
            command: "make".into(),
            code: None,
            output: String::new(),
        };
        assert!(err.to_string().contains("signal"));
    }
}
