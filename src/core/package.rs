//! Package specifications and build actions
//!
//! A [`PackageSpec`] is what the orchestrator schedules: a unique name, the
//! names it depends on, and an opaque [`BuildAction`]. Statuses are not stored
//! on the spec itself; the orchestrator owns them for the duration of a run.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::core::build_env::BuildEnvironment;
use crate::error::ActionError;

/// Lifecycle state of a package within one run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageStatus {
    /// Not started yet
    Pending,
    /// Build action in flight
    Building,
    /// Build action succeeded
    Installed,
    /// Build action failed
    Failed,
    /// Never built because a dependency did not install or the run was cancelled
    Skipped,
}

impl PackageStatus {
    /// Whether no further transition is possible
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Installed | Self::Failed | Self::Skipped)
    }

    /// Allowed transitions: Pending -> Building -> {Installed, Failed}, Pending -> Skipped
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Building | Self::Skipped)
                | (Self::Building, Self::Installed | Self::Failed)
        )
    }
}

impl fmt::Display for PackageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Building => write!(f, "building"),
            Self::Installed => write!(f, "installed"),
            Self::Failed => write!(f, "failed"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

/// Everything a build action gets to see about the package it builds
#[derive(Debug)]
pub struct BuildContext<'a> {
    /// Package name
    pub package: &'a str,
    /// Package version, if the spec declares one
    pub version: Option<&'a str>,
    /// Resolved environment; apply it to child processes, never to this process
    pub env: &'a BuildEnvironment,
    /// Private scratch directory, removed after the action returns
    pub workdir: &'a Path,
    /// Whether the optional verify step should run
    pub verify: bool,
}

/// Output of a successful build action
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildOutput {
    /// Captured output of every step
    pub log: String,
}

impl BuildOutput {
    /// Create output from captured log text
    pub fn new(log: impl Into<String>) -> Self {
        Self { log: log.into() }
    }
}

/// The work that turns a package spec into an installed prefix.
///
/// Implementations block until the external toolchain exits.
pub trait BuildAction: Send + Sync {
    /// Build and install the package described by `ctx`
    fn build(&self, ctx: &BuildContext<'_>) -> Result<BuildOutput, ActionError>;
}

/// Adapter turning a closure into a [`BuildAction`]
struct FnAction<F>(F);

impl<F> BuildAction for FnAction<F>
where
    F: Fn(&BuildContext<'_>) -> Result<BuildOutput, ActionError> + Send + Sync,
{
    fn build(&self, ctx: &BuildContext<'_>) -> Result<BuildOutput, ActionError> {
        (self.0)(ctx)
    }
}

/// A schedulable package
#[derive(Clone)]
pub struct PackageSpec {
    name: String,
    version: Option<String>,
    depends: Vec<String>,
    verify: Option<bool>,
    action: Arc<dyn BuildAction>,
}

impl PackageSpec {
    /// Create a spec with no dependencies
    pub fn new(name: impl Into<String>, action: Arc<dyn BuildAction>) -> Self {
        Self {
            name: name.into(),
            version: None,
            depends: Vec::new(),
            verify: None,
            action,
        }
    }

    /// Create a spec whose build action is a closure
    pub fn from_fn<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&BuildContext<'_>) -> Result<BuildOutput, ActionError> + Send + Sync + 'static,
    {
        Self::new(name, Arc::new(FnAction(f)))
    }

    /// Set the dependency list
    #[must_use]
    pub fn with_depends<I, S>(mut self, depends: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends = depends.into_iter().map(Into::into).collect();
        self
    }

    /// Set the version
    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Override the project-wide verify policy for this package
    #[must_use]
    pub fn with_verify(mut self, verify: bool) -> Self {
        self.verify = Some(verify);
        self
    }

    /// Package name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Package version
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// Declared dependencies, in declaration order
    pub fn depends(&self) -> &[String] {
        &self.depends
    }

    /// Per-package verify policy (`None` = project default)
    pub fn verify(&self) -> Option<bool> {
        self.verify
    }

    /// Shared handle to the build action
    pub fn action(&self) -> Arc<dyn BuildAction> {
        Arc::clone(&self.action)
    }
}

impl fmt::Debug for PackageSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PackageSpec")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("depends", &self.depends)
            .field("verify", &self.verify)
            .finish_non_exhaustive()
    }
}
