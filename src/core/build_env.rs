//! Build environment setup
//!
//! Provides the explicit environment handed to every build action.
//! Sets up PREFIX, KEG_PREFIX, MAKEFLAGS, CPPFLAGS, LDFLAGS, PKG_CONFIG_PATH
//! and PATH, then layers configured overrides on top. Nothing here touches
//! the environment of the keg process itself.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::package::PackageSpec;

/// How a single override modifies a variable
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvOverride {
    /// Replace the value
    Set(String, String),
    /// Put the value in front of the existing one
    Prepend(String, String),
    /// Put the value after the existing one
    Append(String, String),
}

/// `[env]` table shared by keg.toml and formulae
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct EnvOverrides {
    /// Variables replaced outright
    #[serde(default)]
    pub set: BTreeMap<String, String>,

    /// Values prepended to existing variables
    #[serde(default)]
    pub prepend: BTreeMap<String, String>,

    /// Values appended to existing variables
    #[serde(default)]
    pub append: BTreeMap<String, String>,
}

impl EnvOverrides {
    /// Flatten into an ordered override list: sets, then prepends, then appends
    pub fn to_overrides(&self) -> Vec<EnvOverride> {
        let sets = self
            .set
            .iter()
            .map(|(k, v)| EnvOverride::Set(k.clone(), v.clone()));
        let prepends = self
            .prepend
            .iter()
            .map(|(k, v)| EnvOverride::Prepend(k.clone(), v.clone()));
        let appends = self
            .append
            .iter()
            .map(|(k, v)| EnvOverride::Append(k.clone(), v.clone()));
        sets.chain(prepends).chain(appends).collect()
    }

    /// Whether there is nothing to apply
    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.prepend.is_empty() && self.append.is_empty()
    }
}

/// Separator used when joining values of `key`
fn separator_for(key: &str) -> &'static str {
    if key == "PATH" || key.ends_with("_PATH") {
        ":"
    } else {
        " "
    }
}

/// Build environment for one package.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildEnvironment {
    /// Isolated install prefix of this package
    pub prefix: PathBuf,
    /// Shared root all prefixes live under
    pub shared_prefix: PathBuf,
    /// Prefixes of every transitive dependency, nearest first
    pub dependency_prefixes: Vec<PathBuf>,
    /// Number of parallel make jobs
    pub jobs: usize,
    /// macOS deployment target, when building for one
    pub deployment_target: Option<String>,
    /// PATH inherited from the caller, appended after the prefix bins
    pub inherited_path: Option<String>,
    /// Overrides applied last, in order
    pub overrides: Vec<EnvOverride>,
}

impl BuildEnvironment {
    /// Create an environment for a package installing into `prefix`
    pub fn new(prefix: PathBuf, shared_prefix: PathBuf) -> Self {
        Self {
            prefix,
            shared_prefix,
            dependency_prefixes: Vec::new(),
            jobs: num_cpus::get(),
            deployment_target: None,
            inherited_path: None,
            overrides: Vec::new(),
        }
    }

    /// Set the number of parallel jobs
    #[must_use]
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs;
        self
    }

    /// Set dependency prefixes
    #[must_use]
    pub fn with_dependency_prefixes(mut self, prefixes: Vec<PathBuf>) -> Self {
        self.dependency_prefixes = prefixes;
        self
    }

    /// Set the deployment target
    #[must_use]
    pub fn with_deployment_target(mut self, target: &str) -> Self {
        self.deployment_target = Some(target.to_string());
        self
    }

    /// Set the PATH that follows the prefix bin directories
    #[must_use]
    pub fn with_inherited_path(mut self, path: Option<String>) -> Self {
        self.inherited_path = path;
        self
    }

    /// Replace a variable
    #[must_use]
    pub fn with_env(mut self, key: &str, value: &str) -> Self {
        self.set(key, value);
        self
    }

    /// Replace a variable in place
    pub fn set(&mut self, key: &str, value: &str) {
        self.overrides
            .push(EnvOverride::Set(key.to_string(), value.to_string()));
    }

    /// Prepend to a variable in place
    pub fn prepend(&mut self, key: &str, value: &str) {
        self.overrides
            .push(EnvOverride::Prepend(key.to_string(), value.to_string()));
    }

    /// Append to a variable in place
    pub fn append(&mut self, key: &str, value: &str) {
        self.overrides
            .push(EnvOverride::Append(key.to_string(), value.to_string()));
    }

    /// Apply a list of overrides in order
    pub fn apply(&mut self, overrides: &[EnvOverride]) {
        self.overrides.extend_from_slice(overrides);
    }

    /// Build serially
    pub fn deparallelize(&mut self) {
        self.jobs = 1;
    }

    /// Prefix search order: dependencies, then the shared prefix
    fn search_prefixes(&self) -> impl Iterator<Item = &Path> {
        self.dependency_prefixes
            .iter()
            .map(PathBuf::as_path)
            .chain(std::iter::once(self.shared_prefix.as_path()))
    }

    /// Convert to environment variable map for process execution
    pub fn to_env_map(&self) -> BTreeMap<String, String> {
        let mut env = BTreeMap::new();

        env.insert("PREFIX".to_string(), self.prefix.display().to_string());
        env.insert(
            "KEG_PREFIX".to_string(),
            self.shared_prefix.display().to_string(),
        );
        env.insert("MAKEFLAGS".to_string(), format!("-j{}", self.jobs));

        let join = |sub: &str, flag: &str, sep: &str| {
            self.search_prefixes()
                .map(|p| format!("{flag}{}", p.join(sub).display()))
                .collect::<Vec<_>>()
                .join(sep)
        };
        env.insert("CPPFLAGS".to_string(), join("include", "-I", " "));
        env.insert("LDFLAGS".to_string(), join("lib", "-L", " "));
        env.insert("PKG_CONFIG_PATH".to_string(), join("lib/pkgconfig", "", ":"));

        let mut path = join("bin", "", ":");
        if let Some(ref inherited) = self.inherited_path {
            if !inherited.is_empty() {
                path.push(':');
                path.push_str(inherited);
            }
        }
        env.insert("PATH".to_string(), path);

        if let Some(ref target) = self.deployment_target {
            env.insert("MACOSX_DEPLOYMENT_TARGET".to_string(), target.clone());
        }

        for o in &self.overrides {
            match o {
                EnvOverride::Set(key, value) => {
                    env.insert(key.clone(), value.clone());
                }
                EnvOverride::Prepend(key, value) => {
                    let sep = separator_for(key);
                    let entry = env.entry(key.clone()).or_default();
                    *entry = if entry.is_empty() {
                        value.clone()
                    } else {
                        format!("{value}{sep}{entry}")
                    };
                }
                EnvOverride::Append(key, value) => {
                    let sep = separator_for(key);
                    let entry = env.entry(key.clone()).or_default();
                    if !entry.is_empty() {
                        entry.push_str(sep);
                    }
                    entry.push_str(value);
                }
            }
        }

        env
    }

    /// Check that the environment can drive a build
    pub fn validate(&self) -> Result<(), BuildEnvError> {
        if self.prefix.as_os_str().is_empty() {
            return Err(BuildEnvError::MissingVariable("PREFIX".to_string()));
        }
        if self.jobs == 0 {
            return Err(BuildEnvError::InvalidValue {
                variable: "MAKEFLAGS".to_string(),
                reason: "jobs must be greater than 0".to_string(),
            });
        }
        Ok(())
    }
}

/// Build environment errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BuildEnvError {
    /// Required variable is missing
    #[error("Missing required environment variable: {0}")]
    MissingVariable(String),
    /// Variable has invalid value
    #[error("Invalid value for {variable}: {reason}")]
    InvalidValue { variable: String, reason: String },
}

/// Resolves prefixes and shared overrides into per-package environments.
///
/// Built once per invocation from the project configuration and shared by
/// every build action of the run.
#[derive(Debug, Clone)]
pub struct EnvironmentProvider {
    shared_prefix: PathBuf,
    cellar: PathBuf,
    work_root: PathBuf,
    make_jobs: usize,
    deployment_target: Option<String>,
    overrides: Vec<EnvOverride>,
    verify_default: bool,
    inherited_path: Option<String>,
}

impl EnvironmentProvider {
    /// Create a provider rooted at `shared_prefix`, with the cellar at `<prefix>/Cellar`
    pub fn new(shared_prefix: PathBuf) -> Self {
        Self {
            cellar: shared_prefix.join("Cellar"),
            shared_prefix,
            work_root: std::env::temp_dir(),
            make_jobs: num_cpus::get(),
            deployment_target: None,
            overrides: Vec::new(),
            verify_default: false,
            inherited_path: std::env::var("PATH").ok(),
        }
    }

    /// Set the cellar
    #[must_use]
    pub fn with_cellar(mut self, cellar: PathBuf) -> Self {
        self.cellar = cellar;
        self
    }

    /// Set the directory per-package work directories are created in
    #[must_use]
    pub fn with_work_root(mut self, work_root: PathBuf) -> Self {
        self.work_root = work_root;
        self
    }

    /// Set the number of make jobs
    #[must_use]
    pub fn with_make_jobs(mut self, jobs: usize) -> Self {
        self.make_jobs = jobs;
        self
    }

    /// Set the deployment target
    #[must_use]
    pub fn with_deployment_target(mut self, target: Option<String>) -> Self {
        self.deployment_target = target;
        self
    }

    /// Add shared overrides
    #[must_use]
    pub fn with_overrides(mut self, overrides: Vec<EnvOverride>) -> Self {
        self.overrides.extend(overrides);
        self
    }

    /// Set whether verify steps run for packages that do not decide themselves
    #[must_use]
    pub fn with_verify_default(mut self, verify: bool) -> Self {
        self.verify_default = verify;
        self
    }

    /// Shared prefix
    pub fn shared_prefix(&self) -> &Path {
        &self.shared_prefix
    }

    /// Work root
    pub fn work_root(&self) -> &Path {
        &self.work_root
    }

    /// Isolated prefix of a package: `<cellar>/<name>[/<version>]`
    pub fn prefix_for(&self, name: &str, version: Option<&str>) -> PathBuf {
        let base = self.cellar.join(name);
        match version {
            Some(v) => base.join(v),
            None => base,
        }
    }

    /// Effective verify policy of a spec
    pub fn verify_for(&self, spec: &PackageSpec) -> bool {
        spec.verify().unwrap_or(self.verify_default)
    }

    /// Resolve the environment for `spec`; `deps` are its transitive dependencies, nearest first
    pub fn environment_for(&self, spec: &PackageSpec, deps: &[&PackageSpec]) -> BuildEnvironment {
        let prefixes = deps
            .iter()
            .map(|d| self.prefix_for(d.name(), d.version()))
            .collect();

        let mut env = BuildEnvironment::new(
            self.prefix_for(spec.name(), spec.version()),
            self.shared_prefix.clone(),
        )
        .with_jobs(self.make_jobs)
        .with_dependency_prefixes(prefixes)
        .with_inherited_path(self.inherited_path.clone());
        env.deployment_target.clone_from(&self.deployment_target);
        env.apply(&self.overrides);
        env
    }
}
