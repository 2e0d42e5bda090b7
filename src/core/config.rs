//! Project configuration management
//!
//! Reads `keg.toml` from the project root. The file names the shared prefix,
//! the formula directory and the defaults every build starts from. It is
//! parsed once per invocation and passed around explicitly.

use std::fs;
use std::path::{Path, PathBuf};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::core::build_env::EnvOverrides;
use crate::error::ConfigError;

/// Name of the project configuration file
pub const CONFIG_FILE: &str = "keg.toml";

/// Project configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ProjectConfig {
    /// Project metadata
    #[serde(default)]
    pub project: ProjectInfo,

    /// Directory layout
    #[serde(default)]
    pub paths: PathsConfig,

    /// Build defaults
    #[serde(default)]
    pub build: BuildConfig,

    /// Environment overrides shared by every package
    #[serde(default)]
    pub env: EnvOverrides,

    /// Distribution staging
    #[serde(default)]
    pub pack: PackConfig,
}

/// Project metadata
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ProjectInfo {
    /// Project name
    #[serde(default)]
    pub name: Option<String>,
}

/// Directory layout, relative paths resolve against the project root
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PathsConfig {
    /// Shared prefix dependents compile and link against
    #[serde(default = "default_prefix")]
    pub prefix: PathBuf,

    /// Root of the per-package prefixes (defaults to `<prefix>/Cellar`)
    #[serde(default)]
    pub cellar: Option<PathBuf>,

    /// Directory holding `*.toml` formulae
    #[serde(default = "default_formula_dir")]
    pub formula_dir: PathBuf,

    /// Root for per-package scratch directories
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
            cellar: None,
            formula_dir: default_formula_dir(),
            work_dir: default_work_dir(),
        }
    }
}

fn default_prefix() -> PathBuf {
    PathBuf::from("build/prefix")
}

fn default_formula_dir() -> PathBuf {
    PathBuf::from("Formula")
}

fn default_work_dir() -> PathBuf {
    PathBuf::from("build/work")
}

/// Build defaults
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BuildConfig {
    /// Packages built concurrently (default 1)
    #[serde(default)]
    pub jobs: Option<usize>,

    /// Make jobs per package (default: number of CPUs)
    #[serde(default)]
    pub make_jobs: Option<usize>,

    /// Run each package's verify target unless its formula says otherwise
    #[serde(default)]
    pub verify: bool,

    /// `MACOSX_DEPLOYMENT_TARGET` for every build
    #[serde(default)]
    pub deployment_target: Option<String>,
}

/// What `keg pack` copies out of the installed prefixes
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PackConfig {
    /// Top-level prefix directories to stage
    #[serde(default = "default_pack_dirs")]
    pub dirs: Vec<String>,

    /// Regexes matched against prefix-relative paths (`lib/pkgconfig/zlib.pc`);
    /// a matching directory is left out with everything below it
    #[serde(default)]
    pub exclude: Vec<String>,
}

impl Default for PackConfig {
    fn default() -> Self {
        Self {
            dirs: default_pack_dirs(),
            exclude: Vec::new(),
        }
    }
}

fn default_pack_dirs() -> Vec<String> {
    ["bin", "sbin", "lib", "libexec", "share"]
        .into_iter()
        .map(String::from)
        .collect()
}

impl PackConfig {
    /// Compile the exclude patterns
    pub fn exclude_patterns(&self) -> Result<Vec<Regex>, ConfigError> {
        self.exclude
            .iter()
            .map(|pattern| {
                Regex::new(pattern).map_err(|e| ConfigError::InvalidValue {
                    field: "pack.exclude".to_string(),
                    reason: format!("'{pattern}': {e}"),
                })
            })
            .collect()
    }
}

impl ProjectConfig {
    /// Parse from TOML string
    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Serialize to TOML string
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Load `keg.toml` from a project directory
    pub fn load(project_dir: &Path) -> Result<Self, ConfigError> {
        let path = project_dir.join(CONFIG_FILE);
        if !path.exists() {
            return Err(ConfigError::NotFound {
                path: project_dir.to_path_buf(),
            });
        }
        Self::load_from_path(&path)
    }

    /// Load configuration from a specific file
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;
        let config = Self::from_toml(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that parse but make no sense
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.build.jobs == Some(0) {
            return Err(ConfigError::InvalidValue {
                field: "build.jobs".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if self.build.make_jobs == Some(0) {
            return Err(ConfigError::InvalidValue {
                field: "build.make_jobs".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if self.paths.prefix.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "paths.prefix".to_string(),
                reason: "must not be empty".to_string(),
            });
        }
        if let Some(target) = &self.build.deployment_target {
            let valid = !target.is_empty()
                && target
                    .split('.')
                    .all(|part| !part.is_empty() && part.chars().all(|c| c.is_ascii_digit()));
            if !valid {
                return Err(ConfigError::InvalidValue {
                    field: "build.deployment_target".to_string(),
                    reason: format!("'{target}' is not a version like 10.9"),
                });
            }
        }
        if let Some(dir) = self
            .pack
            .dirs
            .iter()
            .find(|d| d.is_empty() || d.contains('/') || d.as_str() == "..")
        {
            return Err(ConfigError::InvalidValue {
                field: "pack.dirs".to_string(),
                reason: format!("'{dir}' is not a top-level directory name"),
            });
        }
        self.pack.exclude_patterns()?;
        Ok(())
    }

    /// Packages built concurrently
    pub fn jobs(&self) -> usize {
        self.build.jobs.unwrap_or(1)
    }

    /// Make jobs per package
    pub fn make_jobs(&self) -> usize {
        self.build.make_jobs.unwrap_or_else(num_cpus::get)
    }

    /// Shared prefix, resolved against `root`
    pub fn prefix(&self, root: &Path) -> PathBuf {
        root.join(&self.paths.prefix)
    }

    /// Cellar, resolved against `root`
    pub fn cellar(&self, root: &Path) -> PathBuf {
        self.paths
            .cellar
            .as_ref()
            .map_or_else(|| self.prefix(root).join("Cellar"), |c| root.join(c))
    }

    /// Formula directory, resolved against `root`
    pub fn formula_dir(&self, root: &Path) -> PathBuf {
        root.join(&self.paths.formula_dir)
    }

    /// Work directory root, resolved against `root`
    pub fn work_dir(&self, root: &Path) -> PathBuf {
        root.join(&self.paths.work_dir)
    }
}
