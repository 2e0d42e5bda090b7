//! Formula definition handling
//!
//! A formula is a TOML file describing one package: its source archive (or a
//! local source tree), dependencies, build knobs and environment overrides.
//! Formulae live in the project's formula directory, one `<name>.toml` each.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::core::build_env::EnvOverrides;
use crate::error::RecipeError;

static NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9][A-Za-z0-9+._-]*$").unwrap_or_else(|e| unreachable!("{e}"))
});

static SHA256_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9a-fA-F]{64}$").unwrap_or_else(|e| unreachable!("{e}")));

/// Highest strip level accepted for patches
pub const MAX_PATCH_STRIP: u8 = 9;

/// Check a package name against the allowed character set
pub fn is_valid_name(name: &str) -> bool {
    NAME_RE.is_match(name)
}

/// Complete formula definition
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Formula {
    /// Package metadata
    pub package: FormulaMetadata,

    /// Source configuration
    pub source: SourceConfig,

    /// Build configuration
    #[serde(default)]
    pub build: FormulaBuild,

    /// Environment overrides applied to this package only
    #[serde(default)]
    pub env: EnvOverrides,
}

/// Package metadata
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FormulaMetadata {
    /// Package name
    pub name: String,

    /// Package version
    pub version: String,

    /// Homepage URL
    #[serde(default)]
    pub homepage: Option<String>,

    /// Build dependencies
    #[serde(default)]
    pub depends: Vec<String>,
}

/// Where the sources come from: a checksummed archive or a local tree
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SourceConfig {
    /// Archive URL
    #[serde(default)]
    pub url: Option<String>,

    /// SHA256 checksum of the archive
    #[serde(default)]
    pub sha256: Option<String>,

    /// Alternate URLs for the same archive, tried in order
    #[serde(default)]
    pub mirrors: Vec<String>,

    /// Local source directory, relative to the project root
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl SourceConfig {
    /// Primary URL followed by mirrors
    pub fn urls(&self) -> Vec<&str> {
        self.url
            .iter()
            .map(String::as_str)
            .chain(self.mirrors.iter().map(String::as_str))
            .collect()
    }

    /// File name of the archive, taken from the last URL path segment
    pub fn archive_name(&self) -> Option<&str> {
        let url = self.url.as_deref()?;
        let path = url.split(['?', '#']).next().unwrap_or(url);
        path.rsplit('/').next().filter(|s| !s.is_empty())
    }
}

/// Build configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FormulaBuild {
    /// Extra `./configure` arguments
    #[serde(default)]
    pub configure_args: Vec<String>,

    /// Extra `make` arguments
    #[serde(default)]
    pub make_args: Vec<String>,

    /// Run the verify target; `None` uses the project default
    #[serde(default)]
    pub verify: Option<bool>,

    /// Make target used for verification
    #[serde(default = "default_verify_target")]
    pub verify_target: String,

    /// Force a single make job
    #[serde(default)]
    pub deparallelize: bool,

    /// Patches applied after extraction
    #[serde(default)]
    pub patches: Vec<Patch>,

    /// Custom steps replacing configure/make/install
    #[serde(default)]
    pub steps: Vec<BuildStep>,

    /// Steps run inside the prefix after install
    #[serde(default)]
    pub post_install: Vec<BuildStep>,
}

impl Default for FormulaBuild {
    fn default() -> Self {
        Self {
            configure_args: Vec::new(),
            make_args: Vec::new(),
            verify: None,
            verify_target: default_verify_target(),
            deparallelize: false,
            patches: Vec::new(),
            steps: Vec::new(),
            post_install: Vec::new(),
        }
    }
}

fn default_verify_target() -> String {
    "check".to_string()
}

fn default_strip() -> u8 {
    1
}

/// A patch file and its strip level
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Patch {
    /// Patch path, relative to the project root
    pub path: PathBuf,

    /// Leading path components to strip (`patch -p<N>`)
    #[serde(default = "default_strip")]
    pub strip: u8,
}

/// A single argv step
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BuildStep {
    /// Program to run
    pub run: String,

    /// Arguments
    #[serde(default)]
    pub args: Vec<String>,

    /// Only run when verification is enabled
    #[serde(default)]
    pub verify: bool,
}

impl BuildStep {
    /// Display form of the step
    pub fn command_line(&self) -> String {
        std::iter::once(self.run.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl Formula {
    /// Parse from TOML string
    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Serialize to TOML string
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Package name
    pub fn name(&self) -> &str {
        &self.package.name
    }

    /// Read, parse and validate a formula file.
    ///
    /// The declared package name must match the file stem.
    pub fn load(path: &Path) -> Result<Self, RecipeError> {
        let content = fs::read_to_string(path).map_err(|e| RecipeError::Read {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;
        let formula = Self::from_toml(&content).map_err(|e| RecipeError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;
        formula.validate()?;

        let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
        if stem != formula.name() {
            return Err(RecipeError::NameMismatch {
                path: path.to_path_buf(),
                name: formula.package.name,
            });
        }
        Ok(formula)
    }

    /// Load every `*.toml` formula in `dir`, sorted by file name
    pub fn load_dir(dir: &Path) -> Result<Vec<Self>, RecipeError> {
        let entries = fs::read_dir(dir).map_err(|e| RecipeError::Read {
            path: dir.to_path_buf(),
            error: e.to_string(),
        })?;

        let mut paths = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| RecipeError::Read {
                path: dir.to_path_buf(),
                error: e.to_string(),
            })?;
            let path = entry.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == "toml") {
                paths.push(path);
            }
        }
        paths.sort();

        tracing::debug!("Loading {} formulae from {}", paths.len(), dir.display());
        paths.iter().map(|p| Self::load(p)).collect()
    }

    /// Check structural rules that serde cannot express
    pub fn validate(&self) -> Result<(), RecipeError> {
        let name = self.name();
        if !is_valid_name(name) {
            return Err(RecipeError::InvalidName {
                name: name.to_string(),
            });
        }
        if self.package.version.trim().is_empty() {
            return Err(RecipeError::MissingField {
                package: name.to_string(),
                field: "package.version".to_string(),
            });
        }

        let mut seen = HashSet::new();
        for dep in &self.package.depends {
            if !is_valid_name(dep) {
                return Err(RecipeError::InvalidName { name: dep.clone() });
            }
            if !seen.insert(dep.as_str()) {
                tracing::warn!("Formula '{name}' lists dependency '{dep}' more than once");
            }
        }

        match (&self.source.url, &self.source.path) {
            (Some(_), None) => {
                let Some(sha256) = &self.source.sha256 else {
                    return Err(RecipeError::MissingField {
                        package: name.to_string(),
                        field: "source.sha256".to_string(),
                    });
                };
                if !SHA256_RE.is_match(sha256) {
                    return Err(RecipeError::InvalidChecksum {
                        package: name.to_string(),
                        sha256: sha256.clone(),
                    });
                }
            }
            (None, Some(_)) => {}
            _ => {
                return Err(RecipeError::InvalidSource {
                    package: name.to_string(),
                })
            }
        }

        for patch in &self.build.patches {
            if patch.strip > MAX_PATCH_STRIP {
                return Err(RecipeError::InvalidPatch {
                    package: name.to_string(),
                    patch: patch.path.display().to_string(),
                    strip: patch.strip,
                });
            }
        }

        Ok(())
    }
}
