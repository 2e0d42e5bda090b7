//! Distribution staging
//!
//! `keg pack` merges the installed prefixes of a plan into one directory
//! tree ready for an installer. Only the configured top-level directories
//! are staged, exclude patterns drop files and whole subtrees, and symlinks
//! are recreated as symlinks.

use std::path::{Path, PathBuf};

use regex::Regex;

use crate::core::graph::BuildPlan;
use crate::core::project::Project;
use crate::error::PackError;
use crate::infra::filesystem::{self, CopyStats};

/// Pack options
#[derive(Debug, Clone, Default)]
pub struct PackOptions {
    /// Replace an existing destination
    pub prune: bool,
}

/// What was staged
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackSummary {
    /// Packages staged, in plan order
    pub packages: Vec<String>,
    /// Copy counts over all packages
    pub stats: CopyStats,
}

/// Stage the installed prefixes of every package in `plan` into `dest`
pub fn pack(
    project: &Project,
    plan: &BuildPlan,
    dest: &Path,
    options: &PackOptions,
) -> Result<PackSummary, PackError> {
    let pack = &project.config().pack;
    let excludes = pack.exclude_patterns()?;
    let prefixes = installed_prefixes(project, plan)?;

    if dest.exists() {
        if !options.prune {
            return Err(PackError::DestinationExists {
                path: dest.to_path_buf(),
            });
        }
        tracing::info!("Removing existing {}", dest.display());
        filesystem::remove_dir_all(dest)?;
    }
    filesystem::create_dir_all(dest)?;

    let mut summary = PackSummary::default();
    for (name, prefix) in prefixes {
        for dir in &pack.dirs {
            let from = prefix.join(dir);
            if !from.is_dir() {
                continue;
            }
            let stats = filesystem::copy_tree_filtered(&from, &dest.join(dir), |rel| {
                !is_excluded(&excludes, &Path::new(dir).join(rel))
            })?;
            tracing::debug!("{name}: staged {dir} ({} files)", stats.files);
            summary.stats += stats;
        }
        summary.packages.push(name);
    }
    Ok(summary)
}

/// Installed prefix of every package, failing on the first one missing
fn installed_prefixes(
    project: &Project,
    plan: &BuildPlan,
) -> Result<Vec<(String, PathBuf)>, PackError> {
    let env = project.environment();
    plan.names()
        .into_iter()
        .map(|name| {
            let version = project.formula(name).map(|f| f.package.version.as_str());
            let prefix = env.prefix_for(name, version);
            if prefix.is_dir() {
                Ok((name.to_string(), prefix))
            } else {
                Err(PackError::NotInstalled {
                    package: name.to_string(),
                    prefix,
                })
            }
        })
        .collect()
}

fn is_excluded(patterns: &[Regex], rel: &Path) -> bool {
    let rel = rel.to_string_lossy().replace('\\', "/");
    patterns.iter().any(|p| p.is_match(&rel))
}
