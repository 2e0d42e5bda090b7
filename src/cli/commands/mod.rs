//! CLI command implementations
//!
//! Each command is implemented in its own submodule.

pub mod build;
pub mod check;
pub mod doctor;
pub mod fetch;
pub mod pack;
pub mod plan;
pub mod status;

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::Subcommand;

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the build order
    Plan {
        /// Only these packages and their dependencies (all if not specified)
        packages: Vec<String>,
    },

    /// Fetch sources and build packages in dependency order
    Build {
        /// Only these packages and their dependencies (all if not specified)
        packages: Vec<String>,

        /// Number of packages built concurrently
        #[arg(short, long)]
        jobs: Option<usize>,

        /// Where to write the run report (default: build/report.json)
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Download and verify package sources
    Fetch {
        /// Only these packages and their dependencies (all if not specified)
        packages: Vec<String>,

        /// Number of parallel downloads
        #[arg(short, long, default_value = "4")]
        parallel: usize,

        /// Force re-download even if files exist
        #[arg(short, long)]
        force: bool,
    },

    /// Stage installed prefixes into a distribution directory
    Pack {
        /// Destination directory
        dest: PathBuf,

        /// Only these packages and their dependencies (all if not specified)
        packages: Vec<String>,

        /// Remove the destination first if it exists
        #[arg(short, long)]
        prune: bool,
    },

    /// Show package statuses from the last build
    Status {
        /// Show a single package
        package: Option<String>,

        /// Report to read (default: build/report.json)
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Validate configuration and formulae without building
    Check,

    /// Check host tools and project health
    Doctor,
}

impl Commands {
    /// Execute the command against the project in `project_dir`
    pub async fn run(self, project_dir: &Path) -> Result<()> {
        match self {
            Self::Plan { packages } => plan::execute(project_dir, &packages),
            Self::Build {
                packages,
                jobs,
                report,
            } => {
                let options = build::BuildOptions {
                    packages,
                    jobs,
                    report,
                };
                build::execute(project_dir, options).await
            }
            Self::Fetch {
                packages,
                parallel,
                force,
            } => fetch::execute(project_dir, &packages, parallel, force).await,
            Self::Pack {
                dest,
                packages,
                prune,
            } => pack::execute(project_dir, &dest, &packages, prune),
            Self::Status { package, report } => {
                status::execute(project_dir, package.as_deref(), report.as_deref())
            }
            Self::Check => check::execute(project_dir),
            Self::Doctor => doctor::execute(project_dir),
        }
    }
}
