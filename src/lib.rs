//! keg - dependency-ordered formula builder
//!
//! Builds packages described by TOML formulae into isolated prefixes,
//! dependencies first, skipping everything downstream of a failure.
//!
//! # Architecture
//!
//! - [`cli`] - Command-line interface parsing and output formatting
//! - [`core`] - Planning, orchestration, formulae and configuration
//! - [`infra`] - Infrastructure layer (network, filesystem, processes)
//! - [`error`] - Error types and handling
//!
//! # Example
//!
//! ```no_run
//! use keg::core::build_env::EnvironmentProvider;
//! use keg::core::orchestrator::Orchestrator;
//! use keg::core::package::{BuildOutput, PackageSpec};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let zlib = PackageSpec::from_fn("zlib", |_| Ok(BuildOutput::default()));
//! let curl = PackageSpec::from_fn("curl", |_| Ok(BuildOutput::default())).with_depends(["zlib"]);
//!
//! let orchestrator = Orchestrator::new(EnvironmentProvider::new("/opt/keg".into()));
//! let plan = orchestrator.plan(vec![curl, zlib])?;
//! assert_eq!(plan.names(), ["zlib", "curl"]);
//!
//! let report = orchestrator.run(&plan).await?;
//! assert!(report.success());
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod core;
pub mod error;
pub mod infra;

#[cfg(test)]
pub mod test_utils;
