//! Core business logic module
//!
//! Domain logic: specs, plans, runs, formulae and configuration. Network
//! access and process execution live in [`crate::infra`].
//!
//! # Submodules
//!
//! - [`package`] - Package specs, statuses and the build action trait
//! - [`graph`] - Dependency graph validation and build order
//! - [`orchestrator`] - Build orchestration and run reports
//! - [`build_env`] - Build environment setup
//! - [`formula`] - Formula (TOML recipe) parsing and validation
//! - [`config`] - Project configuration (`keg.toml`)
//! - [`project`] - Project loading
//! - [`fetch`] - Source prefetch logic
//! - [`doctor`] - Host tool checks
//! - [`pack`] - Staging installed prefixes for distribution

pub mod build_env;
pub mod config;
pub mod doctor;
pub mod fetch;
pub mod formula;
pub mod graph;
pub mod orchestrator;
pub mod pack;
pub mod package;
pub mod project;
