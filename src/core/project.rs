//! Project loading
//!
//! A project is a directory with a `keg.toml` and a formula directory. Loading
//! one reads both exactly once; everything downstream (plans, environments,
//! fetch requests) is derived from the loaded values.

use std::path::{Path, PathBuf};

use crate::core::build_env::EnvironmentProvider;
use crate::core::config::ProjectConfig;
use crate::core::formula::Formula;
use crate::core::graph::{self, BuildPlan};
use crate::core::package::PackageSpec;
use crate::error::{KegError, PlanError};
use crate::infra::dirs::KegDirs;
use crate::infra::download::FetchRequest;
use crate::infra::executor::{self, FormulaAction};

/// Build output directory, relative to the project root
pub const BUILD_DIR: &str = "build";

/// A loaded project
#[derive(Debug, Clone)]
pub struct Project {
    root: PathBuf,
    config: ProjectConfig,
    formulae: Vec<Formula>,
    dirs: KegDirs,
}

impl Project {
    /// Load `keg.toml` and every formula under `root`
    pub fn load(root: &Path) -> Result<Self, KegError> {
        let config = ProjectConfig::load(root)?;
        let formulae = Formula::load_dir(&config.formula_dir(root))?;
        tracing::debug!(
            "Loaded project at {} with {} formulae",
            root.display(),
            formulae.len()
        );
        Ok(Self::from_parts(root.to_path_buf(), config, formulae))
    }

    /// Assemble a project from already loaded parts
    pub fn from_parts(root: PathBuf, config: ProjectConfig, formulae: Vec<Formula>) -> Self {
        Self {
            root,
            config,
            formulae,
            dirs: KegDirs::new(),
        }
    }

    /// Use a different cache directory layout
    #[must_use]
    pub fn with_dirs(mut self, dirs: KegDirs) -> Self {
        self.dirs = dirs;
        self
    }

    /// Project root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Parsed configuration
    pub fn config(&self) -> &ProjectConfig {
        &self.config
    }

    /// Formulae in load order
    pub fn formulae(&self) -> &[Formula] {
        &self.formulae
    }

    /// Formula by name
    pub fn formula(&self, name: &str) -> Option<&Formula> {
        self.formulae.iter().find(|f| f.name() == name)
    }

    /// Build output directory
    pub fn build_dir(&self) -> PathBuf {
        self.root.join(BUILD_DIR)
    }

    /// Per-package build logs
    pub fn logs_dir(&self) -> PathBuf {
        self.build_dir().join("logs")
    }

    /// Default location of the last run's report
    pub fn report_path(&self) -> PathBuf {
        self.build_dir().join("report.json")
    }

    /// One schedulable spec per formula, in load order
    pub fn specs(&self) -> Vec<PackageSpec> {
        let downloads = self.dirs.downloads_dir();
        self.formulae
            .iter()
            .map(|f| {
                FormulaAction::new(f.clone(), self.root.clone(), downloads.clone()).into_spec()
            })
            .collect()
    }

    /// Plan `targets` and their dependencies (every formula when empty)
    pub fn plan(&self, targets: &[String]) -> Result<BuildPlan, PlanError> {
        graph::plan_for(self.specs(), targets)
    }

    /// Environment provider configured from `keg.toml`
    pub fn environment(&self) -> EnvironmentProvider {
        let build = &self.config.build;
        EnvironmentProvider::new(self.config.prefix(&self.root))
            .with_cellar(self.config.cellar(&self.root))
            .with_work_root(self.config.work_dir(&self.root))
            .with_make_jobs(self.config.make_jobs())
            .with_deployment_target(build.deployment_target.clone())
            .with_overrides(self.config.env.to_overrides())
            .with_verify_default(build.verify)
    }

    /// Download requests for every url-sourced package in `plan`
    pub fn fetch_requests(&self, plan: &BuildPlan) -> Vec<FetchRequest> {
        let downloads = self.dirs.downloads_dir();
        plan.names()
            .into_iter()
            .filter_map(|name| self.formula(name))
            .filter_map(|f| executor::fetch_request(f, &downloads))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::package::PackageStatus;
    use std::fs;
    use tempfile::TempDir;

    fn write_formula(root: &Path, name: &str, depends: &[&str], source: &str) {
        let depends = depends
            .iter()
            .map(|d| format!("\"{d}\""))
            .collect::<Vec<_>>()
            .join(", ");
        fs::write(
            root.join(format!("Formula/{name}.toml")),
            format!(
                "[package]\nname = \"{name}\"\nversion = \"1.0\"\n\
                 depends = [{depends}]\n\n[source]\n{source}\n"
            ),
        )
        .unwrap();
    }

    fn project() -> TempDir {
        let tmp = TempDir::new().unwrap();
        fs::create_dir(tmp.path().join("Formula")).unwrap();
        fs::write(
            tmp.path().join("keg.toml"),
            "[paths]\nprefix = \"out\"\n\n[build]\nverify = true\nmake_jobs = 2\n",
        )
        .unwrap();
        write_formula(tmp.path(), "zlib", &[], "path = \"src/zlib\"");
        write_formula(
            tmp.path(),
            "curl",
            &["zlib"],
            &format!(
                "url = \"https://example.org/curl-1.0.tar.gz\"\nsha256 = \"{}\"",
                "ab".repeat(32)
            ),
        );
        write_formula(tmp.path(), "pth", &[], "path = \"src/pth\"");
        tmp
    }

    #[test]
    fn test_load_and_plan() {
        let tmp = project();
        let project = Project::load(tmp.path()).unwrap();

        let names: Vec<_> = project.formulae().iter().map(Formula::name).collect();
        assert_eq!(names, ["curl", "pth", "zlib"]);

        let plan = project.plan(&[]).unwrap();
        assert_eq!(plan.names(), ["pth", "zlib", "curl"]);

        let plan = project.plan(&["curl".to_string()]).unwrap();
        assert_eq!(plan.names(), ["zlib", "curl"]);

        assert!(matches!(
            project.plan(&["nope".to_string()]),
            Err(PlanError::UnknownPackage { .. })
        ));
    }

    #[test]
    fn test_environment_from_config() {
        let tmp = project();
        let project = Project::load(tmp.path()).unwrap();
        let env = project.environment();

        assert_eq!(env.shared_prefix(), tmp.path().join("out"));
        assert_eq!(
            env.prefix_for("zlib", Some("1.0")),
            tmp.path().join("out/Cellar/zlib/1.0")
        );
        assert_eq!(env.work_root(), tmp.path().join("build/work"));

        let spec = project.specs().into_iter().find(|s| s.name() == "zlib").unwrap();
        assert!(env.verify_for(&spec));
        assert_eq!(env.environment_for(&spec, &[]).jobs, 2);
    }

    #[test]
    fn test_fetch_requests_only_for_url_sources() {
        let tmp = project();
        let project = Project::load(tmp.path())
            .unwrap()
            .with_dirs(KegDirs::with_cache_dir(tmp.path().join("cache")));
        let plan = project.plan(&[]).unwrap();

        let requests = project.fetch_requests(&plan);
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].package, "curl");
        assert_eq!(
            requests[0].dest,
            tmp.path().join("cache/downloads/curl/curl-1.0.tar.gz")
        );
    }

    #[test]
    fn test_missing_config() {
        let tmp = TempDir::new().unwrap();
        assert!(matches!(
            Project::load(tmp.path()),
            Err(KegError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_local_project_builds_end_to_end() {
        let tmp = project();
        for name in ["zlib", "pth"] {
            let src = tmp.path().join("src").join(name);
            fs::create_dir_all(&src).unwrap();
            fs::write(
                src.join("Makefile"),
                "all:\n\t@echo building\n\
                 install:\n\t@mkdir -p $(PREFIX)/lib && touch $(PREFIX)/lib/marker\n\
                 check:\n\t@echo checked\n",
            )
            .unwrap();
        }
        let project = Project::load(tmp.path()).unwrap();
        let plan = project.plan(&["pth".to_string(), "zlib".to_string()]).unwrap();

        let orchestrator = crate::core::orchestrator::Orchestrator::new(project.environment());
        let report = orchestrator.run(&plan).await.unwrap();

        if which::which("make").is_err() {
            return;
        }
        assert_eq!(report.status_map()["zlib"], PackageStatus::Installed);
        assert!(tmp.path().join("out/Cellar/zlib/1.0/lib/marker").exists());
        assert!(report.result("zlib").unwrap().output.contains("checked"));
    }
}
