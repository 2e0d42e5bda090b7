//! Formula build actions
//!
//! Turns a [`Formula`] into a [`BuildAction`]: fetch and verify the source,
//! unpack it into the work directory, apply patches, then run either the
//! formula's custom steps or the autotools sequence
//! (`./configure`, `make`, `make <verify_target>`, `make install`), and
//! finally the post-install steps inside the prefix.
//!
//! Every command gets the package's [`BuildEnvironment`] through
//! `Command::envs`; stdout and stderr are captured into the build log.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use crate::core::build_env::BuildEnvironment;
use crate::core::formula::{BuildStep, Formula};
use crate::core::package::{BuildAction, BuildContext, BuildOutput, PackageSpec};
use crate::error::{ActionError, DownloadError};
use crate::infra::download::{DownloadManager, FetchRequest};
use crate::infra::filesystem;

/// Build action for a formula
#[derive(Debug, Clone)]
pub struct FormulaAction {
    formula: Arc<Formula>,
    project_root: PathBuf,
    downloads_dir: PathBuf,
    downloader: DownloadManager,
}

impl FormulaAction {
    /// Create an action; relative formula paths resolve against `project_root`
    pub fn new(formula: Formula, project_root: PathBuf, downloads_dir: PathBuf) -> Self {
        Self {
            formula: Arc::new(formula),
            project_root,
            downloads_dir,
            downloader: DownloadManager::new(),
        }
    }

    /// The formula this action builds
    pub fn formula(&self) -> &Formula {
        &self.formula
    }

    /// Wrap into a schedulable spec
    pub fn into_spec(self) -> PackageSpec {
        let formula = Arc::clone(&self.formula);
        let mut spec = PackageSpec::new(formula.name(), Arc::new(self))
            .with_version(formula.package.version.clone())
            .with_depends(formula.package.depends.iter().cloned());
        if let Some(verify) = formula.build.verify {
            spec = spec.with_verify(verify);
        }
        spec
    }

    /// Where the source archive of this formula is cached
    pub fn archive_path(&self) -> Option<PathBuf> {
        archive_path(&self.formula, &self.downloads_dir)
    }

    /// Download request for the source archive, for url sources
    pub fn fetch_request(&self) -> Option<FetchRequest> {
        fetch_request(&self.formula, &self.downloads_dir)
    }

    fn prepare_source(&self, src: &Path, runner: &mut StepRunner) -> Result<(), ActionError> {
        if let Some(path) = &self.formula.source.path {
            let from = self.project_root.join(path);
            runner.note(&format!("Copying sources from {}", from.display()));
            let stats = filesystem::copy_tree(&from, src)?;
            tracing::debug!(
                "{}: copied {} files and {} symlinks",
                self.formula.name(),
                stats.files,
                stats.symlinks
            );
            return Ok(());
        }

        let request = self.fetch_request().ok_or_else(|| {
            ActionError::Other(format!("formula '{}' has no source", self.formula.name()))
        })?;
        self.fetch(&request)?;

        runner.run_in(
            src,
            "tar",
            &[
                "-xf".to_string(),
                request.dest.display().to_string(),
                "--strip-components=1".to_string(),
            ],
        )
    }

    /// Download (or reuse) the archive from the blocking worker thread
    fn fetch(&self, request: &FetchRequest) -> Result<(), ActionError> {
        let fetch = self.downloader.fetch(request, false, None);
        let outcome = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle.block_on(fetch),
            Err(_) => tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .map_err(|e| DownloadError::IoError {
                    path: request.dest.clone(),
                    error: e.to_string(),
                })?
                .block_on(fetch),
        }?;
        tracing::debug!("{}: source {outcome:?}", request.package);
        Ok(())
    }

    fn apply_patches(&self, src: &Path, runner: &mut StepRunner) -> Result<(), ActionError> {
        for patch in &self.formula.build.patches {
            let file = self.project_root.join(&patch.path);
            runner.run_in(
                src,
                "patch",
                &[
                    format!("-p{}", patch.strip),
                    "-i".to_string(),
                    file.display().to_string(),
                ],
            )?;
        }
        Ok(())
    }

    fn autotools(
        &self,
        src: &Path,
        prefix: &Path,
        verify: bool,
        runner: &mut StepRunner,
    ) -> Result<(), ActionError> {
        let build = &self.formula.build;

        if src.join("configure").is_file() {
            let mut args = vec![format!("--prefix={}", prefix.display())];
            args.extend(build.configure_args.iter().cloned());
            runner.run_in(src, "./configure", &args)?;
        } else {
            runner.note("No configure script, running make directly");
        }

        runner.run_in(src, "make", &build.make_args)?;
        if verify {
            runner.run_in(src, "make", std::slice::from_ref(&build.verify_target))?;
        }
        runner.run_in(src, "make", &["install".to_string()])
    }
}

impl BuildAction for FormulaAction {
    fn build(&self, ctx: &BuildContext<'_>) -> Result<BuildOutput, ActionError> {
        let build = &self.formula.build;

        let mut env = ctx.env.clone();
        env.apply(&self.formula.env.to_overrides());
        if build.deparallelize {
            env.deparallelize();
        }
        env.validate()
            .map_err(|e| ActionError::Other(format!("invalid build environment: {e}")))?;

        let mut runner = StepRunner::new(&env);
        let src = ctx.workdir.join("src");
        fs::create_dir_all(&src).map_err(|e| ActionError::Workspace {
            path: src.clone(),
            error: e.to_string(),
        })?;
        fs::create_dir_all(&env.prefix).map_err(|e| ActionError::Workspace {
            path: env.prefix.clone(),
            error: e.to_string(),
        })?;

        self.prepare_source(&src, &mut runner)?;
        self.apply_patches(&src, &mut runner)?;

        if build.steps.is_empty() {
            self.autotools(&src, &env.prefix, ctx.verify, &mut runner)?;
        } else {
            for step in &build.steps {
                runner.run_step(&src, step, ctx.verify)?;
            }
        }

        for step in &build.post_install {
            runner.run_step(&env.prefix, step, ctx.verify)?;
        }

        Ok(BuildOutput::new(runner.into_log()))
    }
}

/// Cached archive location of a url-sourced formula
pub fn archive_path(formula: &Formula, downloads_dir: &Path) -> Option<PathBuf> {
    formula.source.url.as_ref()?;
    let name = formula.source.archive_name().map_or_else(
        || format!("{}-{}.tar", formula.name(), formula.package.version),
        String::from,
    );
    Some(downloads_dir.join(formula.name()).join(name))
}

/// Download request of a url-sourced formula
pub fn fetch_request(formula: &Formula, downloads_dir: &Path) -> Option<FetchRequest> {
    Some(FetchRequest {
        package: formula.name().to_string(),
        urls: formula.source.urls().into_iter().map(String::from).collect(),
        sha256: formula.source.sha256.clone()?,
        dest: archive_path(formula, downloads_dir)?,
    })
}

/// Runs commands with a fixed environment, accumulating their output
struct StepRunner {
    env: BTreeMap<String, String>,
    log: String,
}

impl StepRunner {
    fn new(env: &BuildEnvironment) -> Self {
        Self {
            env: env.to_env_map(),
            log: String::new(),
        }
    }

    fn note(&mut self, line: &str) {
        let _ = writeln!(self.log, "==> {line}");
    }

    fn run_step(&mut self, dir: &Path, step: &BuildStep, verify: bool) -> Result<(), ActionError> {
        if step.verify && !verify {
            self.note(&format!("Skipping verify step: {}", step.command_line()));
            return Ok(());
        }
        self.run_in(dir, &step.run, &step.args)
    }

    fn run_in(&mut self, dir: &Path, program: &str, args: &[String]) -> Result<(), ActionError> {
        let command = std::iter::once(program)
            .chain(args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ");
        tracing::debug!("Running `{command}` in {}", dir.display());
        self.note(&command);

        let output = Command::new(program)
            .args(args)
            .current_dir(dir)
            .envs(&self.env)
            .output()
            .map_err(|e| ActionError::SpawnFailed {
                command: command.clone(),
                error: e.to_string(),
            })?;

        self.log.push_str(&String::from_utf8_lossy(&output.stdout));
        self.log.push_str(&String::from_utf8_lossy(&output.stderr));

        if output.status.success() {
            Ok(())
        } else {
            Err(ActionError::CommandFailed {
                command,
                code: output.status.code(),
                output: std::mem::take(&mut self.log),
            })
        }
    }

    fn into_log(self) -> String {
        self.log
    }
}
