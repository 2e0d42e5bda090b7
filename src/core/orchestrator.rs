//! Build orchestration logic
//!
//! Runs a [`BuildPlan`]: packages whose dependencies all installed are
//! handed to blocking workers (at most `jobs` at a time), packages with a
//! failed or skipped dependency are skipped without running, and every
//! package ends with exactly one [`BuildResult`].
//!
//! The status map is the only shared mutable state. Only the scheduler loop
//! writes it; [`Orchestrator::status`] reads it from anywhere.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::core::build_env::{BuildEnvironment, EnvironmentProvider};
use crate::core::graph::{self, BuildGraph, BuildPlan};
use crate::core::package::{BuildAction, BuildContext, BuildOutput, PackageSpec, PackageStatus};
use crate::error::{ActionError, BuildError, PlanError};

/// Outcome of one package in one run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BuildResult {
    /// Package name
    pub package: String,
    /// Terminal status
    pub status: PackageStatus,
    /// Exit code of the failing command, if any
    #[serde(default)]
    pub exit_code: Option<i32>,
    /// Failure or skip reason
    #[serde(default)]
    pub error: Option<String>,
    /// Wall-clock time spent in the build action
    pub duration: Duration,
    /// Captured build output (persisted separately as a log file)
    #[serde(skip)]
    pub output: String,
}

impl BuildResult {
    fn skipped(package: &str, reason: String) -> Self {
        Self {
            package: package.to_string(),
            status: PackageStatus::Skipped,
            exit_code: None,
            error: Some(reason),
            duration: Duration::ZERO,
            output: String::new(),
        }
    }
}

/// Aggregate of one run
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RunReport {
    /// Results in completion order
    pub results: Vec<BuildResult>,
    /// Wall-clock time of the whole run
    pub elapsed: Duration,
    /// Whether the run was stopped externally
    #[serde(default)]
    pub cancelled: bool,
}

impl RunReport {
    /// True when no package failed and the run was not cancelled
    pub fn success(&self) -> bool {
        !self.cancelled && self.failed().is_empty()
    }

    /// Result of a package
    pub fn result(&self, package: &str) -> Option<&BuildResult> {
        self.results.iter().find(|r| r.package == package)
    }

    /// Final status per package
    pub fn status_map(&self) -> BTreeMap<String, PackageStatus> {
        self.results
            .iter()
            .map(|r| (r.package.clone(), r.status))
            .collect()
    }

    fn with_status(&self, status: PackageStatus) -> Vec<&str> {
        self.results
            .iter()
            .filter(|r| r.status == status)
            .map(|r| r.package.as_str())
            .collect()
    }

    /// Installed packages
    pub fn installed(&self) -> Vec<&str> {
        self.with_status(PackageStatus::Installed)
    }

    /// Failed packages
    pub fn failed(&self) -> Vec<&str> {
        self.with_status(PackageStatus::Failed)
    }

    /// Skipped packages
    pub fn skipped(&self) -> Vec<&str> {
        self.with_status(PackageStatus::Skipped)
    }

    /// One error per failed package
    pub fn failures(&self) -> Vec<BuildError> {
        self.results
            .iter()
            .filter(|r| r.status == PackageStatus::Failed)
            .map(|r| BuildError::BuildActionFailed {
                package: r.package.clone(),
                error: r.error.clone().unwrap_or_default(),
            })
            .collect()
    }

    /// Load a report written by [`RunReport::save`]
    pub fn load(path: &Path) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(std::io::Error::other)
    }

    /// Write the report as pretty JSON
    pub fn save(&self, path: &Path) -> Result<(), std::io::Error> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(path, content)
    }
}

/// Callback invoked on the scheduler task for every recorded result
pub type ResultCallback = Box<dyn Fn(&BuildResult) + Send + Sync>;

/// A finished build action, as reported back by its worker
struct Finished {
    idx: usize,
    duration: Duration,
    outcome: Result<BuildOutput, ActionError>,
}

/// Build orchestrator state
pub struct Orchestrator {
    env: EnvironmentProvider,
    jobs: usize,
    cancel: CancellationToken,
    statuses: Mutex<HashMap<String, PackageStatus>>,
    observer: Option<ResultCallback>,
}

impl Orchestrator {
    /// Create a sequential orchestrator
    pub fn new(env: EnvironmentProvider) -> Self {
        Self {
            env,
            jobs: 1,
            cancel: CancellationToken::new(),
            statuses: Mutex::new(HashMap::new()),
            observer: None,
        }
    }

    /// Build up to `jobs` independent packages at once (0 is treated as 1)
    #[must_use]
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    /// Use an externally owned stop signal
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Observe results as they are recorded
    #[must_use]
    pub fn with_observer(mut self, observer: ResultCallback) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Worker limit
    pub fn jobs(&self) -> usize {
        self.jobs
    }

    /// Handle that stops the current run when cancelled
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Validate specs and compute their build order
    pub fn plan(&self, specs: Vec<PackageSpec>) -> Result<BuildPlan, PlanError> {
        graph::plan(specs)
    }

    /// Current status of a package in the current or last run
    pub fn status(&self, package: &str) -> Option<PackageStatus> {
        self.lock_statuses().get(package).copied()
    }

    /// Snapshot of every status
    pub fn status_map(&self) -> BTreeMap<String, PackageStatus> {
        self.lock_statuses()
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect()
    }

    fn lock_statuses(&self) -> MutexGuard<'_, HashMap<String, PackageStatus>> {
        self.statuses.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn transition(&self, package: &str, next: PackageStatus) {
        let mut statuses = self.lock_statuses();
        let current = statuses
            .get(package)
            .copied()
            .unwrap_or(PackageStatus::Pending);
        debug_assert!(
            current.can_transition_to(next),
            "illegal transition {current} -> {next} for {package}"
        );
        statuses.insert(package.to_string(), next);
        tracing::debug!("{package}: {current} -> {next}");
    }

    fn record(&self, results: &mut Vec<BuildResult>, result: BuildResult) {
        if let Some(ref observer) = self.observer {
            observer(&result);
        }
        results.push(result);
    }

    /// Execute the plan.
    ///
    /// Per-package failures are recorded in the report and only skip their
    /// dependents. Returns [`BuildError::Cancelled`] (with the partial
    /// report) when the cancellation token fires.
    pub async fn run(&self, plan: &BuildPlan) -> Result<RunReport, BuildError> {
        let started = Instant::now();
        let graph = plan.graph();
        let order = plan.order();

        {
            let mut statuses = self.lock_statuses();
            statuses.clear();
            for spec in graph.specs() {
                statuses.insert(spec.name().to_string(), PackageStatus::Pending);
            }
        }

        // rank = position in the planned order; the ready set is keyed by it
        let mut rank = vec![0; graph.len()];
        for (r, &idx) in order.iter().enumerate() {
            rank[idx] = r;
        }
        let mut waiting: Vec<usize> = (0..graph.len())
            .map(|i| graph.dependencies(i).len())
            .collect();
        let mut ready: BTreeSet<usize> = order
            .iter()
            .enumerate()
            .filter(|&(_, &idx)| waiting[idx] == 0)
            .map(|(r, _)| r)
            .collect();

        let mut in_flight: JoinSet<Finished> = JoinSet::new();
        let mut results = Vec::with_capacity(graph.len());
        let mut cancelled = false;

        tracing::info!(
            "Building {} packages with {} worker(s)",
            plan.len(),
            self.jobs
        );

        loop {
            if !cancelled && self.cancel.is_cancelled() {
                cancelled = true;
                ready.clear();
                self.skip_pending(graph, order, &mut results);
            }

            while !cancelled && in_flight.len() < self.jobs {
                let Some(r) = ready.pop_first() else { break };
                let idx = order[r];
                let spec = graph.spec(idx);

                if let Some(blocker) = self.blocking_dependency(graph, idx) {
                    tracing::warn!(
                        "Skipping {}: dependency '{blocker}' did not install",
                        spec.name()
                    );
                    self.transition(spec.name(), PackageStatus::Skipped);
                    let result = BuildResult::skipped(
                        spec.name(),
                        format!("dependency '{blocker}' did not install"),
                    );
                    self.record(&mut results, result);
                    release(graph, idx, &rank, &mut waiting, &mut ready);
                    continue;
                }

                self.launch(graph, idx, &mut in_flight);
            }

            if in_flight.is_empty() {
                break;
            }

            let joined = tokio::select! {
                joined = in_flight.join_next() => joined,
                () = self.cancel.cancelled(), if !cancelled => continue,
            };
            let Some(joined) = joined else { break };
            let finished = joined.map_err(|e| BuildError::Scheduler {
                message: e.to_string(),
            })?;

            let idx = finished.idx;
            let result = self.complete(graph.spec(idx), finished);
            self.record(&mut results, result);
            if !cancelled {
                release(graph, idx, &rank, &mut waiting, &mut ready);
            }
        }

        let report = RunReport {
            results,
            elapsed: started.elapsed(),
            cancelled,
        };

        if cancelled {
            tracing::warn!("Build cancelled");
            return Err(BuildError::Cancelled {
                report: Box::new(report),
            });
        }

        tracing::info!(
            "Run finished: {} installed, {} failed, {} skipped",
            report.installed().len(),
            report.failed().len(),
            report.skipped().len()
        );
        Ok(report)
    }

    /// First dependency of `idx` that did not install
    fn blocking_dependency<'g>(&self, graph: &'g BuildGraph, idx: usize) -> Option<&'g str> {
        let statuses = self.lock_statuses();
        graph
            .dependencies(idx)
            .iter()
            .map(|&d| graph.spec(d).name())
            .find(|name| statuses.get(*name) != Some(&PackageStatus::Installed))
    }

    fn skip_pending(&self, graph: &BuildGraph, order: &[usize], results: &mut Vec<BuildResult>) {
        for &idx in order {
            let name = graph.spec(idx).name();
            if self.status(name) == Some(PackageStatus::Pending) {
                self.transition(name, PackageStatus::Skipped);
                self.record(results, BuildResult::skipped(name, "build cancelled".to_string()));
            }
        }
    }

    fn launch(&self, graph: &BuildGraph, idx: usize, in_flight: &mut JoinSet<Finished>) {
        let spec = graph.spec(idx);
        self.transition(spec.name(), PackageStatus::Building);
        tracing::info!("Building package: {}", spec.name());

        let deps: Vec<&PackageSpec> = graph
            .transitive_dependencies(idx)
            .into_iter()
            .map(|d| graph.spec(d))
            .collect();
        let env = self.env.environment_for(spec, &deps);
        let job = Job {
            package: spec.name().to_string(),
            version: spec.version().map(String::from),
            verify: self.env.verify_for(spec),
            work_root: self.env.work_root().to_path_buf(),
            action: spec.action(),
        };

        in_flight.spawn(async move {
            let started = Instant::now();
            let outcome = tokio::task::spawn_blocking(move || job.execute(&env))
                .await
                .unwrap_or_else(|e| {
                    let reason = if e.is_panic() {
                        "build action panicked".to_string()
                    } else {
                        format!("build action aborted: {e}")
                    };
                    Err(ActionError::Other(reason))
                });
            Finished {
                idx,
                duration: started.elapsed(),
                outcome,
            }
        });
    }

    fn complete(&self, spec: &PackageSpec, finished: Finished) -> BuildResult {
        let name = spec.name();
        match finished.outcome {
            Ok(output) => {
                self.transition(name, PackageStatus::Installed);
                tracing::info!("Built package: {name} ({:.1?})", finished.duration);
                BuildResult {
                    package: name.to_string(),
                    status: PackageStatus::Installed,
                    exit_code: None,
                    error: None,
                    duration: finished.duration,
                    output: output.log,
                }
            }
            Err(e) => {
                self.transition(name, PackageStatus::Failed);
                tracing::warn!("Package {name} failed: {e}");
                BuildResult {
                    package: name.to_string(),
                    status: PackageStatus::Failed,
                    exit_code: e.exit_code(),
                    error: Some(e.to_string()),
                    duration: finished.duration,
                    output: e.output().unwrap_or_default().to_string(),
                }
            }
        }
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("env", &self.env)
            .field("jobs", &self.jobs)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

/// Mark `idx` terminal for its dependents, queueing those with nothing left to wait on
fn release(
    graph: &BuildGraph,
    idx: usize,
    rank: &[usize],
    waiting: &mut [usize],
    ready: &mut BTreeSet<usize>,
) {
    for &d in graph.dependents(idx) {
        waiting[d] -= 1;
        if waiting[d] == 0 {
            ready.insert(rank[d]);
        }
    }
}

/// Everything a worker needs, owned so it can move onto a blocking thread
struct Job {
    package: String,
    version: Option<String>,
    verify: bool,
    work_root: PathBuf,
    action: Arc<dyn BuildAction>,
}

impl Job {
    /// Run the action inside a private work directory.
    ///
    /// The directory is removed on every exit path, including unwinding.
    fn execute(self, env: &BuildEnvironment) -> Result<BuildOutput, ActionError> {
        std::fs::create_dir_all(&self.work_root).map_err(|e| ActionError::Workspace {
            path: self.work_root.clone(),
            error: e.to_string(),
        })?;
        let workdir = tempfile::Builder::new()
            .prefix(&format!("keg-{}-", self.package))
            .tempdir_in(&self.work_root)
            .map_err(|e| ActionError::Workspace {
                path: self.work_root.clone(),
                error: e.to_string(),
            })?;

        let ctx = BuildContext {
            package: &self.package,
            version: self.version.as_deref(),
            env,
            workdir: workdir.path(),
            verify: self.verify,
        };
        let outcome = self.action.build(&ctx);

        let path = workdir.path().to_path_buf();
        if let Err(e) = workdir.close() {
            tracing::warn!("Failed to remove work directory {}: {e}", path.display());
        }
        outcome
    }
}
