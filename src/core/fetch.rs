//! Source prefetch logic
//!
//! Downloads and verifies the archives of every url-sourced package in a
//! plan ahead of a build, so builds can run offline from the cache.

use crate::core::graph::BuildPlan;
use crate::core::project::Project;
use crate::infra::download::{DownloadManager, FetchOutcome};

/// Options for fetching sources
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Number of parallel downloads
    pub parallel: usize,
    /// Download again even if a verified archive is cached
    pub force: bool,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            parallel: 4,
            force: false,
        }
    }
}

/// Result of fetching sources
#[derive(Debug, Default)]
pub struct FetchSummary {
    /// Packages whose archive was downloaded
    pub downloaded: Vec<String>,
    /// Packages whose cached archive was reused
    pub cached: Vec<String>,
    /// Failed packages with error messages
    pub failed: Vec<(String, String)>,
}

impl FetchSummary {
    /// True when nothing failed
    pub fn success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Fetch the sources of every package in `plan`
pub async fn fetch_sources(
    project: &Project,
    plan: &BuildPlan,
    options: &FetchOptions,
) -> FetchSummary {
    let requests = project.fetch_requests(plan);
    tracing::info!("Fetching {} source archive(s)", requests.len());

    let results = DownloadManager::new()
        .fetch_parallel(requests, options.parallel, options.force)
        .await;

    let mut summary = FetchSummary::default();
    for (package, result) in results {
        match result {
            Ok(FetchOutcome::Cached) => summary.cached.push(package),
            Ok(FetchOutcome::Downloaded { .. }) => summary.downloaded.push(package),
            Err(e) => {
                tracing::warn!("Fetch failed for {package}: {e}");
                summary.failed.push((package, e.to_string()));
            }
        }
    }
    summary
}
