//! HTTP download functionality
//!
//! Streams source archives to disk while hashing them, verifies the SHA256
//! checksum, and falls back to mirror URLs. Each URL is tried exactly once.
//! Partial downloads go to a `.part` file that only replaces the destination
//! once complete.

use futures::StreamExt;
use sha2::{Digest, Sha256};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::sync::Semaphore;

use crate::error::DownloadError;

/// Progress callback type for download progress reporting
pub type ProgressCallback = Box<dyn Fn(u64, u64) + Send + Sync>;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Download result containing file path and metadata
#[derive(Debug)]
pub struct DownloadResult {
    /// Path to the downloaded file
    pub path: PathBuf,
    /// Size in bytes
    pub size: u64,
    /// SHA256 checksum of the downloaded content
    pub checksum: String,
}

/// One package's archive: where to get it and where it goes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    /// Package the archive belongs to
    pub package: String,
    /// Primary URL followed by mirrors
    pub urls: Vec<String>,
    /// Expected SHA256 checksum
    pub sha256: String,
    /// Destination path
    pub dest: PathBuf,
}

/// How a fetch was satisfied
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// A matching archive was already on disk
    Cached,
    /// Downloaded from the given URL
    Downloaded { url: String },
}

/// Download manager for fetching source archives
#[derive(Debug, Clone)]
pub struct DownloadManager {
    client: reqwest::Client,
}

impl DownloadManager {
    /// Create a new download manager
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    /// Create a download manager with a custom request timeout
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(timeout)
                .connect_timeout(CONNECT_TIMEOUT)
                .user_agent(concat!("keg/", env!("CARGO_PKG_VERSION")))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
        }
    }

    /// Get the HTTP client
    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// Download `url` to `dest` in a single attempt
    pub async fn download(
        &self,
        url: &str,
        dest: &Path,
        progress: Option<&ProgressCallback>,
    ) -> Result<DownloadResult, DownloadError> {
        let part = part_path(dest);
        let result = self.download_to(url, &part, progress).await;
        match result {
            Ok(mut result) => {
                tokio::fs::rename(&part, dest)
                    .await
                    .map_err(|e| DownloadError::IoError {
                        path: dest.to_path_buf(),
                        error: e.to_string(),
                    })?;
                result.path = dest.to_path_buf();
                Ok(result)
            }
            Err(e) => {
                let _ = tokio::fs::remove_file(&part).await;
                Err(e)
            }
        }
    }

    async fn download_to(
        &self,
        url: &str,
        dest: &Path,
        progress: Option<&ProgressCallback>,
    ) -> Result<DownloadResult, DownloadError> {
        tracing::debug!("GET {url}");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| DownloadError::NetworkError {
                url: url.to_string(),
                error: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(DownloadError::NetworkError {
                url: url.to_string(),
                error: format!("HTTP {}", response.status()),
            });
        }

        let total_size = response.content_length().unwrap_or(0);

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| DownloadError::IoError {
                    path: parent.to_path_buf(),
                    error: e.to_string(),
                })?;
        }

        let mut file = File::create(dest)
            .await
            .map_err(|e| DownloadError::IoError {
                path: dest.to_path_buf(),
                error: e.to_string(),
            })?;

        let mut hasher = Sha256::new();
        let mut downloaded: u64 = 0;
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| DownloadError::NetworkError {
                url: url.to_string(),
                error: e.to_string(),
            })?;

            file.write_all(&chunk)
                .await
                .map_err(|e| DownloadError::IoError {
                    path: dest.to_path_buf(),
                    error: e.to_string(),
                })?;

            hasher.update(&chunk);
            downloaded += chunk.len() as u64;

            if let Some(cb) = progress {
                cb(downloaded, total_size);
            }
        }

        file.flush().await.map_err(|e| DownloadError::IoError {
            path: dest.to_path_buf(),
            error: e.to_string(),
        })?;

        Ok(DownloadResult {
            path: dest.to_path_buf(),
            size: downloaded,
            checksum: hex::encode(hasher.finalize()),
        })
    }

    /// Download a file and verify its checksum; a mismatching file is removed
    pub async fn download_verified(
        &self,
        url: &str,
        dest: &Path,
        expected_checksum: &str,
        progress: Option<&ProgressCallback>,
    ) -> Result<DownloadResult, DownloadError> {
        let result = self.download(url, dest, progress).await?;

        if !result.checksum.eq_ignore_ascii_case(expected_checksum) {
            let _ = tokio::fs::remove_file(dest).await;
            return Err(DownloadError::ChecksumMismatch {
                file: dest.display().to_string(),
                expected: expected_checksum.to_lowercase(),
                actual: result.checksum,
            });
        }

        Ok(result)
    }

    /// Make sure `request.dest` holds the expected archive.
    ///
    /// A cached file with a matching checksum is reused. Otherwise each URL
    /// is tried once, in order, until one yields a verified archive.
    pub async fn fetch(
        &self,
        request: &FetchRequest,
        force: bool,
        progress: Option<&ProgressCallback>,
    ) -> Result<FetchOutcome, DownloadError> {
        if !force && request.dest.exists() {
            if verify_checksum(&request.dest, &request.sha256)? {
                tracing::debug!("Using cached archive {}", request.dest.display());
                return Ok(FetchOutcome::Cached);
            }
            tracing::warn!(
                "Cached archive {} has a wrong checksum, downloading again",
                request.dest.display()
            );
        }

        let mut last_error = None;
        for url in &request.urls {
            match self
                .download_verified(url, &request.dest, &request.sha256, progress)
                .await
            {
                Ok(_) => {
                    tracing::info!("Downloaded {} from {url}", request.package);
                    return Ok(FetchOutcome::Downloaded { url: url.clone() });
                }
                Err(e) => {
                    tracing::warn!("Source {url} for {} failed: {e}", request.package);
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) if request.urls.len() == 1 => Err(e),
            _ => Err(DownloadError::AllSourcesFailed {
                package: request.package.clone(),
            }),
        }
    }

    /// Fetch several archives with at most `max_parallel` in flight.
    ///
    /// Results come back in request order.
    pub async fn fetch_parallel(
        &self,
        requests: Vec<FetchRequest>,
        max_parallel: usize,
        force: bool,
    ) -> Vec<(String, Result<FetchOutcome, DownloadError>)> {
        let semaphore = Arc::new(Semaphore::new(max_parallel.max(1)));

        let handles: Vec<_> = requests
            .into_iter()
            .map(|request| {
                let sem = Arc::clone(&semaphore);
                let mgr = self.clone();
                let package = request.package.clone();

                let handle = tokio::spawn(async move {
                    let _permit = sem.acquire_owned().await.map_err(|e| {
                        DownloadError::NetworkError {
                            url: request.urls.first().cloned().unwrap_or_default(),
                            error: e.to_string(),
                        }
                    })?;
                    mgr.fetch(&request, force, None).await
                });
                (package, handle)
            })
            .collect();

        let mut results = Vec::with_capacity(handles.len());
        for (package, handle) in handles {
            let result = handle.await.unwrap_or_else(|e| {
                Err(DownloadError::AllSourcesFailed {
                    package: format!("{package} ({e})"),
                })
            });
            results.push((package, result));
        }

        results
    }
}

impl Default for DownloadManager {
    fn default() -> Self {
        Self::new()
    }
}

fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    dest.with_file_name(name)
}

/// SHA256 of a file, streamed from disk
pub fn file_checksum(path: &Path) -> Result<String, DownloadError> {
    let io_error = |e: io::Error| DownloadError::IoError {
        path: path.to_path_buf(),
        error: e.to_string(),
    };
    let mut file = std::fs::File::open(path).map_err(io_error)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher).map_err(io_error)?;
    Ok(hex::encode(hasher.finalize()))
}

/// Verify SHA256 checksum of a file
pub fn verify_checksum(path: &Path, expected: &str) -> Result<bool, DownloadError> {
    Ok(file_checksum(path)?.eq_ignore_ascii_case(expected))
}

/// Compute SHA256 checksum of data
pub fn compute_checksum(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}
