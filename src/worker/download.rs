//! Download worker: `pending -> downloading -> ready | failed`

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::progress::{ProgressBoard, ProgressParser};
use crate::media::{Retriever, ToolError};
use crate::observability::Counters;
use crate::queue::library::{find_by_stem, title_from_filename};
use crate::queue::{Job, JobStatus, JobStore, JobUpdate, StoreError};

#[derive(Debug, Error)]
enum FetchError {
    #[error("library file {0:?} is no longer on disk")]
    LocalFileMissing(String),

    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error("tool did not report an output path")]
    NoPrediction,

    #[error("no file matching {0} after download")]
    Missing(PathBuf),

    #[error("download directory unreadable: {0}")]
    Io(#[from] io::Error),
}

/// File a finished download resolved to
#[derive(Debug, PartialEq, Eq)]
struct Fetched {
    filename: String,
    title: String,
}

impl Fetched {
    fn from_name(filename: String) -> Self {
        Self {
            title: title_from_filename(&filename),
            filename,
        }
    }

    fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?;
        Some(Self::from_name(name.to_string()))
    }
}

pub struct DownloadWorker {
    store: Arc<JobStore>,
    retriever: Arc<dyn Retriever>,
    progress: Arc<ProgressBoard>,
    counters: Arc<Counters>,
    poll: Duration,
}

impl DownloadWorker {
    pub fn new(
        store: Arc<JobStore>,
        retriever: Arc<dyn Retriever>,
        progress: Arc<ProgressBoard>,
        counters: Arc<Counters>,
        poll: Duration,
    ) -> Self {
        Self {
            store,
            retriever,
            progress,
            counters,
            poll,
        }
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!("Download worker started");
        loop {
            if *shutdown.borrow() {
                break;
            }
            // a running download is abandoned on shutdown; dropping it kills the tool
            let outcome = tokio::select! {
                outcome = self.process_next() => outcome,
                Ok(()) = shutdown.changed() => {
                    info!("Download interrupted by shutdown");
                    break;
                }
            };
            let idle = match outcome {
                Ok(claimed) => !claimed,
                Err(e) => {
                    error!(error = %e, "Download iteration failed");
                    true
                }
            };
            if idle {
                tokio::select! {
                    _ = tokio::time::sleep(self.poll) => {}
                    _ = shutdown.changed() => {}
                }
            }
        }
        info!("Download worker stopped");
    }

    /// Claim and process the oldest pending job; false when there was none
    pub async fn process_next(&self) -> Result<bool, StoreError> {
        let Some(job) = self
            .store
            .claim_oldest(JobStatus::Pending, JobStatus::Downloading)?
        else {
            return Ok(false);
        };

        info!(job_id = job.id, url = %job.url, "Downloading");
        let outcome = self.fetch(&job).await;
        self.progress.clear(job.id);

        let update = match outcome {
            Ok(fetched) => {
                info!(job_id = job.id, filename = %fetched.filename, "Download ready");
                self.counters.download_completed();
                JobUpdate::ready(fetched.filename, fetched.title)
            }
            Err(e) => {
                warn!(job_id = job.id, url = %job.url, error = %e, "Download failed");
                self.counters.download_failed();
                JobUpdate::status(JobStatus::Failed)
            }
        };

        if !self.store.transition(job.id, update)? {
            debug!(job_id = job.id, "Job deleted while downloading");
        }
        Ok(true)
    }

    async fn fetch(&self, job: &Job) -> Result<Fetched, FetchError> {
        // adopted from the download directory: nothing to fetch
        if job.is_local_file() {
            let on_disk = !job.filename.is_empty()
                && self.store.download_dir().join(&job.filename).is_file();
            if !on_disk {
                return Err(FetchError::LocalFileMissing(job.filename.clone()));
            }
            info!(job_id = job.id, filename = %job.filename, "Library file on disk");
            return Ok(Fetched::from_name(job.filename.clone()));
        }

        let predicted = self.retriever.predict_path(&job.url).await;
        if let Some(existing) = predicted.as_deref().filter(|p| p.is_file()) {
            info!(job_id = job.id, path = %existing.display(), "Already on disk");
            return Fetched::from_path(existing).ok_or(FetchError::Missing(existing.to_path_buf()));
        }

        let mut parser = ProgressParser::new(job.id);
        let progress = &self.progress;
        let mut on_line = |line: &str| {
            if let Some(update) = parser.observe(line) {
                progress.set(job.id, update);
            }
        };
        self.retriever.download(&job.url, &mut on_line).await?;

        let predicted = predicted.ok_or(FetchError::NoPrediction)?;
        if predicted.is_file() {
            return Fetched::from_path(&predicted).ok_or(FetchError::Missing(predicted));
        }

        // post-processing may have changed the extension
        let Some(stem) = predicted.file_stem().and_then(|s| s.to_str()) else {
            return Err(FetchError::Missing(predicted));
        };
        match find_by_stem(self.store.download_dir(), stem)? {
            Some(name) => {
                info!(job_id = job.id, filename = %name, "Recovered file by name");
                Ok(Fetched::from_name(name))
            }
            None => Err(FetchError::Missing(predicted)),
        }
    }
}
